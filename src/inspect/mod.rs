//! Process inspection: enumeration, snapshots, termination.

pub mod host;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

pub use self::host::HostInspector;
use crate::runtime::Pid;

/// Point-in-time attributes of one process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    /// User + system CPU seconds.
    pub cpu_time: f64,
    /// Creation time, seconds since the Unix epoch.
    pub create_time: f64,
}

/// Outcome of a termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KillOutcome {
    Terminated,
    NotFound,
    PermissionDenied,
}

impl KillOutcome {
    pub fn message(&self, pid: Pid) -> String {
        match self {
            KillOutcome::Terminated => format!("Process {} terminated.", pid),
            KillOutcome::NotFound => "Process not found.".to_string(),
            KillOutcome::PermissionDenied => "Permission denied.".to_string(),
        }
    }
}

/// Source of process information.
///
/// Implementations skip processes that vanish or deny access while being
/// read; they never fail a whole enumeration because of one process.
pub trait ProcessInspector: Send + Sync {
    fn list(&self) -> Vec<ProcessInfo>;
    /// `None` when the process is missing or inaccessible.
    fn snapshot(&self, pid: Pid) -> Option<ProcessInfo>;
    fn terminate(&self, pid: Pid) -> KillOutcome;
    /// Global CPU utilization, `0.0..=1.0`.
    fn system_load(&self) -> f64;
}

// ---------------------------------------------------------------------------
// Sorting and paging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Name,
    #[default]
    CpuPercent,
    MemoryPercent,
    CpuTime,
    CreateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

fn numeric_key(p: &ProcessInfo, key: SortKey) -> Option<f64> {
    let v = match key {
        SortKey::Name => return None,
        SortKey::CpuPercent => p.cpu_percent,
        SortKey::MemoryPercent => p.memory_percent,
        SortKey::CpuTime => p.cpu_time,
        SortKey::CreateTime => p.create_time,
    };
    (!v.is_nan()).then_some(v)
}

fn compare(a: &ProcessInfo, b: &ProcessInfo, key: SortKey, order: SortOrder) -> Ordering {
    let ord = match key {
        SortKey::Name => a.name.cmp(&b.name),
        _ => match (numeric_key(a, key), numeric_key(b, key)) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            // Missing values always trail, whatever the order.
            (Some(_), None) => return Ordering::Less,
            (None, Some(_)) => return Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    };
    match order {
        SortOrder::Asc => ord,
        SortOrder::Desc => ord.reverse(),
    }
}

/// Stable sort by `key`; ties keep enumeration order.
pub fn sort_processes(procs: &mut [ProcessInfo], key: SortKey, order: SortOrder) {
    procs.sort_by(|a, b| compare(a, b, key, order));
}

/// The first `n` processes after sorting.
pub fn pick_top(
    mut procs: Vec<ProcessInfo>,
    n: usize,
    key: SortKey,
    order: SortOrder,
) -> Vec<ProcessInfo> {
    sort_processes(&mut procs, key, order);
    procs.truncate(n);
    procs
}

/// One page of a listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub results: Vec<T>,
}

/// 1-based paging. Pages past the end are empty; `total` is always reported.
pub fn paginate<T>(items: Vec<T>, page: usize, page_size: usize) -> Page<T> {
    let total = items.len();
    let start = page.saturating_sub(1).saturating_mul(page_size);
    let results = items.into_iter().skip(start).take(page_size).collect();
    Page {
        page,
        page_size,
        total,
        results,
    }
}
