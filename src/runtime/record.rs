//! Runtime records for predicted process instances.

use serde::{Deserialize, Serialize};

/// OS process identifier.
pub type Pid = u32;

/// Turnaround status reported for a pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnaroundStatus {
    Running,
    Completed,
    Unknown,
}

impl std::fmt::Display for TurnaroundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnaroundStatus::Running => write!(f, "running"),
            TurnaroundStatus::Completed => write!(f, "completed"),
            TurnaroundStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Completion facts, recorded together exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
struct Completion {
    actual_duration: f64,
    completed_at: f64,
}

/// One tracked process instance, identified by `(pid, creation_time)`.
///
/// All timestamps are absolute seconds since the Unix epoch. Records are
/// owned by the [`RuntimeStore`](super::RuntimeStore); callers only ever see
/// shared references or clones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeRecord {
    pid: Pid,
    name: String,
    creation_time: f64,
    predicted_duration: f64,
    first_seen: f64,
    last_seen: f64,
    completion: Option<Completion>,
}

impl RuntimeRecord {
    pub(crate) fn new(
        pid: Pid,
        name: String,
        creation_time: f64,
        predicted_duration: f64,
        now: f64,
    ) -> Self {
        Self {
            pid,
            name,
            creation_time,
            predicted_duration,
            first_seen: now,
            last_seen: now,
            completion: None,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn creation_time(&self) -> f64 {
        self.creation_time
    }

    pub fn predicted_duration(&self) -> f64 {
        self.predicted_duration
    }

    pub fn first_seen(&self) -> f64 {
        self.first_seen
    }

    pub fn last_seen(&self) -> f64 {
        self.last_seen
    }

    pub fn actual_duration(&self) -> Option<f64> {
        self.completion.map(|c| c.actual_duration)
    }

    pub fn completed_at(&self) -> Option<f64> {
        self.completion.map(|c| c.completed_at)
    }

    pub fn is_completed(&self) -> bool {
        self.completion.is_some()
    }

    pub fn status(&self) -> TurnaroundStatus {
        if self.is_completed() {
            TurnaroundStatus::Completed
        } else {
            TurnaroundStatus::Running
        }
    }

    /// Actual duration once completed, otherwise time since creation (never negative).
    pub fn elapsed(&self, now: f64) -> f64 {
        match self.completion {
            Some(c) => c.actual_duration,
            None => (now - self.creation_time).max(0.0),
        }
    }

    /// `actual - predicted`, known only after completion.
    pub fn duration_error(&self) -> Option<f64> {
        self.actual_duration().map(|a| a - self.predicted_duration)
    }

    /// Whether `creation_time` identifies the same instance as this record.
    pub(crate) fn same_instance(&self, creation_time: f64, tolerance: f64) -> bool {
        (self.creation_time - creation_time).abs() <= tolerance
    }

    pub(crate) fn refresh(&mut self, name: String, predicted_duration: f64, now: f64) {
        debug_assert!(!self.is_completed(), "completed records are immutable");
        self.name = name;
        self.predicted_duration = predicted_duration;
        self.last_seen = self.last_seen.max(now);
    }

    /// Close the record. Consumes it so a completed record can't be mutated again.
    pub(crate) fn complete(mut self, now: f64) -> Self {
        if self.completion.is_none() {
            self.completion = Some(Completion {
                actual_duration: (now - self.creation_time).max(0.0),
                completed_at: now,
            });
        }
        self
    }

    /// Serializable view used by the "recently finished" feed.
    pub fn to_view(&self) -> CompletionView {
        CompletionView {
            pid: self.pid,
            name: self.name.clone(),
            predicted_turnaround_time: self.predicted_duration,
            actual_turnaround_time: self.actual_duration(),
            turnaround_status: self.status(),
            completed_at: self.completed_at(),
            duration_error: self.duration_error(),
        }
    }
}

/// Wire shape of a completed (or running) record in the completions feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionView {
    pub pid: Pid,
    pub name: String,
    pub predicted_turnaround_time: f64,
    pub actual_turnaround_time: Option<f64>,
    pub turnaround_status: TurnaroundStatus,
    pub completed_at: Option<f64>,
    pub duration_error: Option<f64>,
}
