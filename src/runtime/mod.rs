//! Runtime reconciliation: tracks predicted processes until they finish.
//!
//! [`RuntimeStore`] is the single-owner state machine. [`Tracker`] is the
//! cloneable handle the service shares between request handlers and stream
//! sessions; it serializes mutations behind a `tokio::sync::RwLock` so reads
//! always see whole records.

pub mod clock;
pub mod history;
pub mod liveness;
pub mod record;
pub mod store;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::RwLock;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::history::History;
pub use self::liveness::{HostOracle, Liveness, LivenessOracle};
pub use self::record::{CompletionView, Pid, RuntimeRecord, TurnaroundStatus};
pub use self::store::{ReconcileOutcome, RuntimeStore};

use crate::config::TrackerConfig;

/// Shared handle to a [`RuntimeStore`].
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<RwLock<RuntimeStore>>,
}

impl Tracker {
    pub fn new(store: RuntimeStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    /// Tracker over the host process table and system clock.
    pub fn host(config: &TrackerConfig) -> Self {
        Self::new(RuntimeStore::new(
            config,
            Arc::new(HostOracle::new()),
            Arc::new(SystemClock),
        ))
    }

    pub async fn observe(
        &self,
        pid: Pid,
        name: &str,
        creation_time: f64,
        predicted_duration: f64,
    ) -> RuntimeRecord {
        let mut store = self.inner.write().await;
        store
            .observe(pid, name, creation_time, predicted_duration)
            .clone()
    }

    /// Observe, then report elapsed time and status, under one write lock.
    pub async fn annotate(
        &self,
        pid: Pid,
        name: &str,
        creation_time: f64,
        predicted_duration: f64,
    ) -> (Option<f64>, TurnaroundStatus) {
        let mut store = self.inner.write().await;
        store.observe(pid, name, creation_time, predicted_duration);
        (store.current_elapsed(pid), store.status_for(pid))
    }

    /// Reconcile on the blocking pool: the oracle may touch the OS for
    /// every missing pid.
    pub async fn reconcile(&self, observed: &HashSet<Pid>) -> Result<ReconcileOutcome> {
        let mut store = self.inner.clone().write_owned().await;
        let observed = observed.clone();
        tokio::task::spawn_blocking(move || store.reconcile(&observed))
            .await
            .context("reconcile task failed")
    }

    pub async fn current_elapsed(&self, pid: Pid) -> Option<f64> {
        self.inner.read().await.current_elapsed(pid)
    }

    pub async fn status_for(&self, pid: Pid) -> TurnaroundStatus {
        self.inner.read().await.status_for(pid)
    }

    pub async fn recent_completions(&self) -> Vec<RuntimeRecord> {
        self.inner.read().await.recent_completions()
    }

    /// Recent completions in their wire shape, oldest first.
    pub async fn completion_feed(&self) -> Vec<CompletionView> {
        self.inner
            .read()
            .await
            .recent_completions()
            .iter()
            .map(RuntimeRecord::to_view)
            .collect()
    }

    /// `(active, completed)` record counts.
    pub async fn counts(&self) -> (usize, usize) {
        let store = self.inner.read().await;
        (store.active_len(), store.history_len())
    }
}
