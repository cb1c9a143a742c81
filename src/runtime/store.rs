//! Reconciliation store: which predicted processes are running, which finished.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use super::clock::Clock;
use super::history::History;
use super::liveness::{Liveness, LivenessOracle};
use super::record::{Pid, RuntimeRecord, TurnaroundStatus};
use crate::config::TrackerConfig;

/// What a single `reconcile` pass did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReconcileOutcome {
    /// Pids closed as completed, ascending.
    pub closed: Vec<Pid>,
    /// Missing pids left running because the oracle said alive or could not tell.
    pub deferred: Vec<Pid>,
}

/// Authoritative bookkeeping of active vs. completed predicted processes.
///
/// Driven externally: callers `observe` every visible process, then
/// `reconcile` once per cycle. The store never polls on its own.
pub struct RuntimeStore {
    active: HashMap<Pid, RuntimeRecord>,
    history: History,
    tolerance: f64,
    oracle: Arc<dyn LivenessOracle>,
    clock: Arc<dyn Clock>,
}

impl RuntimeStore {
    pub fn new(
        config: &TrackerConfig,
        oracle: Arc<dyn LivenessOracle>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            active: HashMap::new(),
            history: History::with_capacity(config.history_capacity),
            tolerance: config.identity_tolerance_secs,
            oracle,
            clock,
        }
    }

    /// Register or refresh a running process instance.
    ///
    /// A creation time outside the identity tolerance means the pid now
    /// belongs to a different process: the old record is dropped without a
    /// completion and a fresh one takes its place.
    pub fn observe(
        &mut self,
        pid: Pid,
        name: &str,
        creation_time: f64,
        predicted_duration: f64,
    ) -> &RuntimeRecord {
        let now = self.clock.now();
        let tolerance = self.tolerance;

        let fresh = || {
            RuntimeRecord::new(pid, name.to_string(), creation_time, predicted_duration, now)
        };

        self.active
            .entry(pid)
            .and_modify(|existing| {
                if existing.same_instance(creation_time, tolerance) {
                    existing.refresh(name.to_string(), predicted_duration, now);
                } else {
                    debug!(
                        pid,
                        old_creation_time = existing.creation_time(),
                        new_creation_time = creation_time,
                        "pid reused, abandoning previous record"
                    );
                    *existing = fresh();
                }
            })
            .or_insert_with(fresh)
    }

    /// Close out every active pid missing from `observed`, per the oracle's verdict.
    pub fn reconcile(&mut self, observed: &HashSet<Pid>) -> ReconcileOutcome {
        let mut missing: Vec<Pid> = self
            .active
            .keys()
            .copied()
            .filter(|pid| !observed.contains(pid))
            .collect();
        if missing.is_empty() {
            return ReconcileOutcome::default();
        }
        missing.sort_unstable();

        let now = self.clock.now();
        let mut outcome = ReconcileOutcome::default();

        for pid in missing {
            let Some(stored_creation) = self.active.get(&pid).map(|r| r.creation_time()) else {
                continue;
            };

            let close = match self.oracle.check(pid) {
                Liveness::StillAlive { creation_time } => {
                    (creation_time - stored_creation).abs() > self.tolerance
                }
                Liveness::Gone => true,
                Liveness::Indeterminate => false,
            };

            if !close {
                outcome.deferred.push(pid);
                continue;
            }

            if let Some(record) = self.active.remove(&pid) {
                let record = record.complete(now);
                info!(
                    pid,
                    name = record.name(),
                    predicted = record.predicted_duration(),
                    actual = record.actual_duration().unwrap_or_default(),
                    "predicted process completed"
                );
                if let Some(evicted) = self.history.push(record) {
                    debug!(pid = evicted.pid(), "evicted completion from history");
                }
                outcome.closed.push(pid);
            }
        }

        outcome
    }

    /// Elapsed time for a running pid, or actual duration for a completed one.
    pub fn current_elapsed(&self, pid: Pid) -> Option<f64> {
        if let Some(record) = self.active.get(&pid) {
            return Some(record.elapsed(self.clock.now()));
        }
        self.history.latest_for(pid).and_then(|r| r.actual_duration())
    }

    pub fn status_for(&self, pid: Pid) -> TurnaroundStatus {
        if let Some(record) = self.active.get(&pid) {
            return record.status();
        }
        self.history
            .latest_for(pid)
            .map(|r| r.status())
            .unwrap_or(TurnaroundStatus::Unknown)
    }

    /// Completed records, oldest first.
    pub fn recent_completions(&self) -> Vec<RuntimeRecord> {
        self.history.iter().cloned().collect()
    }

    pub fn active_record(&self, pid: Pid) -> Option<&RuntimeRecord> {
        self.active.get(&pid)
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn history_capacity(&self) -> usize {
        self.history.capacity()
    }
}
