//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use turnaround::config::TrackerConfig;
use turnaround::inspect::{KillOutcome, ProcessInfo, ProcessInspector};
use turnaround::monitor::Monitor;
use turnaround::predict::{ModelError, Predictor, RrFeatures};
use turnaround::runtime::{Liveness, LivenessOracle, ManualClock, Pid, RuntimeStore, Tracker};

/// Liveness verdicts by pid; unscripted pids are `Gone`.
#[derive(Default)]
pub struct ScriptedOracle {
    verdicts: Mutex<HashMap<Pid, Liveness>>,
    calls: Mutex<Vec<Pid>>,
}

impl ScriptedOracle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, pid: Pid, verdict: Liveness) {
        self.verdicts.lock().unwrap().insert(pid, verdict);
    }

    pub fn calls(&self) -> Vec<Pid> {
        self.calls.lock().unwrap().clone()
    }
}

impl LivenessOracle for ScriptedOracle {
    fn check(&self, pid: Pid) -> Liveness {
        self.calls.lock().unwrap().push(pid);
        self.verdicts
            .lock()
            .unwrap()
            .get(&pid)
            .copied()
            .unwrap_or(Liveness::Gone)
    }
}

/// In-memory process table.
#[derive(Default)]
pub struct FakeInspector {
    procs: Mutex<Vec<ProcessInfo>>,
    list_calls: AtomicUsize,
}

impl FakeInspector {
    pub fn new(procs: Vec<ProcessInfo>) -> Arc<Self> {
        Arc::new(Self {
            procs: Mutex::new(procs),
            list_calls: AtomicUsize::new(0),
        })
    }

    /// Number of enumeration passes so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn set(&self, procs: Vec<ProcessInfo>) {
        *self.procs.lock().unwrap() = procs;
    }
}

/// Pid 1 refuses termination.
pub const PROTECTED_PID: Pid = 1;

impl ProcessInspector for FakeInspector {
    fn list(&self) -> Vec<ProcessInfo> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.procs.lock().unwrap().clone()
    }

    fn snapshot(&self, pid: Pid) -> Option<ProcessInfo> {
        self.procs.lock().unwrap().iter().find(|p| p.pid == pid).cloned()
    }

    fn terminate(&self, pid: Pid) -> KillOutcome {
        let mut procs = self.procs.lock().unwrap();
        match procs.iter().position(|p| p.pid == pid) {
            None => KillOutcome::NotFound,
            Some(_) if pid == PROTECTED_PID => KillOutcome::PermissionDenied,
            Some(i) => {
                procs.remove(i);
                KillOutcome::Terminated
            }
        }
    }

    fn system_load(&self) -> f64 {
        0.25
    }
}

/// Predicts `cpu_time + base`; fails for processes with negative cpu time.
pub struct BurstPredictor {
    pub base: f64,
}

impl Predictor for BurstPredictor {
    fn predict(&self, features: &RrFeatures) -> Result<f64, ModelError> {
        if features.mean_burst < 0.0 {
            return Err(ModelError::NonFinite(f64::NAN));
        }
        Ok(features.mean_burst + self.base)
    }
}

pub fn process(
    pid: Pid,
    name: &str,
    cpu_percent: f64,
    cpu_time: f64,
    create_time: f64,
) -> ProcessInfo {
    ProcessInfo {
        pid,
        name: name.to_string(),
        cpu_percent,
        memory_percent: 0.5,
        cpu_time,
        create_time,
    }
}

pub fn store(
    config: TrackerConfig,
    oracle: Arc<ScriptedOracle>,
    clock: Arc<ManualClock>,
) -> RuntimeStore {
    RuntimeStore::new(&config, oracle, clock)
}

pub struct Harness {
    pub inspector: Arc<FakeInspector>,
    pub oracle: Arc<ScriptedOracle>,
    pub clock: Arc<ManualClock>,
    pub monitor: Monitor,
}

/// Monitor over fakes, with the tracker clock at `now`.
pub fn harness(procs: Vec<ProcessInfo>, now: f64) -> Harness {
    let inspector = FakeInspector::new(procs);
    let oracle = ScriptedOracle::new();
    let clock = Arc::new(ManualClock::new(now));
    let tracker = Tracker::new(store(
        TrackerConfig::default(),
        oracle.clone(),
        clock.clone(),
    ));
    let monitor = Monitor::new(
        inspector.clone(),
        Arc::new(BurstPredictor { base: 10.0 }),
        tracker,
    );
    Harness {
        inspector,
        oracle,
        clock,
        monitor,
    }
}
