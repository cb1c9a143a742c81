//! Polling cycle: enumerate, predict, observe, reconcile.
//!
//! One [`Monitor`] is built in the composition root and shared (cheaply
//! cloned) by the HTTP handlers, WebSocket sessions and the CLI `watch`
//! loop. Blocking process-table work runs on the blocking pool.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::inspect::{self, KillOutcome, ProcessInfo, ProcessInspector, SortKey, SortOrder};
use crate::predict::{Predictor, RrFeatures};
use crate::runtime::{clock, CompletionView, Pid, Tracker, TurnaroundStatus};

/// Parameters of one reconciliation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CycleParams {
    pub top_n: usize,
    pub sort_by: SortKey,
    pub order: SortOrder,
    pub quantum: f64,
}

impl Default for CycleParams {
    fn default() -> Self {
        Self {
            top_n: 10,
            sort_by: SortKey::CpuPercent,
            order: SortOrder::Desc,
            quantum: 1.0,
        }
    }
}

/// A process annotated with its prediction and observed runtime.
#[derive(Debug, Clone, Serialize)]
pub struct PredictedProcess {
    pub pid: Pid,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub cpu_time: f64,
    pub predicted_turnaround_time: f64,
    pub actual_turnaround_time: Option<f64>,
    pub turnaround_status: TurnaroundStatus,
    pub features: RrFeatures,
}

/// System-wide prediction.
#[derive(Debug, Clone, Serialize)]
pub struct SystemPrediction {
    pub predicted_turnaround_time: f64,
    pub features: RrFeatures,
}

/// Result of [`Monitor::run_cycle`].
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub items: Vec<PredictedProcess>,
    /// Pids seen in the enumeration pass.
    pub observed: usize,
    /// Pids closed as completed during reconciliation.
    pub completed: Vec<Pid>,
}

/// One push of the live stream.
#[derive(Debug, Clone, Serialize)]
pub struct StreamFrame {
    pub system_prediction: f64,
    pub items: Vec<PredictedProcess>,
    pub quantum: f64,
    pub count: usize,
    pub recent_completions: Vec<CompletionView>,
}

/// Composition of inspector, predictor and runtime tracker.
#[derive(Clone)]
pub struct Monitor {
    inspector: Arc<dyn ProcessInspector>,
    predictor: Arc<dyn Predictor>,
    tracker: Tracker,
}

impl Monitor {
    pub fn new(
        inspector: Arc<dyn ProcessInspector>,
        predictor: Arc<dyn Predictor>,
        tracker: Tracker,
    ) -> Self {
        Self {
            inspector,
            predictor,
            tracker,
        }
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Send a termination request to `pid`.
    pub async fn terminate(&self, pid: Pid) -> Result<KillOutcome> {
        let inspector = self.inspector.clone();
        tokio::task::spawn_blocking(move || inspector.terminate(pid))
            .await
            .context("terminate task failed")
    }

    /// Full process listing.
    pub async fn list_processes(&self) -> Result<Vec<ProcessInfo>> {
        let inspector = self.inspector.clone();
        tokio::task::spawn_blocking(move || inspector.list())
            .await
            .context("process enumeration task failed")
    }

    /// Process table plus global load, read off the async runtime.
    async fn enumerate(&self) -> Result<(Vec<ProcessInfo>, f64)> {
        let inspector = self.inspector.clone();
        tokio::task::spawn_blocking(move || {
            let procs = inspector.list();
            let load = inspector.system_load();
            (procs, load)
        })
        .await
        .context("process enumeration task failed")
    }

    /// Prediction from system-wide features.
    pub async fn predict_system(&self, quantum: f64) -> Result<SystemPrediction> {
        let (procs, load) = self.enumerate().await?;
        self.system_prediction(&procs, load, quantum)
    }

    fn system_prediction(
        &self,
        procs: &[ProcessInfo],
        load: f64,
        quantum: f64,
    ) -> Result<SystemPrediction> {
        let features = RrFeatures::from_system(procs, load, quantum, clock::unix_now());
        let predicted = self
            .predictor
            .predict(&features)
            .context("system prediction failed")?;
        Ok(SystemPrediction {
            predicted_turnaround_time: predicted,
            features,
        })
    }

    /// Predict and annotate one process. `None` when it is missing or
    /// inaccessible. Does not reconcile.
    pub async fn predict_process(
        &self,
        pid: Pid,
        quantum: f64,
    ) -> Result<Option<PredictedProcess>> {
        let inspector = self.inspector.clone();
        let found = tokio::task::spawn_blocking(move || {
            inspector.snapshot(pid).map(|p| (p, inspector.system_load()))
        })
        .await
        .context("process snapshot task failed")?;

        let Some((process, load)) = found else {
            return Ok(None);
        };
        let mut item = self
            .predict_one(&process, load, quantum)
            .with_context(|| format!("prediction failed for pid {}", pid))?;
        self.annotate(&mut item, process.create_time).await;
        Ok(Some(item))
    }

    /// One reconciliation cycle over the top-N processes.
    ///
    /// Every enumerated pid counts as observed, including ones whose
    /// prediction failed, so a live process is never closed by mistake.
    pub async fn run_cycle(&self, params: CycleParams) -> Result<CycleReport> {
        let (procs, load) = self.enumerate().await?;
        self.cycle_over(procs, load, params).await
    }

    /// System prediction and one cycle over a single enumeration pass, so
    /// both see the same snapshot and CPU deltas.
    pub async fn run_cycle_with_system(
        &self,
        params: CycleParams,
    ) -> Result<(SystemPrediction, CycleReport)> {
        let (procs, load) = self.enumerate().await?;
        let system = self.system_prediction(&procs, load, params.quantum)?;
        let report = self.cycle_over(procs, load, params).await?;
        Ok((system, report))
    }

    async fn cycle_over(
        &self,
        procs: Vec<ProcessInfo>,
        load: f64,
        params: CycleParams,
    ) -> Result<CycleReport> {
        let observed: HashSet<Pid> = procs.iter().map(|p| p.pid).collect();
        let selected = inspect::pick_top(procs, params.top_n, params.sort_by, params.order);

        let mut items = Vec::with_capacity(selected.len());
        for process in &selected {
            match self.predict_one(process, load, params.quantum) {
                Ok(mut item) => {
                    self.annotate(&mut item, process.create_time).await;
                    items.push(item);
                }
                Err(e) => {
                    warn!(pid = process.pid, name = %process.name, error = %e, "skipping process");
                }
            }
        }

        let outcome = self.tracker.reconcile(&observed).await?;
        if !outcome.closed.is_empty() {
            info!(completed = ?outcome.closed, "reconciled completed processes");
        }
        debug!(
            observed = observed.len(),
            predicted = items.len(),
            deferred = outcome.deferred.len(),
            "cycle finished"
        );

        Ok(CycleReport {
            items,
            observed: observed.len(),
            completed: outcome.closed,
        })
    }

    /// System prediction, one cycle, and the completions feed.
    pub async fn stream_frame(&self, params: CycleParams) -> Result<StreamFrame> {
        let (system, report) = self.run_cycle_with_system(params).await?;
        let recent_completions = self.tracker.completion_feed().await;
        Ok(StreamFrame {
            system_prediction: system.predicted_turnaround_time,
            count: report.items.len(),
            items: report.items,
            quantum: params.quantum,
            recent_completions,
        })
    }

    fn predict_one(
        &self,
        process: &ProcessInfo,
        load: f64,
        quantum: f64,
    ) -> Result<PredictedProcess> {
        let features = RrFeatures::for_process(process, load, quantum, clock::unix_now());
        let predicted = self.predictor.predict(&features)?;
        Ok(PredictedProcess {
            pid: process.pid,
            name: process.name.clone(),
            cpu_percent: process.cpu_percent,
            memory_percent: process.memory_percent,
            cpu_time: process.cpu_time,
            predicted_turnaround_time: predicted,
            actual_turnaround_time: None,
            turnaround_status: TurnaroundStatus::Unknown,
            features,
        })
    }

    /// Record the observation and fill in runtime fields. Observations
    /// without a usable creation time or prediction stay `unknown`.
    async fn annotate(&self, item: &mut PredictedProcess, create_time: f64) {
        if !is_valid_timestamp(create_time) || !item.predicted_turnaround_time.is_finite() {
            warn!(pid = item.pid, create_time, "invalid process identity, not tracked");
            return;
        }
        let (actual, status) = self
            .tracker
            .annotate(item.pid, &item.name, create_time, item.predicted_turnaround_time)
            .await;
        item.actual_turnaround_time = actual;
        item.turnaround_status = status;
    }
}

/// Absolute timestamps must be finite and after the epoch.
fn is_valid_timestamp(t: f64) -> bool {
    t.is_finite() && t > 0.0
}
