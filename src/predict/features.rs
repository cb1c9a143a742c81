//! Round-robin scheduling features derived from live process data.

use serde::{Deserialize, Serialize};

use crate::inspect::ProcessInfo;

/// Model input: burst (CPU time) and arrival (age) statistics plus context.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RrFeatures {
    pub mean_burst: f64,
    pub std_burst: f64,
    pub mean_arrival: f64,
    pub std_arrival: f64,
    pub num_processes: f64,
    pub system_load: f64,
    pub time_quantum: f64,
}

/// Feature order expected by trained model artifacts.
pub const FEATURE_NAMES: [&str; 7] = [
    "mean_burst",
    "std_burst",
    "mean_arrival",
    "std_arrival",
    "num_processes",
    "system_load",
    "time_quantum",
];

impl RrFeatures {
    pub fn to_vector(&self) -> Vec<f64> {
        vec![
            self.mean_burst,
            self.std_burst,
            self.mean_arrival,
            self.std_arrival,
            self.num_processes,
            self.system_load,
            self.time_quantum,
        ]
    }

    /// Features over the whole process table.
    pub fn from_system(
        procs: &[ProcessInfo],
        system_load: f64,
        time_quantum: f64,
        now: f64,
    ) -> Self {
        let bursts = Series::new(procs.iter().map(|p| p.cpu_time).filter(|v| v.is_finite()));
        let arrivals = Series::new(
            procs
                .iter()
                .map(|p| p.create_time)
                .filter(|v| v.is_finite())
                .map(|created| age(created, now)),
        );

        Self {
            mean_burst: bursts.mean(),
            std_burst: bursts.std_dev(),
            mean_arrival: arrivals.mean(),
            std_arrival: arrivals.std_dev(),
            num_processes: procs.len() as f64,
            system_load,
            time_quantum,
        }
    }

    /// Features for a single process: its own burst and age, no spread.
    pub fn for_process(
        process: &ProcessInfo,
        system_load: f64,
        time_quantum: f64,
        now: f64,
    ) -> Self {
        Self {
            mean_burst: process.cpu_time,
            std_burst: 0.0,
            mean_arrival: age(process.create_time, now),
            std_arrival: 0.0,
            num_processes: 1.0,
            system_load,
            time_quantum,
        }
    }
}

fn age(created: f64, now: f64) -> f64 {
    (now - created).max(0.0)
}

/// Population statistics over a sample (both zero when empty).
struct Series {
    values: Vec<f64>,
}

impl Series {
    fn new(values: impl Iterator<Item = f64>) -> Self {
        Self {
            values: values.collect(),
        }
    }

    fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    fn std_dev(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self
            .values
            .iter()
            .map(|&x| (x - mean).powi(2))
            .sum::<f64>()
            / self.values.len() as f64;
        variance.sqrt()
    }
}
