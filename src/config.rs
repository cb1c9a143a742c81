//! TOML configuration for the turnaround service.
//!
//! Every section has defaults, so an empty file (or no file at all) yields a
//! working configuration. The file is located via `--config`, then the
//! `TURNAROUND_CONFIG` environment variable, then the system location.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "TURNAROUND_CONFIG";

/// System-wide config location.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/turnaround/turnaround.toml";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("tracker.identity_tolerance_secs must be finite and >= 0, got {0}")]
    InvalidTolerance(f64),
    #[error("stream.interval_ms must be greater than zero")]
    ZeroInterval,
    #[error("stream.default_top_n must be between 1 and {max}, got {got}")]
    InvalidTopN { got: usize, max: usize },
    #[error("stream.default_quantum must be finite and > 0, got {0}")]
    InvalidQuantum(f64),
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load and validate configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Resolve the configuration for this process.
    ///
    /// An explicit path must load. Otherwise try `TURNAROUND_CONFIG`, then
    /// [`SYSTEM_CONFIG_PATH`], then compiled-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        Ok(Self::load_or_default())
    }

    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(env_path);
            match Self::load(&path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "TURNAROUND_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let tolerance = self.tracker.identity_tolerance_secs;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(ConfigError::InvalidTolerance(tolerance));
        }
        if self.stream.interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.stream.default_top_n == 0 || self.stream.default_top_n > MAX_TOP_N {
            return Err(ConfigError::InvalidTopN {
                got: self.stream.default_top_n,
                max: MAX_TOP_N,
            });
        }
        let quantum = self.stream.default_quantum;
        if !quantum.is_finite() || quantum <= 0.0 {
            return Err(ConfigError::InvalidQuantum(quantum));
        }
        Ok(())
    }
}

/// Upper bound on processes predicted per cycle.
pub const MAX_TOP_N: usize = 100;

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP/WebSocket listen address.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Reconciliation store settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Completed records retained for the "recently finished" feed.
    pub history_capacity: usize,
    /// Max creation-time difference (seconds) for two observations of one pid
    /// to count as the same process instance.
    pub identity_tolerance_secs: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            history_capacity: 20,
            identity_tolerance_secs: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

/// WebSocket push loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub interval_ms: u64,
    pub default_top_n: usize,
    pub default_quantum: f64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2_000,
            default_top_n: 15,
            default_quantum: 3.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// JSON regression artifact written by the offline trainer.
    pub path: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("model/turnaround_lr.json"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
