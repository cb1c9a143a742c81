//! turnaround -- process turnaround prediction with runtime reconciliation.
//!
//! This crate predicts how long running processes will take, tracks each
//! prediction against the process's real lifetime, and serves both over
//! HTTP and WebSocket.

pub mod api;
pub mod config;
pub mod inspect;
pub mod monitor;
pub mod predict;
pub mod runtime;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::AppConfig;
use crate::inspect::HostInspector;
use crate::monitor::Monitor;
use crate::predict::RegressionModel;
use crate::runtime::Tracker;

/// Wire the host inspector, the configured model and a host tracker.
pub fn build_monitor(config: &AppConfig) -> Monitor {
    let inspector = Arc::new(HostInspector::new());
    let model = Arc::new(RegressionModel::load(&config.model.path));
    let tracker = Tracker::host(&config.tracker);
    Monitor::new(inspector, model, tracker)
}

/// Start the turnaround service: REST API and live stream.
pub async fn serve(config: AppConfig) -> Result<()> {
    let state = api::state::AppState {
        monitor: build_monitor(&config),
        stream: config.stream.clone(),
    };

    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;
    let app = api::router(state);

    tracing::info!(%addr, "turnaround listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("turnaround stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
