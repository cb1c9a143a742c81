//! Live prediction stream over WebSocket.
//!
//! Each session runs its own reconciliation cycle every
//! `stream.interval_ms` and pushes one [`StreamFrame`] per tick.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::state::AppState;
use crate::config::{StreamConfig, MAX_TOP_N};
use crate::monitor::{CycleParams, Monitor, StreamFrame};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(raw): Query<HashMap<String, String>>,
) -> Response {
    let params = stream_params(&raw, &state.stream);
    let period = Duration::from_millis(state.stream.interval_ms);
    ws.on_upgrade(move |socket| run_session(socket, state.monitor, params, period))
}

/// Cycle parameters from the upgrade query. Missing or unusable values fall
/// back to the configured defaults instead of rejecting the connection.
fn stream_params(raw: &HashMap<String, String>, defaults: &StreamConfig) -> CycleParams {
    let top_n = raw
        .get("top_n")
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|n| (1..=MAX_TOP_N).contains(n))
        .unwrap_or(defaults.default_top_n);
    let quantum = raw
        .get("quantum")
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|q| q.is_finite() && *q > 0.0)
        .unwrap_or(defaults.default_quantum);

    CycleParams {
        top_n,
        quantum,
        ..CycleParams::default()
    }
}

async fn run_session(socket: WebSocket, monitor: Monitor, params: CycleParams, period: Duration) {
    let session = Uuid::new_v4();
    info!(%session, top_n = params.top_n, quantum = params.quantum, "stream session opened");

    let (mut sender, mut receiver) = socket.split();
    let mut ticker = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let frame = match monitor.stream_frame(params).await {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(%session, error = %format!("{:#}", e), "stream cycle failed, closing");
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                };
                if let Err(e) = push(&mut sender, &frame).await {
                    debug!(%session, error = %e, "stream send failed");
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(%session, error = %e, "stream receive failed");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    info!(%session, "stream session closed");
}

async fn push(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &StreamFrame,
) -> anyhow::Result<()> {
    let text = serde_json::to_string(frame)?;
    sender.send(Message::Text(text.into())).await?;
    Ok(())
}
