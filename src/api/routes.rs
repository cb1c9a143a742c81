//! API route definitions.

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::ApiError;
use super::state::AppState;
use super::stream;
use crate::config::MAX_TOP_N;
use crate::inspect::{self, KillOutcome, SortKey, SortOrder};
use crate::monitor::CycleParams;
use crate::runtime::Pid;

/// Upper bound on `page_size` for process listings.
pub const MAX_PAGE_SIZE: usize = 500;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/processes", get(list_processes))
        .route("/processes/{pid}/kill", post(kill_process))
        .route("/predict/system", get(predict_system))
        .route("/predict/process/{pid}", get(predict_process))
        .route("/predict/processes", get(predict_processes))
        .route("/completions", get(recent_completions))
        .route("/ws", get(stream::ws_handler))
}

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ListQuery {
    page: usize,
    page_size: usize,
    sort_by: SortKey,
    order: SortOrder,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 25,
            sort_by: SortKey::default(),
            order: SortOrder::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct QuantumQuery {
    quantum: f64,
}

impl Default for QuantumQuery {
    fn default() -> Self {
        Self { quantum: 1.0 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct TopQuery {
    top_n: usize,
    sort_by: SortKey,
    order: SortOrder,
    quantum: f64,
}

impl Default for TopQuery {
    fn default() -> Self {
        let params = CycleParams::default();
        Self {
            top_n: params.top_n,
            sort_by: params.sort_by,
            order: params.order,
            quantum: params.quantum,
        }
    }
}

fn check_quantum(quantum: f64) -> Result<f64, ApiError> {
    if quantum.is_finite() && quantum > 0.0 {
        Ok(quantum)
    } else {
        Err(ApiError::BadRequest(
            "quantum must be a positive number".to_string(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health(State(state): State<AppState>) -> Json<Value> {
    let (active, completed) = state.monitor.tracker().counts().await;
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "active_records": active,
            "completed_records": completed
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn list_processes(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(q) = query?;
    if q.page == 0 {
        return Err(ApiError::BadRequest("page must be >= 1".to_string()));
    }
    if q.page_size == 0 || q.page_size > MAX_PAGE_SIZE {
        return Err(ApiError::BadRequest(format!(
            "page_size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    let mut procs = state.monitor.list_processes().await?;
    inspect::sort_processes(&mut procs, q.sort_by, q.order);
    let page = inspect::paginate(procs, q.page, q.page_size);

    Ok(Json(json!({
        "data": page.results,
        "meta": {
            "page": page.page,
            "page_size": page.page_size,
            "total": page.total,
            "sort_by": q.sort_by,
            "order": q.order
        }
    })))
}

async fn kill_process(
    State(state): State<AppState>,
    path: Result<Path<Pid>, PathRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Path(pid) = path?;
    let outcome = state.monitor.terminate(pid).await?;
    let (status, label) = match outcome {
        KillOutcome::Terminated => (StatusCode::OK, "success"),
        KillOutcome::NotFound => (StatusCode::NOT_FOUND, "error"),
        KillOutcome::PermissionDenied => (StatusCode::FORBIDDEN, "error"),
    };
    Ok((
        status,
        Json(json!({
            "data": { "status": label, "message": outcome.message(pid) },
            "meta": { "pid": pid }
        })),
    ))
}

async fn predict_system(
    State(state): State<AppState>,
    query: Result<Query<QuantumQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(q) = query?;
    let quantum = check_quantum(q.quantum)?;
    let prediction = state.monitor.predict_system(quantum).await?;
    Ok(Json(json!({
        "data": prediction,
        "meta": { "quantum": quantum }
    })))
}

async fn predict_process(
    State(state): State<AppState>,
    path: Result<Path<Pid>, PathRejection>,
    query: Result<Query<QuantumQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(pid) = path?;
    let Query(q) = query?;
    let quantum = check_quantum(q.quantum)?;
    let item = state
        .monitor
        .predict_process(pid, quantum)
        .await?
        .ok_or_else(|| ApiError::NotFound("Process not found or access denied.".to_string()))?;
    Ok(Json(json!({
        "data": item,
        "meta": { "pid": pid, "quantum": quantum }
    })))
}

async fn predict_processes(
    State(state): State<AppState>,
    query: Result<Query<TopQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(q) = query?;
    if q.top_n == 0 || q.top_n > MAX_TOP_N {
        return Err(ApiError::BadRequest(format!(
            "top_n must be between 1 and {}",
            MAX_TOP_N
        )));
    }
    let params = CycleParams {
        top_n: q.top_n,
        sort_by: q.sort_by,
        order: q.order,
        quantum: check_quantum(q.quantum)?,
    };

    let report = state.monitor.run_cycle(params).await?;
    let count = report.items.len();
    Ok(Json(json!({
        "data": report.items,
        "meta": {
            "top_n": params.top_n,
            "sort_by": params.sort_by,
            "order": params.order,
            "quantum": params.quantum,
            "count": count,
            "observed": report.observed,
            "completed": report.completed
        }
    })))
}

async fn recent_completions(State(state): State<AppState>) -> Json<Value> {
    let feed = state.monitor.tracker().completion_feed().await;
    let count = feed.len();
    Json(json!({
        "data": feed,
        "meta": { "count": count }
    }))
}
