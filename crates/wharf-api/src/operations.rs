//! Operation admission and lookup (spec §4.1, §4.5).

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use wharf_core::EnqueueOptions;
use wharf_types::{DeliveryDescriptor, OpKind, Operation, Project, ProjectSpec, RollbackDescriptor};

use crate::error::{not_found, ApiError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/projects/:project_id/operations", post(enqueue))
        .route("/api/projects/:project_id", get(get_project))
        .route("/api/operations/:op_id", get(get_operation))
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub kind: OpKind,
    #[serde(default)]
    pub spec: Option<ProjectSpec>,
    #[serde(default)]
    pub delivery: DeliveryDescriptor,
    #[serde(default)]
    pub rollback: RollbackDescriptor,
    /// When set, the handler waits up to this many milliseconds for the
    /// operation's final worker result before falling back to returning the
    /// operation's current state (spec §4.5 "synchronous wait is optional").
    #[serde(default)]
    pub wait_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub operation: Operation,
    /// `true` if a worker's final result arrived within `wait_ms`; `false`
    /// means the caller should poll `GET /api/operations/:id` or subscribe
    /// to its SSE stream instead.
    pub resolved: bool,
}

async fn enqueue(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(req): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<EnqueueResponse>), ApiError> {
    let options = EnqueueOptions {
        delivery: req.delivery,
        rollback: req.rollback,
    };
    let op = state
        .orchestrator
        .enqueue_op(req.kind, &project_id, req.spec, options)
        .await?;

    let Some(wait_ms) = req.wait_ms else {
        return Ok((
            StatusCode::ACCEPTED,
            Json(EnqueueResponse {
                operation: op,
                resolved: false,
            }),
        ));
    };

    let rx = state.waiters.register(&op.id);
    let resolved = tokio::time::timeout(Duration::from_millis(wait_ms), rx).await.is_ok();
    if !resolved {
        state.waiters.unregister(&op.id);
    }

    let current = state.store.get_op(&op.id).await?.unwrap_or(op);
    let status = if resolved { StatusCode::OK } else { StatusCode::ACCEPTED };
    Ok((
        status,
        Json(EnqueueResponse {
            operation: current,
            resolved,
        }),
    ))
}

async fn get_operation(State(state): State<AppState>, Path(op_id): Path<String>) -> Result<Json<Operation>, ApiError> {
    state
        .store
        .get_op(&op_id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("operation {op_id} not found")))
}

async fn get_project(State(state): State<AppState>, Path(project_id): Path<String>) -> Result<Json<Project>, ApiError> {
    state
        .store
        .get_project(&project_id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("project {project_id} not found")))
}
