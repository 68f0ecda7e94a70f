//! CI webhook intake with commit-hash dedupe (spec §4.7, §8 property 5).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use wharf_core::EnqueueOptions;
use wharf_types::OpKind;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/projects/:project_id/webhooks/ci", post(receive_ci_webhook))
}

#[derive(Debug, Deserialize)]
pub struct CiWebhookRequest {
    pub commit_hash: String,
}

#[derive(Debug, Serialize)]
pub struct CiWebhookResponse {
    pub accepted: bool,
    pub op_id: Option<String>,
    pub reason: Option<String>,
}

async fn receive_ci_webhook(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(req): Json<CiWebhookRequest>,
) -> Result<(StatusCode, Json<CiWebhookResponse>), ApiError> {
    let is_new = state.commit_dedupe.check_and_record(&project_id, &req.commit_hash).await?;
    if !is_new {
        return Ok((
            StatusCode::ACCEPTED,
            Json(CiWebhookResponse {
                accepted: false,
                op_id: None,
                reason: Some("ignored: commit already processed".to_string()),
            }),
        ));
    }

    let op = state
        .orchestrator
        .enqueue_op(OpKind::Ci, &project_id, None, EnqueueOptions::default())
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CiWebhookResponse {
            accepted: true,
            op_id: Some(op.id),
            reason: None,
        }),
    ))
}
