//! Maps [`CoreError`]/[`StoreError`] onto HTTP status + JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use wharf_core::CoreError;
use wharf_store::StoreError;

pub struct ApiError(StatusCode, String, Option<Value>);

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorBody { error: self.1, details: self.2 })).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        // Structured fields spec §7/§4.1 require callers to be able to act
        // on (e.g. the conflicting op id, or whether a rolled-back create
        // needs no cleanup) ride alongside the message instead of being
        // flattened into it.
        let details = match &err {
            CoreError::ActiveOperation { project_id, op_id, kind, status } => Some(json!({
                "project_id": project_id,
                "op_id": op_id,
                "kind": kind,
                "status": status,
            })),
            CoreError::PublishFailed { op_id, project_id, requested_kind, project_rolled_back, next_step, .. } => {
                Some(json!({
                    "op_id": op_id,
                    "project_id": project_id,
                    "requested_kind": requested_kind,
                    "project_rolled_back": project_rolled_back,
                    "next_step": next_step,
                }))
            }
            CoreError::UpstreamErrorSkipped { worker, upstream_err } => Some(json!({
                "worker": worker,
                "upstream_err": upstream_err,
            })),
            _ => None,
        };
        let status = match &err {
            CoreError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            CoreError::ActiveOperation { .. } => StatusCode::CONFLICT,
            CoreError::PublishFailed { .. } => StatusCode::BAD_GATEWAY,
            CoreError::WorkerRetryExhausted(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CoreError::UpstreamErrorSkipped { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            CoreError::PreflightBlocked(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(status, err.to_string(), details)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::ProjectNotFound(_) | StoreError::OperationNotFound(_) | StoreError::ReleaseNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            StoreError::Serialization(_) | StoreError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(status, err.to_string(), None)
    }
}

pub fn not_found(message: impl Into<String>) -> ApiError {
    ApiError(StatusCode::NOT_FOUND, message.into(), None)
}
