//! The stable error vocabulary surfaced to callers of the engine (spec §7).

use thiserror::Error;
use wharf_types::{OpKind, OpStatus};

/// Errors the orchestrator and promoter surface synchronously. Worker-
/// internal failures never reach this type directly — they flow downstream
/// as `upstream_err` and, on retry exhaustion, become a terminal `Done`/
/// `Error` operation instead (spec §7 "Propagation policy").
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("project {project_id} has an active operation {op_id} ({kind:?}, {status:?})")]
    ActiveOperation {
        project_id: String,
        op_id: String,
        kind: OpKind,
        status: OpStatus,
    },

    #[error("failed to publish operation {op_id} for project {project_id}: {reason}")]
    PublishFailed {
        op_id: String,
        project_id: String,
        requested_kind: OpKind,
        project_rolled_back: bool,
        next_step: String,
        reason: String,
    },

    #[error("worker delivery exhausted retries for operation {0}")]
    WorkerRetryExhausted(String),

    #[error("upstream error skipped by worker '{worker}': {upstream_err}")]
    UpstreamErrorSkipped { worker: String, upstream_err: String },

    #[error("preflight blocked: {0}")]
    PreflightBlocked(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<wharf_store::StoreError> for CoreError {
    fn from(e: wharf_store::StoreError) -> Self {
        CoreError::Internal(e.to_string())
    }
}

impl From<wharf_artifacts::ArtifactError> for CoreError {
    fn from(e: wharf_artifacts::ArtifactError) -> Self {
        CoreError::Internal(e.to_string())
    }
}

impl From<wharf_bus::BusError> for CoreError {
    fn from(e: wharf_bus::BusError) -> Self {
        CoreError::Internal(e.to_string())
    }
}
