use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::op::{DeliveryDescriptor, OpKind, RollbackScope};
use crate::project::ProjectSpec;

/// Shared pipeline envelope (`ProjectOpMsg`, spec §6). Every subject in the
/// worker chain agrees on this shape; the result of worker_i is re-shaped
/// into the input of worker_{i+1} by [`crate::envelope::WorkerResultMsg::into_next`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectOpMsg {
    pub op_id: String,
    pub kind: OpKind,
    pub project_id: String,
    #[serde(default)]
    pub spec: Option<ProjectSpec>,
    #[serde(default)]
    pub deploy_env: Option<String>,
    #[serde(default)]
    pub from_env: Option<String>,
    #[serde(default)]
    pub to_env: Option<String>,
    #[serde(default)]
    pub delivery: DeliveryDescriptor,
    #[serde(default)]
    pub rollback_release_id: Option<String>,
    #[serde(default)]
    pub rollback_env: Option<String>,
    #[serde(default)]
    pub rollback_scope: Option<RollbackScope>,
    #[serde(default)]
    pub rollback_override: std::collections::BTreeMap<String, String>,
    /// Non-empty signals a downstream worker that an upstream worker already
    /// failed; subsequent workers must skip (§4.2 step 1).
    #[serde(default)]
    pub upstream_err: Option<String>,
    pub at: DateTime<Utc>,
}

impl ProjectOpMsg {
    pub fn with_upstream_err(mut self, err: impl Into<String>) -> Self {
        self.upstream_err = Some(err.into());
        self
    }
}

/// The output of a worker action: the envelope plus observability fields.
/// Encoded as the input of the next worker — the decoder ignores the extra
/// `worker`/`message`/`artifacts` fields it ships in `ProjectOpMsg`'s place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerResultMsg {
    #[serde(flatten)]
    pub envelope: ProjectOpMsg,
    pub worker: String,
    pub message: String,
    #[serde(default)]
    pub artifacts: Vec<String>,
}

impl WorkerResultMsg {
    /// Re-shape this result as the `ProjectOpMsg` the next worker's input
    /// decoder accepts unchanged (spec §4.2 step 3 / §9 "cross-worker carry").
    pub fn into_next(self, at: DateTime<Utc>) -> ProjectOpMsg {
        let mut envelope = self.envelope;
        envelope.at = at;
        envelope
    }
}
