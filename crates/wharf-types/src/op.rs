use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::project::ProjectSpec;

/// Kind of lifecycle intent driving an `Operation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Create,
    Update,
    Delete,
    Ci,
    Deploy,
    Promote,
    Release,
    Rollback,
}

impl OpKind {
    /// The subject a freshly-enqueued operation of this kind is published to
    /// (see spec §4.1 step 5 and §6's subject table).
    pub fn starting_subject(self) -> &'static str {
        match self {
            OpKind::Create | OpKind::Update | OpKind::Delete => "project-op.start",
            OpKind::Ci => "bootstrap.done",
            OpKind::Deploy => "deployment.start",
            OpKind::Promote | OpKind::Release | OpKind::Rollback => "promotion.start",
        }
    }
}

/// Lifecycle tier of a release: deploy, promote, release (production), or
/// rollback's natural stage for the target environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStage {
    Deploy,
    Promote,
    Release,
}

/// Where in the pipeline (and between which environments) an operation sits.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeliveryDescriptor {
    pub stage: Option<DeliveryStage>,
    pub environment: Option<String>,
    pub from_env: Option<String>,
    pub to_env: Option<String>,
}

/// Read-only snapshot scope for a rollback: how much of the target release
/// is restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackScope {
    CodeOnly,
    CodeAndConfig,
    FullState,
}

/// Parameters of a `rollback` operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RollbackDescriptor {
    pub release_id: Option<String>,
    pub environment: Option<String>,
    pub scope: Option<RollbackScope>,
    #[serde(default)]
    pub override_vars: BTreeMap<String, String>,
}

/// Terminal or in-flight status of an `Operation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl OpStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OpStatus::Done | OpStatus::Error)
    }
}

/// One worker's contribution to an operation.
///
/// Matched by worker family, not exact name: `promoter.plan` and
/// `promoter.render` share one step, whose `worker` field tracks the most
/// recent sub-stage to touch it. This keeps "at most one step per
/// (op, worker-family)" true while a step's content still shows which
/// sub-stage last ran, for observability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpStep {
    pub worker: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub artifacts: Vec<String>,
}

impl OpStep {
    pub fn new_started(worker: impl Into<String>, at: DateTime<Utc>, message: Option<String>) -> Self {
        Self {
            worker: worker.into(),
            started_at: at,
            ended_at: None,
            message,
            error: None,
            artifacts: Vec::new(),
        }
    }
}

/// The worker-family portion of a (possibly staged) worker name:
/// `"promoter.plan"` -> `"promoter"`, `"registrar"` -> `"registrar"`.
pub fn family(worker: &str) -> &str {
    worker.split('.').next().unwrap_or(worker)
}

/// Whether `existing` and `candidate` belong to the same step identity:
/// same worker family, so `promoter.plan` and `promoter.render` coalesce
/// onto one `OpStep` (spec: "at most one step per (op, worker-family)").
pub fn same_step_identity(existing: &str, candidate: &str) -> bool {
    family(existing) == family(candidate)
}

/// A persisted lifecycle intent for a project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Operation {
    pub id: String,
    pub kind: OpKind,
    pub project_id: String,
    pub delivery: DeliveryDescriptor,
    pub rollback: RollbackDescriptor,
    pub requested_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: OpStatus,
    pub error: Option<String>,
    pub steps: Vec<OpStep>,
    /// Normalized spec captured at enqueue time (empty for `delete`).
    pub spec: Option<ProjectSpec>,
}

impl Operation {
    pub fn new(
        id: String,
        kind: OpKind,
        project_id: String,
        spec: Option<ProjectSpec>,
        delivery: DeliveryDescriptor,
        rollback: RollbackDescriptor,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind,
            project_id,
            delivery,
            rollback,
            requested_at: now,
            finished_at: None,
            status: OpStatus::Queued,
            error: None,
            steps: Vec::new(),
            spec,
        }
    }

    /// Find the step matching `worker`'s family, if any.
    pub fn find_step(&self, worker: &str) -> Option<&OpStep> {
        self.steps.iter().find(|s| same_step_identity(&s.worker, worker))
    }

    pub fn find_step_mut(&mut self, worker: &str) -> Option<&mut OpStep> {
        self.steps.iter_mut().find(|s| same_step_identity(&s.worker, worker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_worker_shares_family_and_step_identity() {
        assert_eq!(family("promoter.plan"), "promoter");
        assert_eq!(family("registrar"), "registrar");
        assert!(same_step_identity("promoter.plan", "promoter.render"));
        assert!(!same_step_identity("promoter.plan", "deployer"));
    }

    #[test]
    fn starting_subject_routes_by_kind() {
        assert_eq!(OpKind::Create.starting_subject(), "project-op.start");
        assert_eq!(OpKind::Ci.starting_subject(), "bootstrap.done");
        assert_eq!(OpKind::Deploy.starting_subject(), "deployment.start");
        assert_eq!(OpKind::Rollback.starting_subject(), "promotion.start");
    }
}
