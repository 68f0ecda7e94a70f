//! Orchestrator: operation admission & enqueue (spec §4.1).
//!
//! The only component that writes a fresh `Operation`/mutates a `Project`'s
//! top-level fields. Everything downstream (bookkeeping, workers) only ever
//! appends to an operation that already exists.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use wharf_bus::MessageBus;
use wharf_store::KvStore;
use wharf_types::{
    project, DeliveryDescriptor, OpKind, OpStatus, Operation, Project, ProjectPhase, ProjectSpec,
    ProjectStatus, RollbackDescriptor,
};

use crate::admission::AdmissionLocks;
use crate::error::CoreError;
use crate::event_hub::EventHub;

/// Caller-supplied shape for a single `enqueueOp` call.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub delivery: DeliveryDescriptor,
    pub rollback: RollbackDescriptor,
}

pub struct Orchestrator {
    store: Arc<dyn KvStore>,
    bus: Arc<dyn MessageBus>,
    events: Arc<EventHub>,
    admission: AdmissionLocks,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn KvStore>, bus: Arc<dyn MessageBus>, events: Arc<EventHub>) -> Self {
        Self {
            store,
            bus,
            events,
            admission: AdmissionLocks::new(),
        }
    }

    /// Admit and enqueue one operation for `project_id` (spec §4.1).
    ///
    /// `spec` is required for `create`/`update` and ignored otherwise (the
    /// stored spec is reused). Holds the per-project admission lock for the
    /// full admission-check + mutation + persist sequence so no second
    /// concurrent call for the same project can observe a half-applied
    /// state.
    #[instrument(skip(self, spec, options), fields(project_id = %project_id, kind = ?kind))]
    pub async fn enqueue_op(
        &self,
        kind: OpKind,
        project_id: &str,
        spec: Option<ProjectSpec>,
        options: EnqueueOptions,
    ) -> Result<Operation, CoreError> {
        let _admission_guard = self.admission.acquire(project_id).await;
        let now = Utc::now();

        let existing = self.store.get_project(project_id).await?;
        if let Some(project) = &existing {
            if let Some(active_id) = &project.status.last_op_id {
                if let Some(active_op) = self.store.get_op(active_id).await? {
                    if !active_op.status.is_terminal() {
                        return Err(CoreError::ActiveOperation {
                            project_id: project_id.to_string(),
                            op_id: active_op.id.clone(),
                            kind: active_op.kind,
                            status: active_op.status,
                        });
                    }
                }
            }
        }

        let normalized_spec = match (&existing, spec) {
            (_, Some(s)) => {
                let normalized = project::normalize(s);
                project::validate(&normalized).map_err(|e| CoreError::ValidationFailed(e.0))?;
                Some(normalized)
            }
            (Some(p), None) => Some(p.spec.clone()),
            (None, None) => None,
        };

        let op_id = wharf_types::ids::new_id();
        let op = Operation::new(
            op_id.clone(),
            kind,
            project_id.to_string(),
            normalized_spec.clone(),
            options.delivery,
            options.rollback,
            now,
        );

        let created_project = existing.is_none();
        let mut project = match existing {
            Some(mut p) => {
                if let Some(s) = normalized_spec.clone() {
                    p.spec = s;
                }
                p.updated_at = now;
                p
            }
            None => Project::new(
                project_id.to_string(),
                normalized_spec
                    .clone()
                    .ok_or_else(|| CoreError::ValidationFailed("spec required to create project".into()))?,
                now,
            ),
        };
        project.status = ProjectStatus::queued(op_id.clone(), kind, now);
        if kind == OpKind::Delete {
            project.status.phase = ProjectPhase::Deleting;
        }

        self.store.put_project(&project).await?;
        self.store.put_op(&op).await?;
        self.events.emit(&op_id, wharf_types::EventName::Bootstrap, op.clone());

        let envelope = wharf_types::ProjectOpMsg {
            op_id: op_id.clone(),
            kind,
            project_id: project_id.to_string(),
            spec: normalized_spec,
            deploy_env: op.delivery.environment.clone(),
            from_env: op.delivery.from_env.clone(),
            to_env: op.delivery.to_env.clone(),
            delivery: op.delivery.clone(),
            rollback_release_id: op.rollback.release_id.clone(),
            rollback_env: op.rollback.environment.clone(),
            rollback_scope: op.rollback.scope,
            rollback_override: op.rollback.override_vars.clone(),
            upstream_err: None,
            at: now,
        };
        let payload = serde_json::to_vec(&envelope).map_err(|e| CoreError::Internal(e.to_string()))?;

        if let Err(e) = self.bus.publish(kind.starting_subject(), payload).await {
            warn!(op_id = %op_id, error = %e, "publish failed, finalizing operation as error");
            let mut failed_op = op.clone();
            failed_op.status = OpStatus::Error;
            failed_op.finished_at = Some(now);
            failed_op.error = Some(format!("publish failed: {e}"));
            let _ = self.store.put_op(&failed_op).await;

            let mut project_rolled_back = false;
            if created_project {
                let _ = self.store.delete_project(project_id).await;
                project_rolled_back = true;
            }

            return Err(CoreError::PublishFailed {
                op_id: op_id.clone(),
                project_id: project_id.to_string(),
                requested_kind: kind,
                project_rolled_back,
                next_step: kind.starting_subject().to_string(),
                reason: e.to_string(),
            });
        }

        info!(op_id = %op_id, subject = kind.starting_subject(), "operation enqueued");
        Ok(op)
    }
}
