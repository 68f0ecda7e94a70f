//! Bookkeeping (spec §2.3, §4.3).
//!
//! Turns worker progress (start/end of a step) and pipeline outcomes
//! (finalize) into mutations of the persisted `Operation`/`Project` plus
//! events on the Event Hub. `finalize_op` is the one place the
//! single-terminal-event invariant (spec §8 property 1) is enforced: it
//! takes a per-operation lock so two redelivered "last step" messages can
//! never both race past the `is_terminal()` check.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use wharf_store::KvStore;
use wharf_types::{
    EventName, OpKind, OpStatus, OpStep, Operation, ProjectPhase, ProjectStatus, ReleaseRecord,
};

use crate::error::CoreError;
use crate::event_hub::EventHub;
use crate::locks::KeyedLocks;

pub struct Bookkeeping {
    store: Arc<dyn KvStore>,
    events: Arc<EventHub>,
    finalize_locks: KeyedLocks,
}

impl Bookkeeping {
    pub fn new(store: Arc<dyn KvStore>, events: Arc<EventHub>) -> Self {
        Self {
            store,
            events,
            finalize_locks: KeyedLocks::new(),
        }
    }

    async fn load_op(&self, op_id: &str) -> Result<Operation, CoreError> {
        self.store
            .get_op(op_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("operation {op_id}")))
    }

    /// Record that `worker` has started on `op_id`. Matching is by worker
    /// family (spec §4.3, §9): a redelivery of the exact same worker
    /// coalesces onto the existing step without resetting its clock; a new
    /// sub-stage within the same family (e.g. `promoter.plan` then
    /// `promoter.render`) advances that one step in place, so at most one
    /// step ever exists per `(op, worker-family)`. The operation moves to
    /// `Running` on its first recorded step.
    pub async fn mark_step_start(
        &self,
        op_id: &str,
        worker: &str,
        at: DateTime<Utc>,
        message: Option<String>,
    ) -> Result<(), CoreError> {
        let mut op = self.load_op(op_id).await?;

        match op.find_step_mut(worker) {
            Some(existing) if existing.worker == worker => {
                // Redelivery of the same sub-stage: idempotent coalesce.
                if message.is_some() {
                    existing.message = message;
                }
            }
            Some(existing) => {
                // A new sub-stage in the same family: advance the step.
                existing.worker = worker.to_string();
                existing.started_at = at;
                existing.ended_at = None;
                existing.message = message;
                existing.error = None;
                existing.artifacts.clear();
            }
            None => op.steps.push(OpStep::new_started(worker, at, message)),
        }

        if op.status == OpStatus::Queued {
            op.status = OpStatus::Running;
        }

        self.store.put_op(&op).await?;
        self.events.emit(op_id, EventName::StepStarted, op);
        Ok(())
    }

    /// Record that `worker` has ended on `op_id`. A step ending without a
    /// matching start (e.g. process restart between the publish and the
    /// bookkeeping call) is tolerated by synthesizing a zero-length step.
    #[allow(clippy::too_many_arguments)]
    pub async fn mark_step_end(
        &self,
        op_id: &str,
        worker: &str,
        at: DateTime<Utc>,
        message: Option<String>,
        error: Option<String>,
        artifacts: Vec<String>,
    ) -> Result<(), CoreError> {
        let mut op = self.load_op(op_id).await?;

        match op.find_step_mut(worker) {
            Some(existing) => {
                existing.worker = worker.to_string();
                existing.ended_at = Some(at);
                existing.message = message;
                existing.error = error;
                existing.artifacts = artifacts;
            }
            None => {
                let mut step = OpStep::new_started(worker, at, message);
                step.ended_at = Some(at);
                step.error = error;
                step.artifacts = artifacts;
                op.steps.push(step);
            }
        }

        self.store.put_op(&op).await?;
        self.events.emit(op_id, EventName::StepEnded, op);
        Ok(())
    }

    /// Bring an operation to its terminal state exactly once, updating the
    /// owning project's denormalized status and emitting `op.status`
    /// followed by the single terminal event (spec §8 property 1).
    ///
    /// Idempotent: calling this again on an already-terminal operation is a
    /// no-op, so a redelivered final message can never double-finalize.
    pub async fn finalize_op(
        &self,
        op_id: &str,
        project_id: &str,
        kind: OpKind,
        status: OpStatus,
        error: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let _guard = self.finalize_locks.acquire(op_id).await;

        let mut op = self.load_op(op_id).await?;
        if op.status.is_terminal() {
            return Ok(());
        }

        op.status = status;
        op.finished_at = Some(at);
        op.error = error.clone();
        self.store.put_op(&op).await?;
        self.events.emit(op_id, EventName::Status, op.clone());

        self.finalize_project(project_id, &op, kind, status, error.as_deref(), at)
            .await?;

        let terminal_name = match status {
            OpStatus::Done => EventName::Completed,
            OpStatus::Error => EventName::Failed,
            OpStatus::Queued | OpStatus::Running => {
                return Err(CoreError::Internal(format!(
                    "finalize_op called with non-terminal status {status:?}"
                )))
            }
        };
        self.events.emit(op_id, terminal_name, op);
        Ok(())
    }

    async fn finalize_project(
        &self,
        project_id: &str,
        op: &Operation,
        kind: OpKind,
        status: OpStatus,
        error: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        if kind == OpKind::Delete && status == OpStatus::Done {
            self.store.delete_project(project_id).await?;
            return Ok(());
        }

        let Some(mut project) = self.store.get_project(project_id).await? else {
            // The project may legitimately be gone already (e.g. a stray
            // retry of a delete's finalize after the record was removed).
            return Ok(());
        };

        let phase = match status {
            OpStatus::Done => ProjectPhase::Ready,
            OpStatus::Error => ProjectPhase::Error,
            OpStatus::Queued | OpStatus::Running => ProjectPhase::Reconciling,
        };
        project.status = ProjectStatus {
            phase,
            last_op_id: Some(op.id.clone()),
            last_op_kind: Some(kind),
            updated_at: at,
            message: error.map(str::to_string).unwrap_or_else(|| "ok".to_string()),
        };
        project.updated_at = at;
        self.store.put_project(&project).await?;
        Ok(())
    }

    /// Persist a release record, assigning its id and timestamp if absent,
    /// and update the project's `(environment)` release index and current
    /// pointer (spec §3 "Release index monotonicity").
    pub async fn persist_release_record(
        &self,
        mut record: ReleaseRecord,
        at: DateTime<Utc>,
    ) -> Result<ReleaseRecord, CoreError> {
        if record.id.is_empty() {
            record.id = wharf_types::ids::new_id();
        }
        record.created_at = at;
        let record = record.normalize();
        self.store.put_release(&record).await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wharf_store::InMemoryKvStore;
    use wharf_types::{DeliveryDescriptor, RollbackDescriptor};

    fn bookkeeping() -> (Bookkeeping, Arc<dyn KvStore>) {
        let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::default());
        let events = Arc::new(EventHub::default());
        (Bookkeeping::new(store.clone(), events), store)
    }

    async fn seed_op(store: &Arc<dyn KvStore>, id: &str, project_id: &str) {
        let op = Operation::new(
            id.to_string(),
            OpKind::Deploy,
            project_id.to_string(),
            None,
            DeliveryDescriptor::default(),
            RollbackDescriptor::default(),
            Utc::now(),
        );
        store.put_op(&op).await.unwrap();
    }

    async fn seed_project(store: &Arc<dyn KvStore>, id: &str) {
        use wharf_types::{NetworkPolicy, Project, ProjectSpec};
        use std::collections::BTreeMap;

        let spec = ProjectSpec {
            name: id.to_string(),
            runtime: "node".into(),
            capabilities: vec![],
            environments: BTreeMap::new(),
            network_policy: NetworkPolicy::default(),
        };
        let spec = wharf_types::project::normalize(spec);
        let project = Project::new(id.to_string(), spec, Utc::now());
        store.put_project(&project).await.unwrap();
    }

    #[tokio::test]
    async fn mark_step_start_moves_op_to_running_and_appends_step() {
        let (bk, store) = bookkeeping();
        seed_op(&store, "op1", "p1").await;

        bk.mark_step_start("op1", "registrar", Utc::now(), Some("go".into()))
            .await
            .unwrap();

        let op = store.get_op("op1").await.unwrap().unwrap();
        assert_eq!(op.status, OpStatus::Running);
        assert_eq!(op.steps.len(), 1);
        assert_eq!(op.steps[0].worker, "registrar");
    }

    #[tokio::test]
    async fn redelivered_start_coalesces_onto_same_step() {
        let (bk, store) = bookkeeping();
        seed_op(&store, "op1", "p1").await;

        bk.mark_step_start("op1", "registrar", Utc::now(), Some("first".into()))
            .await
            .unwrap();
        bk.mark_step_start("op1", "registrar", Utc::now(), Some("second".into()))
            .await
            .unwrap();

        let op = store.get_op("op1").await.unwrap().unwrap();
        assert_eq!(op.steps.len(), 1);
        assert_eq!(op.steps[0].message.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn staged_steps_coalesce_onto_one_family_step() {
        let (bk, store) = bookkeeping();
        seed_op(&store, "op1", "p1").await;

        bk.mark_step_start("op1", "promoter.plan", Utc::now(), None)
            .await
            .unwrap();
        bk.mark_step_start("op1", "promoter.render", Utc::now(), None)
            .await
            .unwrap();

        let op = store.get_op("op1").await.unwrap().unwrap();
        assert_eq!(op.steps.len(), 1);
        assert_eq!(op.steps[0].worker, "promoter.render");
    }

    #[tokio::test]
    async fn end_without_start_synthesizes_zero_length_step() {
        let (bk, store) = bookkeeping();
        seed_op(&store, "op1", "p1").await;

        bk.mark_step_end("op1", "deployer", Utc::now(), Some("done".into()), None, vec![])
            .await
            .unwrap();

        let op = store.get_op("op1").await.unwrap().unwrap();
        assert_eq!(op.steps.len(), 1);
        assert_eq!(op.steps[0].started_at, op.steps[0].ended_at.unwrap());
    }

    #[tokio::test]
    async fn finalize_op_is_idempotent_and_updates_project() {
        let (bk, store) = bookkeeping();
        seed_op(&store, "op1", "p1").await;
        seed_project(&store, "p1").await;

        bk.finalize_op("op1", "p1", OpKind::Deploy, OpStatus::Done, None, Utc::now())
            .await
            .unwrap();
        // Second finalize call must not error or change anything.
        bk.finalize_op("op1", "p1", OpKind::Deploy, OpStatus::Error, Some("late".into()), Utc::now())
            .await
            .unwrap();

        let op = store.get_op("op1").await.unwrap().unwrap();
        assert_eq!(op.status, OpStatus::Done);
        assert!(op.error.is_none());

        let project = store.get_project("p1").await.unwrap().unwrap();
        assert_eq!(project.status.phase, ProjectPhase::Ready);
    }

    #[tokio::test]
    async fn finalize_op_deletes_project_on_terminal_delete() {
        let (bk, store) = bookkeeping();
        seed_op(&store, "op1", "p1").await;
        seed_project(&store, "p1").await;

        bk.finalize_op("op1", "p1", OpKind::Delete, OpStatus::Done, None, Utc::now())
            .await
            .unwrap();

        assert!(store.get_project("p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn persist_release_record_assigns_id_and_timestamp() {
        let (bk, _store) = bookkeeping();
        let record = ReleaseRecord {
            id: String::new(),
            project_id: "p1".into(),
            environment: "prod".into(),
            operation_id: "op1".into(),
            operation_kind: OpKind::Deploy,
            stage: wharf_types::DeliveryStage::Deploy,
            from_env: None,
            to_env: None,
            image: "img:1".into(),
            rendered_manifest_path: "manifests/prod.yaml".into(),
            config_snapshot_path: Some("config/prod.json".into()),
            rollback_safe: true,
            rollback_source_release_id: None,
            rollback_scope: None,
            created_at: Utc::now(),
        };
        let saved = bk.persist_release_record(record, Utc::now()).await.unwrap();
        assert!(!saved.id.is_empty());
    }
}
