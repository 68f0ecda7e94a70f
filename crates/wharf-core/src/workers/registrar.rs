//! Registrar: first stage of the create/update/delete chain (spec §2 item 7).
//!
//! Confirms the project record the Orchestrator already wrote is the one
//! this message describes, then hands off to repoBootstrap. Delete requests
//! pass through unchanged — there's nothing to register for a teardown.

use std::sync::Arc;

use chrono::Utc;
use wharf_store::KvStore;
use wharf_types::{OpKind, ProjectOpMsg};

use crate::bookkeeping::Bookkeeping;
use crate::worker_runtime::{WorkerAction, WorkerOutput};

pub struct RegistrarAction {
    bookkeeping: Arc<Bookkeeping>,
    store: Arc<dyn KvStore>,
}

impl RegistrarAction {
    pub fn new(bookkeeping: Arc<Bookkeeping>, store: Arc<dyn KvStore>) -> Self {
        Self { bookkeeping, store }
    }
}

#[async_trait::async_trait]
impl WorkerAction for RegistrarAction {
    fn name(&self) -> &str {
        "registrar"
    }

    async fn run(&self, msg: &ProjectOpMsg) -> Result<WorkerOutput, String> {
        self.bookkeeping
            .mark_step_start(&msg.op_id, self.name(), Utc::now(), Some("registering".into()))
            .await
            .map_err(|e| e.to_string())?;

        let result = match self.store.get_project(&msg.project_id).await {
            Ok(Some(_)) => Ok(WorkerOutput::new(match msg.kind {
                OpKind::Delete => "registration marked for removal",
                _ => "registered",
            })),
            Ok(None) => Err(format!("project {} not found", msg.project_id)),
            Err(e) => Err(e.to_string()),
        };

        match &result {
            Ok(output) => {
                self.bookkeeping
                    .mark_step_end(&msg.op_id, self.name(), Utc::now(), Some(output.message.clone()), None, vec![])
                    .await
                    .map_err(|e| e.to_string())?;
            }
            Err(err) => {
                self.bookkeeping
                    .mark_step_end(&msg.op_id, self.name(), Utc::now(), None, Some(err.clone()), vec![])
                    .await
                    .map_err(|e| e.to_string())?;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc as ChronoUtc;
    use wharf_store::InMemoryKvStore;
    use wharf_types::{
        DeliveryDescriptor, NetworkPolicy, Operation, Project, ProjectSpec, RollbackDescriptor,
    };

    fn envelope(kind: OpKind) -> ProjectOpMsg {
        ProjectOpMsg {
            op_id: "op1".into(),
            kind,
            project_id: "p1".into(),
            spec: None,
            deploy_env: None,
            from_env: None,
            to_env: None,
            delivery: DeliveryDescriptor::default(),
            rollback_release_id: None,
            rollback_env: None,
            rollback_scope: None,
            rollback_override: Default::default(),
            upstream_err: None,
            at: ChronoUtc::now(),
        }
    }

    #[tokio::test]
    async fn registers_existing_project() {
        let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::default());
        let events = Arc::new(crate::event_hub::EventHub::default());
        let bk = Arc::new(Bookkeeping::new(store.clone(), events));

        let spec = ProjectSpec {
            name: "app".into(),
            runtime: "r1".into(),
            capabilities: vec![],
            environments: Default::default(),
            network_policy: NetworkPolicy::default(),
        };
        let project = Project::new("p1".into(), spec, ChronoUtc::now());
        store.put_project(&project).await.unwrap();
        let op = Operation::new(
            "op1".into(),
            OpKind::Create,
            "p1".into(),
            None,
            DeliveryDescriptor::default(),
            RollbackDescriptor::default(),
            ChronoUtc::now(),
        );
        store.put_op(&op).await.unwrap();

        let action = RegistrarAction::new(bk, store.clone());
        let output = action.run(&envelope(OpKind::Create)).await.unwrap();
        assert_eq!(output.message, "registered");

        let persisted = store.get_op("op1").await.unwrap().unwrap();
        assert_eq!(persisted.steps.len(), 1);
        assert!(persisted.steps[0].ended_at.is_some());
    }

    #[tokio::test]
    async fn missing_project_errors() {
        let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::default());
        let events = Arc::new(crate::event_hub::EventHub::default());
        let bk = Arc::new(Bookkeeping::new(store.clone(), events));
        let op = Operation::new(
            "op1".into(),
            OpKind::Create,
            "p1".into(),
            None,
            DeliveryDescriptor::default(),
            RollbackDescriptor::default(),
            ChronoUtc::now(),
        );
        store.put_op(&op).await.unwrap();

        let action = RegistrarAction::new(bk, store);
        let err = action.run(&envelope(OpKind::Create)).await.unwrap_err();
        assert!(err.contains("not found"));
    }
}
