//! repoBootstrap: second stage of the create/update/delete chain.
//!
//! Ensures the project's source repository marker exists (the real git
//! plumbing is an external collaborator, spec §1 "explicitly out of
//! scope"); this worker only owns the bookkeeping and hand-off, writing a
//! small marker artifact so later stages (and `deploy/<env>` render) have
//! something concrete to point at.

use std::sync::Arc;

use chrono::Utc;
use wharf_artifacts::ArtifactStore;
use wharf_types::{OpKind, ProjectOpMsg};

use crate::bookkeeping::Bookkeeping;
use crate::worker_runtime::{WorkerAction, WorkerOutput};

const MARKER_PATH: &str = "repos/source/.paas/bootstrapped";

pub struct RepoBootstrapAction {
    bookkeeping: Arc<Bookkeeping>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl RepoBootstrapAction {
    pub fn new(bookkeeping: Arc<Bookkeeping>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { bookkeeping, artifacts }
    }
}

#[async_trait::async_trait]
impl WorkerAction for RepoBootstrapAction {
    fn name(&self) -> &str {
        "repoBootstrap"
    }

    async fn run(&self, msg: &ProjectOpMsg) -> Result<WorkerOutput, String> {
        self.bookkeeping
            .mark_step_start(&msg.op_id, self.name(), Utc::now(), Some("bootstrapping repo".into()))
            .await
            .map_err(|e| e.to_string())?;

        let result = if msg.kind == OpKind::Delete {
            self.artifacts
                .remove(&msg.project_id, MARKER_PATH)
                .await
                .map(|_| WorkerOutput::new("repo marker removed"))
                .map_err(|e| e.to_string())
        } else {
            self.artifacts
                .put(&msg.project_id, MARKER_PATH, msg.op_id.clone().into_bytes())
                .await
                .map(|_| WorkerOutput::with_artifacts("repo bootstrapped", vec![MARKER_PATH.to_string()]))
                .map_err(|e| e.to_string())
        };

        match &result {
            Ok(output) => {
                self.bookkeeping
                    .mark_step_end(
                        &msg.op_id,
                        self.name(),
                        Utc::now(),
                        Some(output.message.clone()),
                        None,
                        output.artifacts.clone(),
                    )
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
    use wharf_artifacts::InMemoryArtifactStore;
    use wharf_store::InMemoryKvStore;
    use wharf_types::DeliveryDescriptor;

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
            at: Utc::now(),
        }
    }

    fn action() -> (RepoBootstrapAction, Arc<dyn wharf_store::KvStore>) {
        let store: Arc<dyn wharf_store::KvStore> = Arc::new(InMemoryKvStore::default());
        let events = Arc::new(crate::event_hub::EventHub::default());
        let bk = Arc::new(Bookkeeping::new(store.clone(), events));
        let artifacts: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::default());
        (RepoBootstrapAction::new(bk, artifacts), store)
    }

    #[tokio::test]
    async fn writes_marker_for_create() {
        let (action, store) = action();
        let op = wharf_types::Operation::new(
            "op1".into(),
            OpKind::Create,
            "p1".into(),
            None,
            DeliveryDescriptor::default(),
            wharf_types::RollbackDescriptor::default(),
            Utc::now(),
        );
        store.put_op(&op).await.unwrap();
        let output = action.run(&envelope(OpKind::Create)).await.unwrap();
        assert_eq!(output.artifacts, vec![MARKER_PATH.to_string()]);
    }
}
