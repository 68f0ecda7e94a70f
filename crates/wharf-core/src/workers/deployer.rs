//! deployer: terminal worker for both the create/update/delete chain and
//! the standalone `deploy` operation kind (spec §2 item 7, §6 subjects
//! `deploy.done` / `deployment.done`).
//!
//! Applies the rendered manifest (the real cluster apply is an external
//! collaborator) and, for every kind except `delete`, writes the
//! `ReleaseRecord` that makes this delivery visible to promote/release
//! later (spec §3 "ReleaseRecord exclusively written by the terminal
//! worker of its operation").

use std::sync::Arc;

use chrono::Utc;
use wharf_artifacts::ArtifactStore;
use wharf_types::{DeliveryStage, OpKind, ProjectOpMsg, ReleaseRecord};

use crate::bookkeeping::Bookkeeping;
use crate::worker_runtime::{WorkerAction, WorkerOutput};

const DEFAULT_ENV: &str = "dev";

fn target_env(msg: &ProjectOpMsg) -> String {
    msg.deploy_env
        .clone()
        .or_else(|| msg.delivery.environment.clone())
        .unwrap_or_else(|| DEFAULT_ENV.to_string())
}

pub struct DeployerAction {
    bookkeeping: Arc<Bookkeeping>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl DeployerAction {
    pub fn new(bookkeeping: Arc<Bookkeeping>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { bookkeeping, artifacts }
    }

    async fn deploy(&self, msg: &ProjectOpMsg) -> Result<WorkerOutput, String> {
        if msg.kind == OpKind::Delete {
            return Ok(WorkerOutput::new("skipped: nothing to deploy for delete"));
        }

        let env = target_env(msg);
        let rendered_path = format!("deploy/{env}/rendered.yaml");
        let rendered = self
            .artifacts
            .get(&msg.project_id, &rendered_path)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("no rendered manifest at {rendered_path}"))?;
        let rendered_text = String::from_utf8_lossy(&rendered).to_string();
        let image = rendered_text
            .lines()
            .find_map(|l| l.strip_prefix("image: "))
            .unwrap_or("unknown")
            .to_string();

        let deployment_path = format!("deploy/{env}/deployment.yaml");
        self.artifacts
            .put(&msg.project_id, &deployment_path, rendered.clone())
            .await
            .map_err(|e| e.to_string())?;

        let service_path = format!("deploy/{env}/service.yaml");
        let service_doc = format!(
            "apiVersion: v1\nkind: Service\nmetadata:\n  name: {project}-{env}\nspec:\n  selector:\n    app: {project}\n    env: {env}\n  ports:\n    - port: 80\n      targetPort: 8080\n",
            project = msg.project_id,
        );
        self.artifacts
            .put(&msg.project_id, &service_path, service_doc.into_bytes())
            .await
            .map_err(|e| e.to_string())?;

        let at = Utc::now();
        let record = ReleaseRecord {
            id: String::new(),
            project_id: msg.project_id.clone(),
            environment: env.clone(),
            operation_id: msg.op_id.clone(),
            operation_kind: msg.kind,
            stage: DeliveryStage::Deploy,
            from_env: msg.from_env.clone(),
            to_env: Some(env.clone()),
            image,
            rendered_manifest_path: rendered_path,
            config_snapshot_path: None,
            rollback_safe: true,
            rollback_source_release_id: None,
            rollback_scope: None,
            created_at: at,
        };
        self.bookkeeping
            .persist_release_record(record, at)
            .await
            .map_err(|e| e.to_string())?;

        Ok(WorkerOutput::with_artifacts(
            format!("deployed to {env}"),
            vec![deployment_path, service_path],
        ))
    }
}

#[async_trait::async_trait]
impl WorkerAction for DeployerAction {
    fn name(&self) -> &str {
        "deployer"
    }

    async fn run(&self, msg: &ProjectOpMsg) -> Result<WorkerOutput, String> {
        self.bookkeeping
            .mark_step_start(&msg.op_id, self.name(), Utc::now(), Some("deploying".into()))
            .await
            .map_err(|e| e.to_string())?;

        let result = self.deploy(msg).await;

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
    use wharf_store::{InMemoryKvStore, KvStore};
    use wharf_types::{DeliveryDescriptor, Operation, RollbackDescriptor};

    #[tokio::test]
    async fn deploy_writes_release_record() {
        let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::default());
        let events = Arc::new(crate::event_hub::EventHub::default());
        let bk = Arc::new(Bookkeeping::new(store.clone(), events));
        let artifacts: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::default());
        artifacts
            .put("p1", "deploy/dev/rendered.yaml", b"image: p1:abcd1234\nenvironment: dev\n".to_vec())
            .await
            .unwrap();
        let action = DeployerAction::new(bk, artifacts.clone());

        let op = Operation::new(
            "op1".into(),
            OpKind::Deploy,
            "p1".into(),
            None,
            DeliveryDescriptor::default(),
            RollbackDescriptor::default(),
            Utc::now(),
        );
        store.put_op(&op).await.unwrap();

        let msg = ProjectOpMsg {
            op_id: "op1".into(),
            kind: OpKind::Deploy,
            project_id: "p1".into(),
            spec: None,
            deploy_env: Some("dev".into()),
            from_env: None,
            to_env: None,
            delivery: DeliveryDescriptor::default(),
            rollback_release_id: None,
            rollback_env: None,
            rollback_scope: None,
            rollback_override: Default::default(),
            upstream_err: None,
            at: Utc::now(),
        };
        let output = action.run(&msg).await.unwrap();
        assert_eq!(output.message, "deployed to dev");

        let current = store.current_release("p1", "dev").await.unwrap();
        assert!(current.is_some());

        let service = artifacts.get("p1", "deploy/dev/service.yaml").await.unwrap();
        assert!(service.is_some());
    }

    #[tokio::test]
    async fn delete_skips_deploy() {
        let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::default());
        let events = Arc::new(crate::event_hub::EventHub::default());
        let bk = Arc::new(Bookkeeping::new(store.clone(), events));
        let artifacts: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::default());
        let action = DeployerAction::new(bk, artifacts);

        let op = Operation::new(
            "op1".into(),
            OpKind::Delete,
            "p1".into(),
            None,
            DeliveryDescriptor::default(),
            RollbackDescriptor::default(),
            Utc::now(),
        );
        store.put_op(&op).await.unwrap();

        let msg = ProjectOpMsg {
            op_id: "op1".into(),
            kind: OpKind::Delete,
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
        };
        let output = action.run(&msg).await.unwrap();
        assert!(output.message.starts_with("skipped"));
    }
}
