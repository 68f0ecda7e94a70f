//! promoter.commit: record the transition in the manifests trail and flip
//! the project back to `Ready` (spec §4.6 step 3).
//!
//! Unlike the other workers, commit touches the project record directly
//! instead of going through [`crate::bookkeeping::Bookkeeping::finalize_op`]:
//! the project only becomes `Ready` once the transition's manifests are
//! durably committed, which happens here, one sub-stage before the op
//! itself reaches a terminal state in `finalize`. This is a deliberate
//! split of the single "advance project status" responsibility the other
//! workers leave entirely to bookkeeping.

use chrono::Utc;
use wharf_artifacts::ArtifactStore;
use wharf_store::KvStore;
use wharf_types::{ProjectOpMsg, ProjectPhase};

use super::plan::Plan;

const COMMIT_PREFIX: &str = "platform-sync:";

pub async fn commit(plan: &Plan, msg: &ProjectOpMsg, store: &dyn KvStore, artifacts: &dyn ArtifactStore) -> Result<(), String> {
    let summary = match &plan.rollback {
        Some(rb) => format!(
            "{COMMIT_PREFIX} rollback {} to release {} ({:?})",
            plan.to_env, rb.release.id, rb.scope
        ),
        None => format!(
            "{COMMIT_PREFIX} {} {} -> {}",
            if msg.kind == wharf_types::OpKind::Release { "release" } else { "promote" },
            plan.from_env_label(),
            plan.to_env
        ),
    };
    let log_path = format!("{}/commit.log", plan.transition_prefix);
    artifacts
        .put(&msg.project_id, &log_path, summary.into_bytes())
        .await
        .map_err(|e| e.to_string())?;

    let mut project = store
        .get_project(&msg.project_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("project {} not found", msg.project_id))?;
    project.status.phase = ProjectPhase::Ready;
    project.status.message = format!("delivered to {}", plan.to_env);
    project.status.updated_at = Utc::now();
    project.updated_at = Utc::now();
    store.put_project(&project).await.map_err(|e| e.to_string())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wharf_artifacts::InMemoryArtifactStore;
    use wharf_store::InMemoryKvStore;
    use wharf_types::{DeliveryDescriptor, DeliveryStage, NetworkPolicy, OpKind, Project, ProjectSpec};

    fn msg() -> ProjectOpMsg {
        ProjectOpMsg {
            op_id: "op1".into(),
            kind: OpKind::Promote,
            project_id: "p1".into(),
            spec: None,
            deploy_env: None,
            from_env: Some("dev".into()),
            to_env: Some("staging".into()),
            delivery: DeliveryDescriptor::default(),
            rollback_release_id: None,
            rollback_env: None,
            rollback_scope: None,
            rollback_override: Default::default(),
            upstream_err: None,
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn commit_writes_log_and_marks_project_ready() {
        let store = InMemoryKvStore::default();
        let artifacts = InMemoryArtifactStore::default();
        let spec = ProjectSpec {
            name: "app".into(),
            runtime: "r1".into(),
            capabilities: vec![],
            environments: Default::default(),
            network_policy: NetworkPolicy::default(),
        };
        let mut project = Project::new("p1".into(), spec, Utc::now());
        project.status.phase = ProjectPhase::Reconciling;
        store.put_project(&project).await.unwrap();

        let plan = Plan {
            from_env: Some("dev".into()),
            to_env: "staging".into(),
            stage: DeliveryStage::Promote,
            image: "p1:abcd".into(),
            transition_prefix: "promotions/dev-to-staging".into(),
            rollback: None,
        };
        commit(&plan, &msg(), &store, &artifacts).await.unwrap();

        let log = artifacts
            .get("p1", "promotions/dev-to-staging/commit.log")
            .await
            .unwrap()
            .unwrap();
        assert!(String::from_utf8(log).unwrap().starts_with(COMMIT_PREFIX));

        let project = store.get_project("p1").await.unwrap().unwrap();
        assert_eq!(project.status.phase, ProjectPhase::Ready);
    }
}
