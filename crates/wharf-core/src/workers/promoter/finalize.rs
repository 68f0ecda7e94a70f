//! promoter.finalize: write the `ReleaseRecord` that makes a transition
//! visible to later promote/release/rollback plans (spec §4.6 step 4).

use chrono::Utc;
use wharf_artifacts::ArtifactStore;
use wharf_types::{ProjectOpMsg, ReleaseRecord};

use crate::bookkeeping::Bookkeeping;

use super::plan::Plan;

pub async fn finalize(
    plan: &Plan,
    msg: &ProjectOpMsg,
    artifacts: &dyn ArtifactStore,
    bookkeeping: &Bookkeeping,
) -> Result<ReleaseRecord, String> {
    let rendered_path = format!("{}/rendered.yaml", plan.transition_prefix);
    artifacts
        .get(&msg.project_id, &rendered_path)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("no rendered manifest at {rendered_path} to finalize"))?;

    let (rollback_source_release_id, rollback_scope, config_snapshot_path) = match &plan.rollback {
        Some(rb) => (
            Some(rb.release.id.clone()),
            Some(rb.scope),
            rb.release.config_snapshot_path.clone(),
        ),
        None => (None, None, None),
    };

    let at = Utc::now();
    let record = ReleaseRecord {
        id: String::new(),
        project_id: msg.project_id.clone(),
        environment: plan.to_env.clone(),
        operation_id: msg.op_id.clone(),
        operation_kind: msg.kind,
        stage: plan.stage,
        from_env: plan.from_env.clone(),
        to_env: Some(plan.to_env.clone()),
        image: plan.image.clone(),
        rendered_manifest_path: rendered_path,
        config_snapshot_path,
        rollback_safe: true,
        rollback_source_release_id,
        rollback_scope,
        created_at: at,
    };

    bookkeeping
        .persist_release_record(record, at)
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wharf_artifacts::InMemoryArtifactStore;
    use wharf_store::{InMemoryKvStore, KvStore};
    use wharf_types::{DeliveryDescriptor, OpKind};

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
    async fn finalize_persists_release_record() {
        let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::default());
        let events = Arc::new(crate::event_hub::EventHub::default());
        let bk = Bookkeeping::new(store.clone(), events);
        let artifacts = InMemoryArtifactStore::default();
        artifacts
            .put("p1", "promotions/dev-to-staging/rendered.yaml", b"image: p1:abcd\n".to_vec())
            .await
            .unwrap();

        let plan = Plan {
            from_env: Some("dev".into()),
            to_env: "staging".into(),
            stage: wharf_types::DeliveryStage::Promote,
            image: "p1:abcd".into(),
            transition_prefix: "promotions/dev-to-staging".into(),
            rollback: None,
        };

        let record = finalize(&plan, &msg(), &artifacts, &bk).await.unwrap();
        assert!(!record.id.is_empty());
        assert_eq!(record.image, "p1:abcd");
        assert_eq!(record.environment, "staging");

        let current = store.current_release("p1", "staging").await.unwrap();
        assert_eq!(current.as_deref(), Some(record.id.as_str()));
    }
}
