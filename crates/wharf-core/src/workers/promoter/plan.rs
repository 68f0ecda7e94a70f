//! promoter.plan: validate the request and resolve images (spec §4.6 step 1).

use std::collections::BTreeMap;

use wharf_artifacts::ArtifactStore;
use wharf_store::KvStore;
use wharf_types::{ids, DeliveryStage, OpKind, ProjectOpMsg, ReleaseRecord, RollbackScope};

pub struct RollbackPlan {
    pub release: ReleaseRecord,
    pub scope: RollbackScope,
    pub override_vars: BTreeMap<String, String>,
}

pub struct Plan {
    pub from_env: Option<String>,
    pub to_env: String,
    pub stage: DeliveryStage,
    pub image: String,
    pub transition_prefix: String,
    pub rollback: Option<RollbackPlan>,
}

impl Plan {
    pub fn from_env_label(&self) -> &str {
        self.from_env.as_deref().unwrap_or("-")
    }
}

fn derive_stage(kind: OpKind, to_env: &str, explicit: Option<DeliveryStage>) -> DeliveryStage {
    if let Some(stage) = explicit {
        return stage;
    }
    match kind {
        OpKind::Release => DeliveryStage::Release,
        OpKind::Promote => {
            if to_env == "prod" {
                DeliveryStage::Release
            } else {
                DeliveryStage::Promote
            }
        }
        OpKind::Rollback => match to_env {
            "dev" => DeliveryStage::Deploy,
            "prod" => DeliveryStage::Release,
            _ => DeliveryStage::Promote,
        },
        _ => DeliveryStage::Promote,
    }
}

async fn resolve_source_image(
    project_id: &str,
    env: &str,
    artifacts: &dyn ArtifactStore,
) -> Result<String, String> {
    let rendered_path = format!("deploy/{env}/rendered.yaml");
    if let Some(bytes) = artifacts.get(project_id, &rendered_path).await.map_err(|e| e.to_string())? {
        let text = String::from_utf8_lossy(&bytes).to_string();
        if let Some(image) = text.lines().find_map(|l| l.strip_prefix("image: ")) {
            return Ok(image.to_string());
        }
    }
    artifacts
        .get(project_id, "build/image.txt")
        .await
        .map_err(|e| e.to_string())?
        .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
        .ok_or_else(|| format!("no rendered manifest or build image for environment '{env}'"))
}

pub async fn plan(msg: &ProjectOpMsg, store: &dyn KvStore, artifacts: &dyn ArtifactStore) -> Result<Plan, String> {
    let project = store
        .get_project(&msg.project_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("project {} not found", msg.project_id))?;

    match msg.kind {
        OpKind::Promote | OpKind::Release => {
            let from = msg.from_env.clone().ok_or_else(|| "from_env is required".to_string())?;
            let to = msg.to_env.clone().ok_or_else(|| "to_env is required".to_string())?;
            if from == to {
                return Err("from and to environment must differ".to_string());
            }
            if !project.spec.environments.contains_key(&from) {
                return Err(format!("environment '{from}' is not defined"));
            }
            if !project.spec.environments.contains_key(&to) {
                return Err(format!("environment '{to}' is not defined"));
            }
            if msg.kind == OpKind::Release && to != "prod" {
                return Err("release target must be a production environment".to_string());
            }

            let stage = derive_stage(msg.kind, &to, msg.delivery.stage);
            let image = resolve_source_image(&msg.project_id, &from, artifacts).await?;
            let transition_prefix = match msg.kind {
                OpKind::Release => format!("releases/{from}-to-{to}"),
                _ => format!("promotions/{from}-to-{to}"),
            };

            Ok(Plan {
                from_env: Some(from),
                to_env: to,
                stage,
                image,
                transition_prefix,
                rollback: None,
            })
        }
        OpKind::Rollback => {
            let to = msg
                .rollback_env
                .clone()
                .ok_or_else(|| "rollback target environment is required".to_string())?;
            if !project.spec.environments.contains_key(&to) {
                return Err(format!("environment '{to}' is not defined"));
            }
            let release_id = msg
                .rollback_release_id
                .clone()
                .ok_or_else(|| "rollback release id is required".to_string())?;
            let release = store
                .get_release(&release_id)
                .await
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("release '{release_id}' not found"))?;
            if release.project_id != msg.project_id {
                return Err("release does not belong to this project".to_string());
            }
            if release.environment != to {
                return Err("release environment does not match rollback target".to_string());
            }

            let scope = msg.rollback_scope.unwrap_or(RollbackScope::CodeOnly);
            if matches!(scope, RollbackScope::CodeAndConfig | RollbackScope::FullState) {
                let snapshot = release
                    .config_snapshot_path
                    .clone()
                    .ok_or_else(|| "no configuration snapshot available for this release".to_string())?;
                if artifacts
                    .get(&msg.project_id, &snapshot)
                    .await
                    .map_err(|e| e.to_string())?
                    .is_none()
                {
                    return Err("configuration snapshot is missing from artifact storage".to_string());
                }
            }
            if scope == RollbackScope::FullState
                && artifacts
                    .get(&msg.project_id, &release.rendered_manifest_path)
                    .await
                    .map_err(|e| e.to_string())?
                    .is_none()
            {
                return Err("rendered snapshot is missing for full_state rollback".to_string());
            }

            let stage = derive_stage(msg.kind, &to, msg.delivery.stage);
            let image = release.image.clone();
            let transition_prefix = format!("rollbacks/{to}/{}", ids::short(&msg.op_id));
            let override_vars = msg.rollback_override.clone();

            Ok(Plan {
                from_env: None,
                to_env: to,
                stage,
                image,
                transition_prefix,
                rollback: Some(RollbackPlan {
                    release,
                    scope,
                    override_vars,
                }),
            })
        }
        _ => Err(format!("promoter does not handle operation kind {:?}", msg.kind)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wharf_artifacts::InMemoryArtifactStore;
    use wharf_store::InMemoryKvStore;
    use wharf_types::{DeliveryDescriptor, NetworkPolicy, OpKind, Project, ProjectSpec};

    fn msg(kind: OpKind) -> ProjectOpMsg {
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
            at: chrono::Utc::now(),
        }
    }

    async fn seed_project(store: &InMemoryKvStore, envs: &[&str]) {
        let spec = ProjectSpec {
            name: "app".into(),
            runtime: "r1".into(),
            capabilities: vec![],
            environments: envs
                .iter()
                .map(|e| (e.to_string(), wharf_types::EnvironmentSpec::default()))
                .collect(),
            network_policy: NetworkPolicy::default(),
        };
        let project = Project::new("p1".into(), spec, chrono::Utc::now());
        store.put_project(&project).await.unwrap();
    }

    #[tokio::test]
    async fn promote_requires_distinct_defined_envs() {
        let store = InMemoryKvStore::default();
        seed_project(&store, &["dev", "staging"]).await;
        let artifacts = InMemoryArtifactStore::default();
        artifacts.put("p1", "deploy/dev/rendered.yaml", b"image: i1\n".to_vec()).await.unwrap();

        let mut m = msg(OpKind::Promote);
        m.from_env = Some("dev".into());
        m.to_env = Some("staging".into());
        let plan = plan(&m, &store, &artifacts).await.unwrap();
        assert_eq!(plan.image, "i1");
        assert_eq!(plan.transition_prefix, "promotions/dev-to-staging");
    }

    #[tokio::test]
    async fn release_requires_prod_target() {
        let store = InMemoryKvStore::default();
        seed_project(&store, &["staging", "prod"]).await;
        let artifacts = InMemoryArtifactStore::default();
        artifacts.put("p1", "deploy/staging/rendered.yaml", b"image: i1\n".to_vec()).await.unwrap();

        let mut m = msg(OpKind::Release);
        m.from_env = Some("staging".into());
        m.to_env = Some("staging".into());
        let err = plan(&m, &store, &artifacts).await.unwrap_err();
        assert!(err.contains("differ"));
    }

    #[tokio::test]
    async fn rollback_code_and_config_requires_snapshot() {
        let store = InMemoryKvStore::default();
        seed_project(&store, &["prod"]).await;
        let artifacts = InMemoryArtifactStore::default();

        let release = ReleaseRecord {
            id: "r1".into(),
            project_id: "p1".into(),
            environment: "prod".into(),
            operation_id: "op0".into(),
            operation_kind: OpKind::Release,
            stage: DeliveryStage::Release,
            from_env: Some("staging".into()),
            to_env: Some("prod".into()),
            image: "i1".into(),
            rendered_manifest_path: "releases/staging-to-prod/rendered.yaml".into(),
            config_snapshot_path: None,
            rollback_safe: true,
            rollback_source_release_id: None,
            rollback_scope: None,
            created_at: chrono::Utc::now(),
        };
        store.put_release(&release).await.unwrap();

        let mut m = msg(OpKind::Rollback);
        m.rollback_env = Some("prod".into());
        m.rollback_release_id = Some("r1".into());
        m.rollback_scope = Some(RollbackScope::CodeAndConfig);

        let err = plan(&m, &store, &artifacts).await.unwrap_err();
        assert!(err.contains("configuration snapshot"));
    }

    #[tokio::test]
    async fn rollback_code_only_succeeds_without_snapshot() {
        let store = InMemoryKvStore::default();
        seed_project(&store, &["prod"]).await;
        let artifacts = InMemoryArtifactStore::default();

        let release = ReleaseRecord {
            id: "r1".into(),
            project_id: "p1".into(),
            environment: "prod".into(),
            operation_id: "op0".into(),
            operation_kind: OpKind::Release,
            stage: DeliveryStage::Release,
            from_env: Some("staging".into()),
            to_env: Some("prod".into()),
            image: "i1".into(),
            rendered_manifest_path: "releases/staging-to-prod/rendered.yaml".into(),
            config_snapshot_path: None,
            rollback_safe: true,
            rollback_source_release_id: None,
            rollback_scope: None,
            created_at: chrono::Utc::now(),
        };
        store.put_release(&release).await.unwrap();

        let mut m = msg(OpKind::Rollback);
        m.rollback_env = Some("prod".into());
        m.rollback_release_id = Some("r1".into());
        m.rollback_scope = Some(RollbackScope::CodeOnly);

        let plan = plan(&m, &store, &artifacts).await.unwrap();
        assert_eq!(plan.image, "i1");
    }
}
