//! promoter.render: write the manifests a plan describes (spec §4.6 step 2).
//!
//! Every transition writes two copies: the live `deploy/<env>` location the
//! deployer reads on the next `deploy` operation, and a transition-scoped
//! copy under `plan.transition_prefix` that keeps the before/after manifests
//! addressable by operation long after `deploy/<env>` has moved on.

use wharf_artifacts::ArtifactStore;
use wharf_types::{ProjectOpMsg, RollbackScope};

use super::plan::Plan;

fn render_manifest(image: &str, env: &str) -> String {
    format!("image: {image}\nenvironment: {env}\n")
}

pub async fn render(plan: &Plan, msg: &ProjectOpMsg, artifacts: &dyn ArtifactStore) -> Result<Vec<String>, String> {
    let live_path = format!("deploy/{}/rendered.yaml", plan.to_env);
    let transition_path = format!("{}/rendered.yaml", plan.transition_prefix);

    let rendered = match &plan.rollback {
        Some(rb) if rb.scope == RollbackScope::FullState => {
            let snapshot = artifacts
                .get(&msg.project_id, &rb.release.rendered_manifest_path)
                .await
                .map_err(|e| e.to_string())?
                .ok_or_else(|| "rendered snapshot disappeared before render".to_string())?;
            snapshot
        }
        _ => render_manifest(&plan.image, &plan.to_env).into_bytes(),
    };

    artifacts
        .put(&msg.project_id, &live_path, rendered.clone())
        .await
        .map_err(|e| e.to_string())?;
    artifacts
        .put(&msg.project_id, &transition_path, rendered)
        .await
        .map_err(|e| e.to_string())?;

    let mut written = vec![live_path, transition_path];

    if let Some(rb) = &plan.rollback {
        if matches!(rb.scope, RollbackScope::CodeAndConfig | RollbackScope::FullState) {
            let snapshot_path = rb
                .release
                .config_snapshot_path
                .clone()
                .ok_or_else(|| "config snapshot path missing despite preflight check".to_string())?;
            let snapshot = artifacts
                .get(&msg.project_id, &snapshot_path)
                .await
                .map_err(|e| e.to_string())?
                .ok_or_else(|| "config snapshot disappeared before render".to_string())?;
            let active_path = format!("config/{}/active.json", plan.to_env);
            artifacts
                .put(&msg.project_id, &active_path, snapshot)
                .await
                .map_err(|e| e.to_string())?;
            written.push(active_path);
        }
    }

    Ok(written)
}
