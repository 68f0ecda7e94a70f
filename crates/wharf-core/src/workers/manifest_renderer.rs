//! manifestRenderer: turns a built image into deployable manifests.
//!
//! Reads the image reference imageBuilder left behind and writes the
//! `deploy/<env>` manifest set the deployer will apply. The actual
//! kustomize/templating engine is an external collaborator (spec §1); this
//! worker owns picking the target environment and writing the artifacts at
//! the paths the core's contract promises (spec §6).

use std::sync::Arc;

use chrono::Utc;
use wharf_artifacts::ArtifactStore;
use wharf_types::{OpKind, ProjectOpMsg};

use crate::bookkeeping::Bookkeeping;
use crate::worker_runtime::{WorkerAction, WorkerOutput};

const DEFAULT_ENV: &str = "dev";

fn target_env(msg: &ProjectOpMsg) -> String {
    msg.deploy_env.clone().unwrap_or_else(|| DEFAULT_ENV.to_string())
}

pub struct ManifestRendererAction {
    bookkeeping: Arc<Bookkeeping>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl ManifestRendererAction {
    pub fn new(bookkeeping: Arc<Bookkeeping>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { bookkeeping, artifacts }
    }

    async fn render(&self, msg: &ProjectOpMsg) -> Result<WorkerOutput, String> {
        if msg.kind == OpKind::Delete {
            return Ok(WorkerOutput::new("skipped: delete has nothing to render"));
        }

        let image = self
            .artifacts
            .get(&msg.project_id, "build/image.txt")
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "no image artifact from imageBuilder".to_string())?;
        let image = String::from_utf8_lossy(&image).to_string();

        let env = target_env(msg);
        let rendered = format!("image: {image}\nenvironment: {env}\n");
        let path = format!("deploy/{env}/rendered.yaml");
        self.artifacts
            .put(&msg.project_id, &path, rendered.into_bytes())
            .await
            .map_err(|e| e.to_string())?;

        Ok(WorkerOutput::with_artifacts(format!("rendered {env}"), vec![path]))
    }
}

#[async_trait::async_trait]
impl WorkerAction for ManifestRendererAction {
    fn name(&self) -> &str {
        "manifestRenderer"
    }

    async fn run(&self, msg: &ProjectOpMsg) -> Result<WorkerOutput, String> {
        self.bookkeeping
            .mark_step_start(&msg.op_id, self.name(), Utc::now(), Some("rendering manifests".into()))
            .await
            .map_err(|e| e.to_string())?;

        let result = self.render(msg).await;

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
