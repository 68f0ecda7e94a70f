//! imageBuilder: builds (or, for `ci`, rebuilds) the project's image.
//!
//! The actual build backend is an external collaborator (spec §1); this
//! worker resolves a deterministic image reference from the operation and
//! records it as an artifact so manifestRenderer can pick it up without a
//! side channel.

use std::sync::Arc;

use chrono::Utc;
use wharf_artifacts::ArtifactStore;
use wharf_types::{ids, OpKind, ProjectOpMsg};

use crate::bookkeeping::Bookkeeping;
use crate::worker_runtime::{WorkerAction, WorkerOutput};

fn image_path() -> &'static str {
    "build/image.txt"
}

pub struct ImageBuilderAction {
    bookkeeping: Arc<Bookkeeping>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl ImageBuilderAction {
    pub fn new(bookkeeping: Arc<Bookkeeping>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { bookkeeping, artifacts }
    }
}

#[async_trait::async_trait]
impl WorkerAction for ImageBuilderAction {
    fn name(&self) -> &str {
        "imageBuilder"
    }

    async fn run(&self, msg: &ProjectOpMsg) -> Result<WorkerOutput, String> {
        self.bookkeeping
            .mark_step_start(&msg.op_id, self.name(), Utc::now(), Some("building image".into()))
            .await
            .map_err(|e| e.to_string())?;

        let result: Result<WorkerOutput, String> = if msg.kind == OpKind::Delete {
            Ok(WorkerOutput::new("skipped: delete has nothing to build"))
        } else {
            let image = format!("{}:{}", msg.project_id, ids::short(&msg.op_id));
            match self
                .artifacts
                .put(&msg.project_id, image_path(), image.clone().into_bytes())
                .await
            {
                Ok(()) => Ok(WorkerOutput::with_artifacts(
                    format!("built {image}"),
                    vec![image_path().to_string()],
                )),
                Err(e) => Err(e.to_string()),
            }
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
