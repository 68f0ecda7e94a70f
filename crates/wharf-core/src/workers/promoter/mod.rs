//! promoter: handles `promote`/`release`/`rollback` as a four sub-stage
//! state machine (spec §4.6). All four sub-stages coalesce onto one
//! `OpStep` (family `"promoter"`), but each sub-stage's name is recorded as
//! it runs so the step's `worker` field always shows the furthest stage
//! reached — useful when a preflight failure stops the chain early.

mod commit;
mod finalize;
mod plan;
mod render;

use std::sync::Arc;

use chrono::Utc;
use wharf_artifacts::ArtifactStore;
use wharf_store::KvStore;
use wharf_types::ProjectOpMsg;

use crate::bookkeeping::Bookkeeping;
use crate::worker_runtime::{WorkerAction, WorkerOutput};

pub use plan::Plan;

pub struct PromoterAction {
    bookkeeping: Arc<Bookkeeping>,
    store: Arc<dyn KvStore>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl PromoterAction {
    pub fn new(bookkeeping: Arc<Bookkeeping>, store: Arc<dyn KvStore>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            bookkeeping,
            store,
            artifacts,
        }
    }

    async fn stage_start(&self, msg: &ProjectOpMsg, stage: &str, note: &str) -> Result<(), String> {
        self.bookkeeping
            .mark_step_start(&msg.op_id, stage, Utc::now(), Some(note.to_string()))
            .await
            .map_err(|e| e.to_string())
    }

    async fn stage_end(&self, msg: &ProjectOpMsg, stage: &str, result: &Result<String, String>, artifacts: Vec<String>) -> Result<(), String> {
        match result {
            Ok(message) => self
                .bookkeeping
                .mark_step_end(&msg.op_id, stage, Utc::now(), Some(message.clone()), None, artifacts)
                .await
                .map_err(|e| e.to_string()),
            Err(err) => self
                .bookkeeping
                .mark_step_end(&msg.op_id, stage, Utc::now(), None, Some(err.clone()), artifacts)
                .await
                .map_err(|e| e.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl WorkerAction for PromoterAction {
    fn name(&self) -> &str {
        "promoter"
    }

    async fn run(&self, msg: &ProjectOpMsg) -> Result<WorkerOutput, String> {
        self.stage_start(msg, "promoter.plan", "planning").await?;
        let plan = match plan::plan(msg, self.store.as_ref(), self.artifacts.as_ref()).await {
            Ok(p) => {
                self.stage_end(msg, "promoter.plan", &Ok(format!("plan: {} -> {}", p.from_env_label(), p.to_env)), vec![])
                    .await?;
                p
            }
            Err(err) => {
                self.stage_end(msg, "promoter.plan", &Err(err.clone()), vec![]).await?;
                return Err(err);
            }
        };

        self.stage_start(msg, "promoter.render", "rendering").await?;
        let rendered_paths = match render::render(&plan, msg, self.artifacts.as_ref()).await {
            Ok(paths) => {
                self.stage_end(msg, "promoter.render", &Ok("rendered".to_string()), paths.clone())
                    .await?;
                paths
            }
            Err(err) => {
                self.stage_end(msg, "promoter.render", &Err(err.clone()), vec![]).await?;
                return Err(err);
            }
        };

        self.stage_start(msg, "promoter.commit", "committing").await?;
        match commit::commit(&plan, msg, self.store.as_ref(), self.artifacts.as_ref()).await {
            Ok(()) => {
                self.stage_end(msg, "promoter.commit", &Ok("committed".to_string()), vec![]).await?;
            }
            Err(err) => {
                self.stage_end(msg, "promoter.commit", &Err(err.clone()), vec![]).await?;
                return Err(err);
            }
        }

        self.stage_start(msg, "promoter.finalize", "finalizing").await?;
        match finalize::finalize(&plan, msg, self.artifacts.as_ref(), self.bookkeeping.as_ref()).await {
            Ok(release) => {
                let message = format!("released {} to {}", release.image, release.environment);
                self.stage_end(msg, "promoter.finalize", &Ok(message.clone()), rendered_paths.clone())
                    .await?;
                Ok(WorkerOutput::with_artifacts(message, rendered_paths))
            }
            Err(err) => {
                self.stage_end(msg, "promoter.finalize", &Err(err.clone()), vec![]).await?;
                Err(err)
            }
        }
    }
}
