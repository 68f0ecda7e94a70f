//! Final-result subscriber and commit-hash webhook dedupe (spec §4.7, §8
//! properties 5 and 7).
//!
//! The subscriber is the one place `WorkerResultMsg`s landing on a terminal
//! subject get handed to the [`crate::waiter_hub::WaiterHub`], so a request
//! that chose to wait synchronously sees the same result streamed to SSE
//! subscribers. `CommitDedupe` reuses the admission lock's per-project
//! serialization (spec §9: the same lock backs both admission and webhook
//! dedupe) so two webhook deliveries for the same commit can never both
//! win the race to enqueue a `ci` operation.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{instrument, warn};
use wharf_artifacts::ArtifactStore;
use wharf_types::{OpStatus, WorkerResultMsg};

use crate::admission::AdmissionLocks;
use crate::bookkeeping::Bookkeeping;
use crate::error::CoreError;
use crate::waiter_hub::WaiterHub;

const LAST_COMMIT_PATH: &str = "repos/source/.paas/last-ci-commit.txt";

/// Subscribes to every terminal subject, finalizes the operation (spec §8
/// property 1: exactly one terminal event, enforced by
/// [`Bookkeeping::finalize_op`]'s idempotence), and forwards the decoded
/// result to the Waiter Hub. Acks regardless of whether a waiter was
/// present: delivery to the hub is best-effort, not a reason to redeliver
/// (spec §4.5).
pub struct FinalResultSubscriber {
    bus: Arc<dyn wharf_bus::MessageBus>,
    bookkeeping: Arc<Bookkeeping>,
    waiters: Arc<WaiterHub>,
    consumer_name: String,
    max_deliver: u32,
}

impl FinalResultSubscriber {
    pub fn new(
        bus: Arc<dyn wharf_bus::MessageBus>,
        bookkeeping: Arc<Bookkeeping>,
        waiters: Arc<WaiterHub>,
        consumer_name: impl Into<String>,
        max_deliver: u32,
    ) -> Self {
        Self {
            bus,
            bookkeeping,
            waiters,
            consumer_name: consumer_name.into(),
            max_deliver,
        }
    }

    /// Run one subscriber loop per subject in `subjects` until `shutdown`
    /// fires. Returns once every spawned loop has exited.
    pub async fn run(&self, subjects: &[&str], shutdown: watch::Receiver<bool>) {
        let mut handles = Vec::new();
        for subject in subjects {
            let bus = self.bus.clone();
            let bookkeeping = self.bookkeeping.clone();
            let waiters = self.waiters.clone();
            let consumer_name = self.consumer_name.clone();
            let max_deliver = self.max_deliver;
            let subject = subject.to_string();
            let mut shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                let mut consumer = match bus.subscribe(&subject, &consumer_name, max_deliver).await {
                    Ok(c) => c,
                    Err(err) => {
                        warn!(%subject, %err, "final-result subscriber failed to bind consumer");
                        return;
                    }
                };
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                break;
                            }
                        }
                        delivery = consumer.recv() => {
                            let Some(delivery) = delivery else { break };
                            handle_one(&bookkeeping, &waiters, &delivery.payload).await;
                            let _ = consumer.ack().await;
                        }
                    }
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn handle_one(bookkeeping: &Bookkeeping, waiters: &WaiterHub, payload: &[u8]) {
    match serde_json::from_slice::<WorkerResultMsg>(payload) {
        Ok(msg) => {
            let op_id = msg.envelope.op_id.clone();
            let (status, error) = match &msg.envelope.upstream_err {
                Some(err) => (OpStatus::Error, Some(err.clone())),
                None => (OpStatus::Done, None),
            };
            if let Err(err) = bookkeeping
                .finalize_op(&op_id, &msg.envelope.project_id, msg.envelope.kind, status, error, Utc::now())
                .await
            {
                warn!(op_id = %op_id, %err, "failed to finalize operation on terminal delivery");
            }
            waiters.deliver(&op_id, msg);
        }
        Err(err) => warn!(%err, "final-result subscriber received malformed payload"),
    }
}

/// Per-project idempotency guard for CI webhook deliveries keyed on commit
/// hash (spec §8 property 5): the same `(project, commit_hash)` pair is
/// accepted exactly once even under at-least-once webhook redelivery.
pub struct CommitDedupe {
    artifacts: Arc<dyn ArtifactStore>,
    admission: Arc<AdmissionLocks>,
}

impl CommitDedupe {
    pub fn new(artifacts: Arc<dyn ArtifactStore>, admission: Arc<AdmissionLocks>) -> Self {
        Self { artifacts, admission }
    }

    /// Returns `true` if this `commit_hash` has not been seen for
    /// `project_id` before, recording it atomically so a concurrent
    /// redelivery sees the record and returns `false`.
    #[instrument(skip(self), fields(project_id = %project_id))]
    pub async fn check_and_record(&self, project_id: &str, commit_hash: &str) -> Result<bool, CoreError> {
        let _guard = self.admission.acquire(project_id).await;

        let previous = self
            .artifacts
            .get(project_id, LAST_COMMIT_PATH)
            .await?
            .map(|bytes| String::from_utf8_lossy(&bytes).to_string());

        if previous.as_deref() == Some(commit_hash) {
            return Ok(false);
        }

        self.artifacts
            .put(project_id, LAST_COMMIT_PATH, commit_hash.as_bytes().to_vec())
            .await?;
        Ok(true)
    }
}
