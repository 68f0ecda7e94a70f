//! Generic worker runtime (spec §4.2).
//!
//! One `WorkerRuntime` instance is shared by every worker role; what makes a
//! worker a "registrar" versus a "deployer" is the [`WorkerAction`] and the
//! (input, output, poison) subjects it's bound to. The runtime owns
//! decode/idempotency-skip, result publish, and the ack/nack/poison policy;
//! actions own `markStepStart`/`markStepEnd` and the work itself.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, instrument, warn};
use wharf_bus::{Consumer, Delivery, MessageBus};
use wharf_types::{OpStatus, ProjectOpMsg, WorkerResultMsg};

use crate::bookkeeping::Bookkeeping;

/// What a worker action produced on success.
pub struct WorkerOutput {
    pub message: String,
    pub artifacts: Vec<String>,
}

impl WorkerOutput {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            artifacts: Vec::new(),
        }
    }

    pub fn with_artifacts(message: impl Into<String>, artifacts: Vec<String>) -> Self {
        Self {
            message: message.into(),
            artifacts,
        }
    }
}

/// A single worker role's logic. Implementations are expected to call
/// `markStepStart`/`markStepEnd` on their own bookkeeping handle around the
/// actual work (spec §4.2 step 2); the runtime never calls bookkeeping for
/// the happy path, only on retry exhaustion.
#[async_trait::async_trait]
pub trait WorkerAction: Send + Sync {
    /// Stable worker name recorded on `OpStep` (e.g. `"registrar"`,
    /// `"promoter.plan"`).
    fn name(&self) -> &str;

    async fn run(&self, msg: &ProjectOpMsg) -> Result<WorkerOutput, String>;
}

/// Outcome of handling one delivery, for callers that drive the ack/nack.
#[derive(Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Handled; the delivery should be acked.
    Acked,
    /// Downstream publish failed; the delivery should be nacked for redelivery.
    Retried,
    /// Retry budget was exhausted (or the payload was malformed); the
    /// operation has been finalized as `error` and the original payload
    /// published to the poison subject. Should be acked.
    Poisoned,
}

pub struct WorkerRuntime {
    bookkeeping: Arc<Bookkeeping>,
    bus: Arc<dyn MessageBus>,
}

impl WorkerRuntime {
    pub fn new(bookkeeping: Arc<Bookkeeping>, bus: Arc<dyn MessageBus>) -> Self {
        Self { bookkeeping, bus }
    }

    /// Handle one delivery end to end. Does not itself call
    /// `consumer.ack()`/`nack()` — callers (typically [`Self::run`]) do that
    /// based on the returned outcome, since in tests it's useful to inspect
    /// the outcome without a live consumer.
    #[instrument(skip(self, delivery, action), fields(subject = %delivery.subject, delivery_count = delivery.delivery_count))]
    pub async fn handle_delivery(
        &self,
        delivery: &Delivery,
        output_subject: &str,
        poison_subject: &str,
        max_deliver: u32,
        action: &dyn WorkerAction,
    ) -> DeliveryOutcome {
        let msg: ProjectOpMsg = match serde_json::from_slice(&delivery.payload) {
            Ok(m) => m,
            Err(e) => {
                error!(error = %e, "malformed delivery, poisoning");
                let _ = self.bus.publish(poison_subject, delivery.payload.clone()).await;
                return DeliveryOutcome::Poisoned;
            }
        };

        if let Some(upstream_err) = msg.upstream_err.clone() {
            warn!(op_id = %msg.op_id, upstream_err = %upstream_err, worker = action.name(), "skipping: upstream error");
            if let Ok(payload) = serde_json::to_vec(&msg) {
                let _ = self.bus.publish(output_subject, payload).await;
            }
            return DeliveryOutcome::Acked;
        }

        if delivery.delivery_count >= max_deliver {
            self.exhaust(&msg, poison_subject, &delivery.payload).await;
            return DeliveryOutcome::Poisoned;
        }

        match action.run(&msg).await {
            Ok(output) => {
                let result = WorkerResultMsg {
                    envelope: msg.clone(),
                    worker: action.name().to_string(),
                    message: output.message,
                    artifacts: output.artifacts,
                };
                let next = result.into_next(Utc::now());
                let payload = match serde_json::to_vec(&next) {
                    Ok(p) => p,
                    Err(e) => {
                        error!(error = %e, "failed to encode worker result");
                        return DeliveryOutcome::Retried;
                    }
                };
                match self.bus.publish(output_subject, payload).await {
                    Ok(()) => DeliveryOutcome::Acked,
                    Err(e) => {
                        warn!(op_id = %msg.op_id, error = %e, "publish failed, will retry");
                        DeliveryOutcome::Retried
                    }
                }
            }
            Err(err) => {
                warn!(op_id = %msg.op_id, worker = action.name(), error = %err, "action failed, passing upstream_err downstream");
                let skip_msg = msg.clone().with_upstream_err(err);
                if let Ok(payload) = serde_json::to_vec(&skip_msg) {
                    let _ = self.bus.publish(output_subject, payload).await;
                }
                DeliveryOutcome::Acked
            }
        }
    }

    async fn exhaust(&self, msg: &ProjectOpMsg, poison_subject: &str, original_payload: &[u8]) {
        error!(op_id = %msg.op_id, "worker delivery exhausted retries");
        let _ = self
            .bookkeeping
            .finalize_op(
                &msg.op_id,
                &msg.project_id,
                msg.kind,
                OpStatus::Error,
                Some("worker delivery exhausted retries".to_string()),
                Utc::now(),
            )
            .await;
        let _ = self.bus.publish(poison_subject, original_payload.to_vec()).await;
    }

    /// Drive a consumer until the bus closes the subject or `shutdown`
    /// signals true (spec §5 "liveness").
    pub async fn run(
        &self,
        mut consumer: Box<dyn Consumer>,
        output_subject: String,
        poison_subject: String,
        max_deliver: u32,
        action: Arc<dyn WorkerAction>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
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
                    let outcome = self
                        .handle_delivery(&delivery, &output_subject, &poison_subject, max_deliver, action.as_ref())
                        .await;
                    match outcome {
                        DeliveryOutcome::Retried => {
                            let _ = consumer.nack().await;
                        }
                        DeliveryOutcome::Acked | DeliveryOutcome::Poisoned => {
                            let _ = consumer.ack().await;
                        }
                    }
                }
            }
        }
    }
}
