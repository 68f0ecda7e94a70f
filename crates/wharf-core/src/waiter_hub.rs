//! Waiter Hub (spec §2.4, §4.5).
//!
//! Lets an HTTP request that chose to wait synchronously receive the final
//! worker result for its operation, and deduplicates replayed finals so a
//! bus reconnect can't re-wake a waiter that already got its answer.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use wharf_types::WorkerResultMsg;

/// Outcome of attempting to deliver a final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverOutcome {
    NoWaiter,
    Delivered,
    Duplicate,
}

struct DeliveredEntry {
    at: Instant,
}

/// Default time a delivered-op id is remembered so replayed finals are
/// recognized as duplicates.
const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(300);

pub struct WaiterHub {
    waiters: Mutex<HashMap<String, oneshot::Sender<WorkerResultMsg>>>,
    delivered: Mutex<HashMap<String, DeliveredEntry>>,
    dedup_ttl: Duration,
}

impl Default for WaiterHub {
    fn default() -> Self {
        Self::new()
    }
}

impl WaiterHub {
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
            delivered: Mutex::new(HashMap::new()),
            dedup_ttl: DEFAULT_DEDUP_TTL,
        }
    }

    #[cfg(test)]
    fn with_ttl(ttl: Duration) -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
            delivered: Mutex::new(HashMap::new()),
            dedup_ttl: ttl,
        }
    }

    /// Register a one-shot slot for `op_id`. Returns the receiving half; the
    /// caller awaits it (with its own request-scoped timeout).
    pub fn register(&self, op_id: &str) -> oneshot::Receiver<WorkerResultMsg> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(op_id.to_string(), tx);
        rx
    }

    /// Drop a waiter slot without delivering (request cancelled/timed out).
    pub fn unregister(&self, op_id: &str) {
        self.waiters.lock().remove(op_id);
    }

    /// Deliver a final worker result to the registered waiter, if any.
    pub fn deliver(&self, op_id: &str, msg: WorkerResultMsg) -> DeliverOutcome {
        self.evict_expired();

        if self.delivered.lock().contains_key(op_id) {
            return DeliverOutcome::Duplicate;
        }

        let outcome = match self.waiters.lock().remove(op_id) {
            Some(tx) => {
                // Non-blocking: a dropped receiver (request gone) is not an error.
                let _ = tx.send(msg);
                DeliverOutcome::Delivered
            }
            None => DeliverOutcome::NoWaiter,
        };

        self.delivered.lock().insert(
            op_id.to_string(),
            DeliveredEntry {
                at: Instant::now(),
            },
        );
        outcome
    }

    fn evict_expired(&self) {
        let ttl = self.dedup_ttl;
        self.delivered.lock().retain(|_, e| e.at.elapsed() < ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wharf_types::{DeliveryDescriptor, OpKind, ProjectOpMsg};

    fn result_msg(op_id: &str) -> WorkerResultMsg {
        WorkerResultMsg {
            envelope: ProjectOpMsg {
                op_id: op_id.to_string(),
                kind: OpKind::Deploy,
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
            },
            worker: "deployer".into(),
            message: "done".into(),
            artifacts: vec![],
        }
    }

    #[tokio::test]
    async fn delivers_to_registered_waiter() {
        let hub = WaiterHub::new();
        let rx = hub.register("op1");
        let outcome = hub.deliver("op1", result_msg("op1"));
        assert_eq!(outcome, DeliverOutcome::Delivered);
        let msg = rx.await.unwrap();
        assert_eq!(msg.envelope.op_id, "op1");
    }

    #[tokio::test]
    async fn no_waiter_when_nobody_registered() {
        let hub = WaiterHub::new();
        assert_eq!(hub.deliver("op1", result_msg("op1")), DeliverOutcome::NoWaiter);
    }

    #[tokio::test]
    async fn duplicate_final_never_delivers_twice() {
        let hub = WaiterHub::new();
        let _rx = hub.register("op1");
        assert_eq!(hub.deliver("op1", result_msg("op1")), DeliverOutcome::Delivered);
        // A later waiter must not see a stale replayed final either.
        let _rx2 = hub.register("op1");
        assert_eq!(hub.deliver("op1", result_msg("op1")), DeliverOutcome::Duplicate);
    }

    #[tokio::test]
    async fn dedup_entry_expires_after_ttl() {
        let hub = WaiterHub::with_ttl(Duration::from_millis(10));
        let _rx = hub.register("op1");
        hub.deliver("op1", result_msg("op1"));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(hub.deliver("op1", result_msg("op1")), DeliverOutcome::NoWaiter);
    }
}
