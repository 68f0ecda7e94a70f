//! Event bus contract for the worker pipeline (spec §2.1, §4.2, §6).
//!
//! The contract we require of the embedded message bus is narrow: durable,
//! at-least-once subject streams, a named consumer per subject with an
//! explicit per-message delivery count, and a side channel ("poison
//! subject") for messages a worker gives up on. `InMemoryBus` implements
//! this with one FIFO queue per subject and redelivers on `nack`, which is
//! enough to drive the worker runtime's retry/poison logic in-process and
//! in tests; a durable backend only needs to implement [`MessageBus`].

mod memory;

use async_trait::async_trait;

pub use memory::InMemoryBus;

/// Errors surfaced by a [`MessageBus`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("publish to '{0}' failed: {1}")]
    PublishFailed(String, String),

    #[error("subject '{0}' closed")]
    Closed(String),
}

/// A message claimed from a subject, carrying the bus's delivery count for
/// that message (how many times it has been handed to a consumer,
/// including this delivery).
#[derive(Debug, Clone)]
pub struct Delivery {
    pub subject: String,
    pub payload: Vec<u8>,
    pub delivery_count: u32,
}

/// A durable, named, at-least-once consumer bound to one subject.
#[async_trait]
pub trait Consumer: Send {
    /// Wait for the next delivery. Returns `None` only once the bus (or the
    /// consumer) has been shut down.
    async fn recv(&mut self) -> Option<Delivery>;

    /// Acknowledge the most recently received delivery: it will not be
    /// redelivered.
    async fn ack(&mut self) -> Result<(), BusError>;

    /// Decline the most recently received delivery: it is requeued with an
    /// incremented delivery count for the same subject.
    async fn nack(&mut self) -> Result<(), BusError>;
}

/// Durable, at-least-once subject streams with named consumers.
#[async_trait]
pub trait MessageBus: Send + Sync + 'static {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Bind a durable named consumer to `subject`. `max_deliver` is not
    /// enforced by the bus itself (the worker runtime decides when to stop
    /// retrying and poison a message, per spec §4.2 step 4) but is recorded
    /// for observability.
    async fn subscribe(
        &self,
        subject: &str,
        consumer_name: &str,
        max_deliver: u32,
    ) -> Result<Box<dyn Consumer>, BusError>;
}
