//! The operation-lifecycle engine: admission, bookkeeping, the worker
//! pipeline, and the hubs that make progress observable (spec §2-§5).
//!
//! Nothing in this crate talks to a concrete store, bus, or artifact
//! backend directly — it depends only on the [`wharf_store::KvStore`],
//! [`wharf_bus::MessageBus`], and [`wharf_artifacts::ArtifactStore`] traits,
//! so swapping any of those for a durable implementation never touches
//! this crate.

pub mod admission;
pub mod bookkeeping;
pub mod error;
pub mod event_hub;
pub mod locks;
pub mod orchestrator;
pub mod subjects;
pub mod subscriber;
pub mod waiter_hub;
pub mod worker_runtime;
pub mod workers;

pub use admission::{AdmissionGuard, AdmissionLocks};
pub use bookkeeping::Bookkeeping;
pub use error::CoreError;
pub use event_hub::{EventHub, Subscription};
pub use orchestrator::{EnqueueOptions, Orchestrator};
pub use subscriber::{CommitDedupe, FinalResultSubscriber};
pub use waiter_hub::{DeliverOutcome, WaiterHub};
pub use worker_runtime::{DeliveryOutcome, WorkerAction, WorkerOutput, WorkerRuntime};
