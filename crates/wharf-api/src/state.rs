//! Shared application state handed to every route.

use std::sync::Arc;

use wharf_artifacts::ArtifactStore;
use wharf_bus::MessageBus;
use wharf_core::{AdmissionLocks, CommitDedupe, EventHub, Orchestrator, WaiterHub};
use wharf_store::KvStore;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub events: Arc<EventHub>,
    pub waiters: Arc<WaiterHub>,
    pub store: Arc<dyn KvStore>,
    pub commit_dedupe: Arc<CommitDedupe>,
}

impl AppState {
    /// Convenience constructor that builds its own hubs. Fine when nothing
    /// else in the process needs to observe the same events/waiters (tests,
    /// standalone HTTP-only deployments); a process that also runs the
    /// worker pipeline should use [`AppState::with_hubs`] so the HTTP
    /// surface and the workers agree on one `EventHub`/`WaiterHub`.
    pub fn new(store: Arc<dyn KvStore>, bus: Arc<dyn MessageBus>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        let events = Arc::new(EventHub::default());
        let waiters = Arc::new(WaiterHub::new());
        Self::with_hubs(store, bus, artifacts, events, waiters)
    }

    pub fn with_hubs(
        store: Arc<dyn KvStore>,
        bus: Arc<dyn MessageBus>,
        artifacts: Arc<dyn ArtifactStore>,
        events: Arc<EventHub>,
        waiters: Arc<WaiterHub>,
    ) -> Self {
        let orchestrator = Arc::new(Orchestrator::new(store.clone(), bus, events.clone()));
        let commit_dedupe = Arc::new(CommitDedupe::new(artifacts, Arc::new(AdmissionLocks::new())));
        Self {
            orchestrator,
            events,
            waiters,
            store,
            commit_dedupe,
        }
    }
}
