//! Binary entry point: wires the HTTP surface, the worker pipeline, and the
//! final-result subscriber onto one in-process bus and store (spec §6).
//!
//! The embedded `InMemory*` backends are the only ones this workspace
//! ships; swapping in a durable `KvStore`/`MessageBus`/`ArtifactStore` is a
//! matter of constructing a different `Arc<dyn ...>` here.

mod config;

use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use wharf_artifacts::{ArtifactStore, InMemoryArtifactStore};
use wharf_bus::{InMemoryBus, MessageBus};
use wharf_core::subjects;
use wharf_core::workers::{
    DeployerAction, ImageBuilderAction, ManifestRendererAction, PromoterAction, RegistrarAction, RepoBootstrapAction,
};
use wharf_core::{Bookkeeping, EventHub, WaiterHub};
use wharf_store::{InMemoryKvStore, KvStore};

use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(bind_addr = %config.bind_addr, "starting wharf-server");

    let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::default());
    let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::default());
    let artifacts: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::default());
    let events = Arc::new(EventHub::new(config.event_history_limit));
    let bookkeeping = Arc::new(Bookkeeping::new(store.clone(), events.clone()));
    let waiters = Arc::new(WaiterHub::new());

    let state = wharf_api::AppState::with_hubs(store.clone(), bus.clone(), artifacts.clone(), events.clone(), waiters.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut worker_handles = Vec::new();
    worker_handles.push(spawn_worker(
        bus.clone(),
        bookkeeping.clone(),
        "registrar",
        subjects::PROJECT_OP_START,
        subjects::REGISTRATION_DONE,
        config.worker_max_deliver,
        shutdown_rx.clone(),
        Arc::new(RegistrarAction::new(bookkeeping.clone(), store.clone())),
    ));
    worker_handles.push(spawn_worker(
        bus.clone(),
        bookkeeping.clone(),
        "repo-bootstrap",
        subjects::REGISTRATION_DONE,
        subjects::BOOTSTRAP_DONE,
        config.worker_max_deliver,
        shutdown_rx.clone(),
        Arc::new(RepoBootstrapAction::new(bookkeeping.clone(), artifacts.clone())),
    ));
    worker_handles.push(spawn_worker(
        bus.clone(),
        bookkeeping.clone(),
        "image-builder",
        subjects::BOOTSTRAP_DONE,
        subjects::BUILD_DONE,
        config.worker_max_deliver,
        shutdown_rx.clone(),
        Arc::new(ImageBuilderAction::new(bookkeeping.clone(), artifacts.clone())),
    ));
    worker_handles.push(spawn_worker(
        bus.clone(),
        bookkeeping.clone(),
        "manifest-renderer",
        subjects::BUILD_DONE,
        subjects::RENDER_DONE,
        config.worker_max_deliver,
        shutdown_rx.clone(),
        Arc::new(ManifestRendererAction::new(bookkeeping.clone(), artifacts.clone())),
    ));

    let deployer = Arc::new(DeployerAction::new(bookkeeping.clone(), artifacts.clone()));
    worker_handles.push(spawn_worker(
        bus.clone(),
        bookkeeping.clone(),
        "deployer",
        subjects::RENDER_DONE,
        subjects::DEPLOY_DONE,
        config.worker_max_deliver,
        shutdown_rx.clone(),
        deployer.clone(),
    ));
    worker_handles.push(spawn_worker(
        bus.clone(),
        bookkeeping.clone(),
        "deployer-standalone",
        subjects::DEPLOYMENT_START,
        subjects::DEPLOYMENT_DONE,
        config.worker_max_deliver,
        shutdown_rx.clone(),
        deployer,
    ));

    worker_handles.push(spawn_worker(
        bus.clone(),
        bookkeeping.clone(),
        "promoter",
        subjects::PROMOTION_START,
        subjects::PROMOTION_DONE,
        config.worker_max_deliver,
        shutdown_rx.clone(),
        Arc::new(PromoterAction::new(bookkeeping.clone(), store.clone(), artifacts.clone())),
    ));

    let subscriber = wharf_core::FinalResultSubscriber::new(
        bus.clone(),
        bookkeeping.clone(),
        waiters.clone(),
        "final-result".to_string(),
        config.worker_max_deliver,
    );
    let subscriber_shutdown = shutdown_rx.clone();
    let subscriber_handle = tokio::spawn(async move {
        subscriber.run(subjects::TERMINAL_SUBJECTS, subscriber_shutdown).await;
    });

    let app = wharf_api::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    for handle in worker_handles {
        let _ = handle.await;
    }
    let _ = subscriber_handle.await;

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn spawn_worker(
    bus: Arc<dyn MessageBus>,
    bookkeeping: Arc<Bookkeeping>,
    consumer_name: &'static str,
    input_subject: &'static str,
    output_subject: &'static str,
    max_deliver: u32,
    shutdown: watch::Receiver<bool>,
    action: Arc<dyn wharf_core::WorkerAction>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let consumer = match bus.subscribe(input_subject, consumer_name, max_deliver).await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(subject = input_subject, error = %e, "failed to bind worker consumer");
                return;
            }
        };
        let runtime = wharf_core::WorkerRuntime::new(bookkeeping, bus);
        runtime
            .run(
                consumer,
                output_subject.to_string(),
                subjects::WORKERS_POISON.to_string(),
                max_deliver,
                action,
                shutdown,
            )
            .await;
    })
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
