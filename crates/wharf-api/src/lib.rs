//! HTTP surface for the operation-lifecycle engine (spec §6): operation
//! admission/lookup, SSE progress streaming, and CI webhook intake. All
//! handlers are thin — every invariant they depend on (admission
//! serialization, single-terminal events, replay correctness) lives in
//! [`wharf_core`].

mod error;
mod events;
mod operations;
mod state;
mod webhooks;

use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .merge(operations::router())
        .merge(events::router())
        .merge(webhooks::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
