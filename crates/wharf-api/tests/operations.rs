use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use wharf_api::{router, AppState};
use wharf_artifacts::{ArtifactStore, InMemoryArtifactStore};
use wharf_bus::{InMemoryBus, MessageBus};
use wharf_store::{InMemoryKvStore, KvStore};

fn app() -> axum::Router {
    let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::default());
    let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::default());
    let artifacts: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::default());
    router(AppState::new(store, bus, artifacts))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let response = app()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn enqueue_then_fetch_operation() {
    let app = app();
    let payload = json!({
        "kind": "create",
        "spec": {
            "name": "demo",
            "runtime": "node18",
            "capabilities": [],
            "environments": {"dev": {"vars": {}}},
            "network_policy": "internal"
        }
    });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/projects/p1/operations")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    let op_id = body["operation"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["operation"]["status"], "queued");

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/operations/{op_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], op_id);
}

#[tokio::test]
async fn second_create_while_first_active_returns_conflict() {
    let app = app();
    let payload = json!({
        "kind": "create",
        "spec": {
            "name": "demo",
            "runtime": "node18",
            "capabilities": [],
            "environments": {"dev": {"vars": {}}},
            "network_policy": "internal"
        }
    });
    let build_request = || {
        Request::builder()
            .method("POST")
            .uri("/api/projects/p1/operations")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap()
    };

    let first = app.clone().oneshot(build_request()).await.unwrap();
    assert_eq!(first.status(), StatusCode::ACCEPTED);

    let second = app.oneshot(build_request()).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn missing_operation_is_404() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/api/operations/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
