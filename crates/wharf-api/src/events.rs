//! SSE event stream for one operation (spec §4.4, §6, §8 property 6).

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::{BroadcastStream, IntervalStream};
use wharf_types::{EventName, EventRecord};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/operations/:op_id/events", get(stream_events))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub last_event_id: Option<u64>,
}

fn record_to_sse(record: EventRecord) -> Result<SseEvent, Infallible> {
    Ok(SseEvent::default()
        .id(record.sequence.to_string())
        .event(record.name.as_sse_event())
        .json_data(record.payload)
        .unwrap_or_else(|_| SseEvent::default().event("op.error").data("serialization failed")))
}

/// Resolve the replay cursor: the `Last-Event-ID` header takes precedence
/// over the `last_event_id` query parameter, per the SSE reconnection
/// contract (spec §6).
fn resolve_last_event_id(headers: &HeaderMap, query: &EventsQuery) -> u64 {
    headers
        .get(header::HeaderName::from_static("last-event-id"))
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .or(query.last_event_id)
        .unwrap_or(0)
}

async fn stream_events(
    State(state): State<AppState>,
    Path(op_id): Path<String>,
    Query(query): Query<EventsQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let last_event_id = resolve_last_event_id(&headers, &query);
    let subscription = state.events.subscribe(&op_id, last_event_id);

    let mut initial = Vec::new();
    if subscription.needs_bootstrap {
        if let Ok(Some(project_state)) = state.store.get_op(&op_id).await {
            initial.push(
                SseEvent::default()
                    .event(EventName::Bootstrap.as_sse_event())
                    .json_data(project_state)
                    .unwrap_or_default(),
            );
        }
    }
    initial.extend(subscription.replay.into_iter().filter_map(|r| record_to_sse(r).ok()));

    let live = BroadcastStream::new(subscription.live).filter_map(|item| async move {
        match item {
            Ok(record) => record_to_sse(record).ok(),
            Err(_lagged) => None,
        }
    });

    // A real named event, not a KeepAlive comment line, so
    // `addEventListener("op.heartbeat", ...)` actually fires (spec §6).
    let events = state.events.clone();
    let heartbeat_op_id = op_id.clone();
    let heartbeats = IntervalStream::new(tokio::time::interval(Duration::from_secs(15))).map(move |_| {
        let sequence = events.latest_sequence(&heartbeat_op_id);
        SseEvent::default()
            .event(EventName::Heartbeat.as_sse_event())
            .json_data(json!({ "sequence": sequence }))
            .unwrap_or_default()
    });

    let stream =
        stream::iter(initial.into_iter().map(Ok::<_, Infallible>)).chain(stream::select(live, heartbeats).map(Ok));

    let sse = Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)));

    let mut response = sse.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("X-Accel-Buffering", HeaderValue::from_static("no"));
    response
}
