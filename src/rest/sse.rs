//! `GET /sse/subscribe/{taskId}` — the long-lived SSE stream (spec §4.2,
//! §6.1). Backed by the `SseManager`'s per-consumer channel, primed with
//! whatever the `PersistentEventBuffer` has queued for a not-yet-connected
//! or reconnecting client.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;

use crate::context::GatewayContext;
use crate::dispatcher::sse_events;

pub fn router() -> Router<GatewayContext> {
    Router::new().route("/sse/subscribe/{task_id}", get(subscribe))
}

#[derive(Debug, Deserialize)]
pub struct SubscribeQuery {
    #[serde(default)]
    pub reconnect: bool,
    pub last_event_timestamp: Option<i64>,
}

async fn subscribe(
    State(ctx): State<GatewayContext>,
    Path(task_id): Path<String>,
    Query(query): Query<SubscribeQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (rx, backlog) = ctx.sse_manager.connect(&task_id, &ctx.persistent_buffer).await;
    if query.reconnect {
        log::info!(
            "client reconnected to task {task_id} (replaying from {:?})",
            query.last_event_timestamp
        );
    }

    let backlog_events: Vec<Result<Event, Infallible>> = backlog
        .into_iter()
        .map(|data| Ok(to_event(&data)))
        .collect();
    let live = ReceiverStream::new(rx).map(|data| Ok(to_event(&data)));

    let combined = stream::iter(backlog_events).chain(live);
    Sse::new(combined).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

/// Reconstructs the SSE event name from a dispatched payload: the
/// `SSEManager::publish` call the dispatcher and scheduler share only
/// carries the raw JSON-RPC `result`/`error`, not the buffered event type,
/// so the live side re-derives it the same way the dispatcher chose it
/// (spec §4.1, §6.1).
fn to_event(data: &Value) -> Event {
    let name = if data.get("error").is_some() {
        sse_events::ERROR
    } else {
        match data.get("kind").and_then(|k| k.as_str()) {
            Some("task") => sse_events::FINAL_RESPONSE,
            Some("artifact-update") => sse_events::ARTIFACT_UPDATE,
            _ => sse_events::STATUS_UPDATE,
        }
    };
    Event::default().event(name).json_data(data).unwrap_or_else(|_| Event::default().event(name).data("{}"))
}
