//! SSE streaming endpoint.
//!
//! GET /api/events
//!
//! Forwards the application event feed as server-sent events. Every event
//! is the JSON envelope `{type, timestamp, payload}`; the SSE event name
//! mirrors the envelope's `type`. Subscribers that fall behind the
//! broadcast buffer get a `lagged` notice instead of the missed events —
//! delivery is best-effort by design.

use std::convert::Infallible;

use axum::extract::Extension;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::server::app::AppState;

/// SSE handler — subscribes to the event hub and streams envelopes.
pub async fn events_handler(
    Extension(state): Extension<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.hub.subscribe();

    let connected =
        stream::once(async { Ok::<_, Infallible>(Event::default().event("connected").data("ok")) });

    let events = BroadcastStream::new(rx).filter_map(|result| async {
        match result {
            Ok(value) => {
                let event_name = value
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("message");
                Event::default()
                    .event(event_name)
                    .json_data(&value)
                    .ok()
                    .map(Ok)
            }
            Err(BroadcastStreamRecvError::Lagged(missed)) => Event::default()
                .event("lagged")
                .json_data(&serde_json::json!({ "missed": missed }))
                .ok()
                .map(Ok),
        }
    });

    Sse::new(connected.chain(events)).keep_alive(KeepAlive::default())
}
