//! Server-Sent Events (SSE) stream
//!
//! Each client first receives a `Snapshot` event carrying the current state,
//! then every `PlayerEvent` broadcast after it subscribed.

use crate::api::server::AppContext;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

/// GET /events - SSE event stream
pub async fn event_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("New SSE client connected");

    // Subscribe before reading state so nothing falls between the two
    let rx = ctx.state.subscribe_events();

    let initial = {
        let player = ctx.player.lock().await;
        let snapshot = player.snapshot().await;
        let view = player.view().await;
        json!({
            "type": "Snapshot",
            "snapshot": snapshot,
            "view": view,
        })
    };
    let first = stream::once(async move {
        Ok::<_, Infallible>(Event::default().event("Snapshot").data(initial.to_string()))
    });

    let updates = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(data) => Some(Ok(Event::default().event(event.event_type()).data(data))),
                Err(e) => {
                    warn!("Failed to serialize event: {}", e);
                    None
                }
            },
            Err(e) => {
                // Lagged receivers skip ahead; the next progress event resyncs them
                warn!("SSE stream error: {:?}", e);
                None
            }
        }
    });

    Sse::new(first.chain(updates)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
