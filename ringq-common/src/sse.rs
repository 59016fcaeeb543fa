//! Server-Sent Events (SSE) utilities
//!
//! Re-broadcasts relay events to UI clients over `text/event-stream`.

use crate::events::{EventBus, RelayEvent};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Keep-alive comment interval
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Convert one relay event into an SSE event (`event:` name + JSON `data:`)
pub fn to_sse_event(event: &RelayEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.event_type()).data(json)),
        Err(e) => {
            warn!("SSE: Failed to serialize relay event: {}", e);
            None
        }
    }
}

/// Create an SSE stream forwarding every relay event published on `bus`
///
/// The client first receives a `ConnectionStatus` event; keep-alive
/// comments are sent every 15 seconds. A subscriber that falls behind
/// skips the lost events and keeps streaming.
///
/// # Example
/// ```rust,ignore
/// pub async fn event_stream(
///     State(state): State<AppState>,
/// ) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
///     ringq_common::sse::create_relay_sse_stream(&state.event_bus, "ringq-migrate")
/// }
/// ```
pub fn create_relay_sse_stream(
    bus: &EventBus,
    service_name: &'static str,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = bus.subscribe();
    info!(
        "New SSE client connected to {} relay events ({} subscribers)",
        service_name,
        bus.subscriber_count()
    );

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(sse_event) = to_sse_event(&event) {
                        debug!("SSE: Forwarding {} event", event.event_type());
                        yield Ok(sse_event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("SSE: {} client lagged, skipped {} events", service_name, skipped);
                }
                Err(RecvError::Closed) => {
                    info!("SSE: {} event bus closed", service_name);
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
