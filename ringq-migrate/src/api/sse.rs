//! Server-Sent Events (SSE) for migration progress streaming
//!
//! Streams every relay event (`progress` and `terminal`) to UI clients.

use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

/// GET /migrate/events - SSE event stream for migration progress
pub async fn relay_event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    ringq_common::sse::create_relay_sse_stream(&state.event_bus, "ringq-migrate")
}
