//! Local HTTP API
//!
//! Lets a desktop UI drive migration runs and follow them live:
//! REST endpoints for start/cancel/status plus an SSE stream of relay events.

pub mod health;
pub mod migrate;
pub mod sse;

pub use health::health_routes;
pub use migrate::migrate_routes;
pub use sse::relay_event_stream;
