//! ringq-migrate library interface
//!
//! Relays the backend's streamed migration log into structured progress
//! events. Exposes public APIs for the binary and for integration testing.

pub mod api;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod frame;
pub mod milestones;
pub mod models;
pub mod relay;

pub use crate::error::{ApiError, ApiResult, RelayError, RelayResult};

use axum::Router;
use chrono::{DateTime, Utc};
use ringq_common::events::EventBus;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::client::{MigrationClient, MigrationTransport};
use crate::config::Settings;
use crate::controller::MigrationController;
use crate::relay::StreamRelay;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Owner of the single active migration run
    pub controller: MigrationController,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(controller: MigrationController, event_bus: EventBus) -> Self {
        Self {
            controller,
            event_bus,
            startup_time: Utc::now(),
        }
    }

    /// Wire transport, relay and controller around one event bus
    ///
    /// Must be called inside a tokio runtime.
    pub fn with_transport(transport: Arc<dyn MigrationTransport>, settings: &Settings) -> Self {
        let event_bus = EventBus::new(settings.event_capacity);
        let relay = StreamRelay::new(Arc::new(settings.milestones.clone()), event_bus.clone());
        let controller = MigrationController::new(transport, relay);
        Self::new(controller, event_bus)
    }

    /// State talking to the configured HTTP backend
    pub fn from_settings(settings: &Settings) -> RelayResult<Self> {
        let client = MigrationClient::new(
            &settings.backend_url,
            &settings.migrate_path,
            settings.timeout,
        )?;
        Ok(Self::with_transport(Arc::new(client), settings))
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::migrate_routes())
        .route("/migrate/events", get(api::relay_event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
