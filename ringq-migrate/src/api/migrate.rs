//! Migration run API handlers
//!
//! POST /migrate/start, POST /migrate/cancel, GET /migrate/status

use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{MigrationRunState, RunStatus},
    AppState,
};

/// POST /migrate/start response
#[derive(Debug, Serialize)]
pub struct StartMigrationResponse {
    pub run_id: Uuid,
    pub status: RunStatus,
}

/// POST /migrate/cancel response
#[derive(Debug, Serialize)]
pub struct CancelMigrationResponse {
    pub run_id: Uuid,
    pub cancelled_at: chrono::DateTime<chrono::Utc>,
}

/// POST /migrate/start
///
/// The (optional) JSON body is forwarded verbatim to the backend.
/// Returns 409 Conflict while another run is active.
pub async fn start_migration(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<StartMigrationResponse>> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::json!({})
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))?
    };

    let run_id = state.controller.start(request).await.map_err(|e| {
        tracing::warn!(error = %e, "Migration start rejected");
        ApiError::from(e)
    })?;

    tracing::info!(run_id = %run_id, "Migration run started via API");

    Ok(Json(StartMigrationResponse {
        run_id,
        status: RunStatus::Running,
    }))
}

/// POST /migrate/cancel
///
/// Returns 404 when no run is active.
pub async fn cancel_migration(
    State(state): State<AppState>,
) -> ApiResult<Json<CancelMigrationResponse>> {
    let run_id = state.controller.cancel().await?;

    tracing::info!(run_id = %run_id, "Migration run cancelled via API");

    Ok(Json(CancelMigrationResponse {
        run_id,
        cancelled_at: chrono::Utc::now(),
    }))
}

/// GET /migrate/status
///
/// Current or most recent run; 404 before the first run.
pub async fn get_migration_status(
    State(state): State<AppState>,
) -> ApiResult<Json<MigrationRunState>> {
    let status = state
        .controller
        .status()
        .await
        .ok_or_else(|| ApiError::NotFound("No migration run has been started".to_string()))?;

    tracing::debug!(run_id = %status.run_id, status = ?status.status, "Status query");

    Ok(Json(status))
}

/// Build migration routes
pub fn migrate_routes() -> Router<AppState> {
    Router::new()
        .route("/migrate/start", post(start_migration))
        .route("/migrate/cancel", post(cancel_migration))
        .route("/migrate/status", get(get_migration_status))
}
