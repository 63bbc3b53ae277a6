//! Health Routes
//!
//! Health check endpoints for monitoring.
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health - Relay status with device, client and snapshot details

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::HealthResponse;
use crate::api::state::AppState;

/// GET /health/live
///
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health
///
/// Full relay status. Reports `degraded` once any snapshot has failed to
/// persist or been dropped; routing is unaffected either way.
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let hub_status = state.hub.status().await;
    let snapshots = state.hub.snapshot_stats();

    let status = if snapshots.failed == 0 && snapshots.dropped == 0 {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        device_connected: hub_status.device_connected,
        clients: hub_status.clients,
        skipped_frames: state.hub.skipped_frames(),
        sink: state.hub.sink_name().to_string(),
        snapshots,
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
