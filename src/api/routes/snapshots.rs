//! Snapshot Routes
//!
//! Read access to persisted device-state snapshots.
//!
//! - GET /api/v1/snapshots?limit=N - Most recent snapshots, newest first

use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use crate::api::dto::{
    SnapshotListResponse, SnapshotParams, DEFAULT_SNAPSHOT_LIMIT, MAX_SNAPSHOT_LIMIT,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;

/// GET /api/v1/snapshots
pub async fn list_snapshots(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SnapshotParams>,
) -> ApiResult<Json<SnapshotListResponse>> {
    let store = state.snapshots.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable("Snapshot persistence is disabled".to_string())
    })?;

    let limit = params.limit.unwrap_or(DEFAULT_SNAPSHOT_LIMIT);
    if limit == 0 || limit > MAX_SNAPSHOT_LIMIT {
        return Err(ApiError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_SNAPSHOT_LIMIT
        )));
    }

    let snapshots = store.recent(limit).await?;

    Ok(Json(SnapshotListResponse {
        count: snapshots.len(),
        snapshots,
    }))
}
