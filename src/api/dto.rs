//! Data Transfer Objects
//!
//! Response and query types for the HTTP endpoints.

use serde::{Deserialize, Serialize};

use crate::sink::{DeviceSnapshot, WriterStats};

// ============================================
// HEALTH DTOs
// ============================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: healthy, degraded
    pub status: String,
    /// Whether a device is currently identified
    pub device_connected: bool,
    /// Number of tracked client connections
    pub clients: usize,
    /// Frames skipped because a peer's outbound queue was full
    pub skipped_frames: u64,
    /// Name of the active state sink
    pub sink: String,
    /// Snapshot writer counters
    pub snapshots: WriterStats,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}

// ============================================
// SNAPSHOT DTOs
// ============================================

/// Default number of snapshots returned
pub const DEFAULT_SNAPSHOT_LIMIT: usize = 50;

/// Upper bound on snapshots returned in one request
pub const MAX_SNAPSHOT_LIMIT: usize = 500;

/// Query parameters for listing snapshots
#[derive(Debug, Default, Deserialize)]
pub struct SnapshotParams {
    /// Number of snapshots to return
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Recent snapshots response
#[derive(Debug, Serialize)]
pub struct SnapshotListResponse {
    /// Snapshots, newest first
    pub snapshots: Vec<DeviceSnapshot>,
    /// Number of snapshots returned
    pub count: usize,
}
