//! Application State
//!
//! Shared state accessible by the WebSocket and HTTP handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use crate::sink::SqliteSink;
use crate::websocket::RelayHub;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Relay hub routing frames between device and clients
    pub hub: Arc<RelayHub>,
    /// Snapshot store, when persistence is backed by SQLite
    pub snapshots: Option<Arc<SqliteSink>>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Create a new AppState without a queryable snapshot store
    pub fn new(hub: Arc<RelayHub>) -> Self {
        Self {
            hub,
            snapshots: None,
            start_time: Instant::now(),
        }
    }

    /// Create AppState with a SQLite snapshot store
    pub fn with_snapshots(hub: Arc<RelayHub>, snapshots: Arc<SqliteSink>) -> Self {
        Self {
            hub,
            snapshots: Some(snapshots),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
