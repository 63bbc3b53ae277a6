//! State Sink
//!
//! Persistence of device-state snapshots, kept entirely off the routing path.
//!
//! ## Architecture
//!
//! - **StateSink**: where snapshots end up (SQLite, or discarded)
//! - **SnapshotWriter**: bounded queue + background worker in front of a sink
//! - **DeviceSnapshot**: the persisted record
//!
//! The router only ever calls [`SnapshotWriter::submit`], which returns
//! immediately. Failures are logged and counted, never returned to a peer.

mod error;
mod snapshot;
mod sqlite;
mod writer;

pub use error::{SinkError, SinkResult};
pub use snapshot::{DeviceSnapshot, SERVO_POS_FIELD};
pub use sqlite::SqliteSink;
pub use writer::{SnapshotWriter, WriterStats, DEFAULT_QUEUE_CAPACITY};

use async_trait::async_trait;

/// Destination for device-state snapshots
#[async_trait]
pub trait StateSink: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Persist one snapshot
    async fn persist(&self, snapshot: &DeviceSnapshot) -> SinkResult<()>;
}

/// Sink used when persistence is disabled
#[derive(Debug, Default)]
pub struct DiscardSink;

#[async_trait]
impl StateSink for DiscardSink {
    fn name(&self) -> &str {
        "discard"
    }

    async fn persist(&self, snapshot: &DeviceSnapshot) -> SinkResult<()> {
        tracing::debug!(servo_pos = ?snapshot.servo_pos, "Persistence disabled, snapshot discarded");
        Ok(())
    }
}
