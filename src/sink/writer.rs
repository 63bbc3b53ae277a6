//! Snapshot Writer
//!
//! Decouples persistence from routing. A single background worker drains a
//! bounded queue into the configured [`StateSink`]; `submit` never waits.
//! When the queue is full the newest snapshot is dropped.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::error::SinkError;
use super::snapshot::DeviceSnapshot;
use super::StateSink;

/// Default capacity of the snapshot queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Counters describing what happened to submitted snapshots
#[derive(Debug, Default)]
struct WriterCounters {
    submitted: AtomicU64,
    persisted: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of the writer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriterStats {
    pub submitted: u64,
    pub persisted: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Fire-and-forget front of a [`StateSink`]
pub struct SnapshotWriter {
    tx: mpsc::Sender<DeviceSnapshot>,
    counters: Arc<WriterCounters>,
    capacity: usize,
    sink_name: String,
}

impl SnapshotWriter {
    /// Start the background worker for `sink`
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(sink: Arc<dyn StateSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let counters = Arc::new(WriterCounters::default());
        let sink_name = sink.name().to_string();

        let handle = tokio::spawn(run_worker(sink, rx, Arc::clone(&counters)));

        tracing::info!(sink = %sink_name, capacity, "Snapshot writer started");

        (
            Self {
                tx,
                counters,
                capacity,
                sink_name,
            },
            handle,
        )
    }

    /// Queue a snapshot for persistence without waiting
    ///
    /// The error is informational; the caller has nothing to do about it.
    pub fn submit(&self, snapshot: DeviceSnapshot) -> Result<(), SinkError> {
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        match self.tx.try_send(snapshot) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    sink = %self.sink_name,
                    capacity = self.capacity,
                    "Snapshot queue full, dropping newest snapshot"
                );
                Err(SinkError::QueueFull(self.capacity))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::error!(sink = %self.sink_name, "Snapshot writer stopped, dropping snapshot");
                Err(SinkError::Closed)
            }
        }
    }

    /// Current counters
    pub fn stats(&self) -> WriterStats {
        WriterStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            persisted: self.counters.persisted.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Name of the sink behind this writer
    pub fn sink_name(&self) -> &str {
        &self.sink_name
    }
}

async fn run_worker(
    sink: Arc<dyn StateSink>,
    mut rx: mpsc::Receiver<DeviceSnapshot>,
    counters: Arc<WriterCounters>,
) {
    while let Some(snapshot) = rx.recv().await {
        match sink.persist(&snapshot).await {
            Ok(()) => {
                counters.persisted.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    sink = sink.name(),
                    servo_pos = ?snapshot.servo_pos,
                    "Snapshot persisted"
                );
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(sink = sink.name(), error = %e, "Failed to persist snapshot");
            }
        }
    }

    tracing::debug!(sink = sink.name(), "Snapshot writer stopped");
}
