//! State sink error types
//!
//! Everything that can go wrong between the router handing over a snapshot
//! and the row landing in the database. None of these ever reach a peer.

use thiserror::Error;

/// Errors that can occur while building or persisting a snapshot
#[derive(Error, Debug)]
pub enum SinkError {
    /// A state field carried a value of the wrong type
    #[error("Invalid snapshot field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// The database rejected the write
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O failure while preparing the database location
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),

    /// The blocking write task panicked or was cancelled
    #[error("Write task failed: {0}")]
    Task(String),

    /// The writer queue was full and the snapshot was dropped
    #[error("Snapshot queue full (capacity: {0})")]
    QueueFull(usize),

    /// The writer worker has stopped
    #[error("Snapshot writer is closed")]
    Closed,
}

impl From<tokio::task::JoinError> for SinkError {
    fn from(err: tokio::task::JoinError) -> Self {
        SinkError::Task(err.to_string())
    }
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;
