//! # Relayhub
//!
//! Real-time relay between one embedded device and any number of web
//! observers. The device identifies itself with a bare handshake token,
//! its state reports are fanned out to every connected browser, and
//! browser commands are forwarded back to it.
//!
//! ## Features
//!
//! - **Relay hub**: single device slot, origin-based routing, disconnect notice
//! - **Persistence**: state reports stored in SQLite off the routing path
//! - **Health**: HTTP status endpoint alongside the WebSocket
//!
//! ## Modules
//!
//! - [`websocket`]: Relay hub, frame parsing and connection handling
//! - [`sink`]: Device snapshot persistence
//! - [`api`]: Axum router and server
//! - [`config`]: TOML/environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relayhub::api::{serve, AppState};
//! use relayhub::config::Config;
//! use relayhub::sink::{SnapshotWriter, SqliteSink};
//! use relayhub::websocket::RelayHub;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!
//!     let sink = Arc::new(SqliteSink::open(config.sink.database_path())?);
//!     let (writer, _worker) = SnapshotWriter::spawn(sink.clone(), config.sink.queue_capacity);
//!     let hub = Arc::new(RelayHub::new(writer));
//!
//!     serve(AppState::with_snapshots(hub, sink), &config.server).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod sink;
pub mod websocket;

// Re-export top-level types for convenience
pub use api::{build_router, serve, ApiError, AppState};

pub use config::{
    Config, ConfigError, LoadReport, LoggingConfig, RelayConfig, ServerConfig, SinkConfig,
};

pub use sink::{
    DeviceSnapshot, DiscardSink, SinkError, SnapshotWriter, SqliteSink, StateSink, WriterStats,
};

pub use websocket::{
    websocket_handler, Departure, HubConfig, HubNotice, InboundFrame, Peer, RelayHub, RouteOutcome,
};
