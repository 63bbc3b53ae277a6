//! Relayhub Server
//!
//! Run with: cargo run --bin relayhub
//!
//! # Configuration
//!
//! Config file (first found): `--config <path>`,
//! `~/.config/relayhub/config.toml`, `/etc/relayhub/config.toml`,
//! `./config.toml`. Environment variables override the file:
//! - `RELAYHUB_HOST`, `RELAYHUB_PORT`: listen address (default: 0.0.0.0:8080)
//! - `RELAYHUB_PEER_QUEUE`: frames buffered per connection (default: 64)
//! - `RELAYHUB_DATABASE`: SQLite file for device snapshots
//! - `RELAYHUB_SINK_ENABLED`: persist device state (default: true)
//! - `RELAYHUB_LOG_LEVEL`, `RELAYHUB_LOG_FORMAT`: logging
//! - `RUST_LOG`: takes precedence over the configured level

use anyhow::Context;
use clap::Parser;
use relayhub::api::{serve, AppState};
use relayhub::config::{generate_default_config, Config, LoadReport, LoggingConfig};
use relayhub::sink::{DiscardSink, SnapshotWriter, SqliteSink};
use relayhub::websocket::RelayHub;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "relayhub")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Relay between an embedded device and its web clients")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print a default config file and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", generate_default_config());
        return Ok(());
    }

    let (config, report) = match &cli.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load_default(),
    };

    init_logging(&config.logging);

    tracing::info!("Starting Relayhub v{}", env!("CARGO_PKG_VERSION"));
    log_load_report(&report);

    let (state, _worker) = if config.sink.enabled {
        let path = config.sink.database_path();
        tracing::info!("Snapshot database: {:?}", path);

        let sink = Arc::new(
            SqliteSink::open(&path)
                .with_context(|| format!("opening snapshot database {}", path.display()))?,
        );
        let (writer, worker) = SnapshotWriter::spawn(sink.clone(), config.sink.queue_capacity);
        let hub = Arc::new(RelayHub::with_config(config.relay.hub_config(), writer));
        (AppState::with_snapshots(hub, sink), worker)
    } else {
        tracing::info!("Snapshot persistence disabled");
        let (writer, worker) =
            SnapshotWriter::spawn(Arc::new(DiscardSink), config.sink.queue_capacity);
        let hub = Arc::new(RelayHub::with_config(config.relay.hub_config(), writer));
        (AppState::new(hub), worker)
    };

    serve(state, &config.server).await?;

    tracing::info!("Relayhub stopped");
    Ok(())
}

fn log_load_report(report: &LoadReport) {
    for warning in &report.warnings {
        tracing::warn!("{}", warning);
    }

    match &report.source {
        Some(path) => tracing::info!("Loaded config from {:?}", path),
        None => tracing::info!("Using default config with environment overrides"),
    }
}

/// Install the global tracing subscriber
fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("relayhub={},tower_http=info", logging.level)));

    let registry = tracing_subscriber::registry().with(filter);

    if logging.is_json() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
