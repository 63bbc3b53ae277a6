//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::sink::DEFAULT_QUEUE_CAPACITY;
use crate::websocket::HubConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub sink: SinkConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listening endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Per-connection relay configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_peer_queue_capacity")]
    pub peer_queue_capacity: usize,
}

fn default_peer_queue_capacity() -> usize {
    HubConfig::default().peer_queue_capacity
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            peer_queue_capacity: default_peer_queue_capacity(),
        }
    }
}

impl RelayConfig {
    /// Hub settings derived from this section
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            peer_queue_capacity: self.peer_queue_capacity,
        }
    }
}

/// Snapshot persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_sink_enabled")]
    pub enabled: bool,

    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_sink_enabled() -> bool {
    true
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|p| {
            p.join("relayhub")
                .join("device_states.db")
                .to_string_lossy()
                .to_string()
        })
        .unwrap_or_else(|| "./device_states.db".to_string())
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            enabled: default_sink_enabled(),
            database_path: default_database_path(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl SinkConfig {
    /// Database path with a leading `~/` expanded to the home directory
    pub fn database_path(&self) -> PathBuf {
        match (self.database_path.strip_prefix("~/"), dirs::home_dir()) {
            (Some(rest), Some(home)) => home.join(rest),
            _ => PathBuf::from(&self.database_path),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    /// Whether structured JSON output was requested
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    /// Parse configuration from TOML text
    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> (Self, LoadReport) {
        let mut config = Config::default();
        let warnings = config.apply_env_overrides();
        (
            config,
            LoadReport {
                source: None,
                warnings,
            },
        )
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<(Self, LoadReport), ConfigError> {
        let mut config = Self::load(path)?;
        let warnings = config.apply_env_overrides();
        Ok((
            config,
            LoadReport {
                source: Some(path.to_path_buf()),
                warnings,
            },
        ))
    }

    /// Load from default locations or environment
    ///
    /// Files that exist but fail to load are skipped and noted in the report.
    pub fn load_default() -> (Self, LoadReport) {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("relayhub").join("config.toml")),
            Some(PathBuf::from("/etc/relayhub/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        Self::load_first(config_paths.iter().flatten())
    }

    fn load_first<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) -> (Self, LoadReport) {
        let mut skipped = Vec::new();

        for path in paths {
            if !path.exists() {
                continue;
            }
            match Self::load_with_env(path) {
                Ok((config, mut report)) => {
                    skipped.append(&mut report.warnings);
                    report.warnings = skipped;
                    return (config, report);
                }
                Err(e) => skipped.push(e.to_string()),
            }
        }

        let (config, mut report) = Self::from_env();
        skipped.append(&mut report.warnings);
        report.warnings = skipped;
        (config, report)
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) -> Vec<String> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
        let mut warnings = Vec::new();

        // Server overrides
        if let Some(host) = lookup("RELAYHUB_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("RELAYHUB_PORT") {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => warnings.push(format!("Ignoring invalid RELAYHUB_PORT: {}", port)),
            }
        }

        // Relay overrides
        if let Some(capacity) = lookup("RELAYHUB_PEER_QUEUE") {
            match capacity.parse::<usize>() {
                Ok(c) if c > 0 => self.relay.peer_queue_capacity = c,
                _ => warnings.push(format!("Ignoring invalid RELAYHUB_PEER_QUEUE: {}", capacity)),
            }
        }

        // Sink overrides
        if let Some(path) = lookup("RELAYHUB_DATABASE") {
            self.sink.database_path = path;
        }
        if let Some(enabled) = lookup("RELAYHUB_SINK_ENABLED") {
            self.sink.enabled = enabled.to_lowercase() != "false" && enabled != "0";
        }

        // Logging overrides
        if let Some(level) = lookup("RELAYHUB_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("RELAYHUB_LOG_FORMAT") {
            self.logging.format = format;
        }

        warnings
    }
}

/// Where configuration came from and what was ignored along the way
///
/// Nothing is logged while loading; the caller logs the report once
/// tracing is initialized.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// File the config was read from, `None` for defaults plus environment
    pub source: Option<PathBuf>,
    /// Problems that were skipped over
    pub warnings: Vec<String>,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Relayhub Configuration
#
# Environment variables override these settings:
# - RELAYHUB_HOST
# - RELAYHUB_PORT
# - RELAYHUB_PEER_QUEUE
# - RELAYHUB_DATABASE
# - RELAYHUB_SINK_ENABLED
# - RELAYHUB_LOG_LEVEL
# - RELAYHUB_LOG_FORMAT

[server]
# Listen host
host = "0.0.0.0"

# Listen port (device and browsers connect to ws://host:port/)
port = 8080

[relay]
# Frames buffered per connection; a peer that stops reading has further
# frames skipped until it catches up
peer_queue_capacity = 64

[sink]
# Persist device state reports that carry servoPos
enabled = true

# SQLite database file for device state snapshots
database_path = "~/.local/share/relayhub/device_states.db"

# Snapshots waiting to be written; when full, new snapshots are dropped
queue_capacity = 256

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
