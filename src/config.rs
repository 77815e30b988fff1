//! Configuration system for the peer-review router and workers
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (PEER_REVIEW_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::Identity;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerReviewConfig {
    /// Router (server) settings
    pub router: RouterSettings,

    /// Worker (client) settings
    pub worker: WorkerSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Router settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    /// Address to listen on
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Number of workers in the group
    pub group_size: u32,

    /// Bounded wait of the accept loop between shutdown checks (ms)
    pub observer_poll_interval_ms: u64,

    /// Capacity of each connection's outbound frame queue
    pub outbound_queue_size: usize,
}

/// Worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Router address
    pub host: String,

    /// Router port
    pub port: u16,

    /// Identity to reclaim when reconnecting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_id: Option<u32>,

    /// Shortest simulated writing time (ms)
    pub min_write_ms: u64,

    /// Longest simulated writing time (ms)
    pub max_write_ms: u64,

    /// Shortest simulated review time (ms)
    pub min_review_ms: u64,

    /// Longest simulated review time (ms)
    pub max_review_ms: u64,

    /// Wait after an empty poll answer (ms)
    pub poll_backoff_ms: u64,

    /// Fixed RNG seed for reproducible runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Maximum log file size in MB before rotation
    pub max_file_size_mb: u64,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

// Default implementations

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5555,
            group_size: 3,
            observer_poll_interval_ms: 3000,
            outbound_queue_size: 64,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5555,
            reconnect_id: None,
            min_write_ms: 1000,
            max_write_ms: 10_000,
            min_review_ms: 1000,
            max_review_ms: 10_000,
            poll_backoff_ms: 5000,
            seed: None,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_file_size_mb: 100,
            max_files: 5,
            json_format: false,
        }
    }
}

impl RouterSettings {
    /// `host:port` to bind
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn observer_poll_interval(&self) -> Duration {
        Duration::from_millis(self.observer_poll_interval_ms)
    }
}

impl WorkerSettings {
    /// `host:port` of the router
    pub fn router_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn reconnect_identity(&self) -> Option<Identity> {
        self.reconnect_id.map(Identity::new)
    }

    pub fn poll_backoff(&self) -> Duration {
        Duration::from_millis(self.poll_backoff_ms)
    }
}

impl PeerReviewConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path).map_err(|e| Error::IoRead {
                path: path.clone(),
                source: e,
            })?;
            config = toml::from_str(&content).map_err(|e| Error::ConfigParse {
                message: e.message().to_string(),
                source: Some(e),
            })?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // An explicit path must exist
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        let search_paths = [
            PathBuf::from("peer-review.toml"),
            dirs::config_dir()
                .map(|p| p.join("peer-review").join("config.toml"))
                .unwrap_or_default(),
            dirs::home_dir()
                .map(|p| p.join(".peer-review").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/peer-review/config.toml"),
        ];

        for path in &search_paths {
            if path.is_file() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Router settings
        if let Ok(val) = std::env::var("PEER_REVIEW_ROUTER_HOST") {
            self.router.host = val;
        }
        if let Some(n) = env_parse("PEER_REVIEW_ROUTER_PORT") {
            self.router.port = n;
        }
        if let Some(n) = env_parse("PEER_REVIEW_GROUP_SIZE") {
            self.router.group_size = n;
        }
        if let Some(n) = env_parse("PEER_REVIEW_OBSERVER_POLL_MS") {
            self.router.observer_poll_interval_ms = n;
        }

        // Worker settings
        if let Ok(val) = std::env::var("PEER_REVIEW_WORKER_HOST") {
            self.worker.host = val;
        }
        if let Some(n) = env_parse("PEER_REVIEW_WORKER_PORT") {
            self.worker.port = n;
        }
        if let Some(n) = env_parse("PEER_REVIEW_RECONNECT_ID") {
            self.worker.reconnect_id = Some(n);
        }
        if let Some(n) = env_parse("PEER_REVIEW_POLL_BACKOFF_MS") {
            self.worker.poll_backoff_ms = n;
        }
        if let Some(n) = env_parse("PEER_REVIEW_SEED") {
            self.worker.seed = Some(n);
        }

        // Logging settings
        if let Ok(val) = std::env::var("PEER_REVIEW_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("PEER_REVIEW_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("PEER_REVIEW_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.router.host.is_empty() {
            return Err(Error::config_field_invalid("router.host", "Router host cannot be empty"));
        }
        if self.router.port == 0 {
            return Err(Error::config_field_invalid("router.port", "Router port cannot be 0"));
        }
        if self.router.group_size < 2 {
            return Err(Error::config_field_invalid(
                "router.group_size",
                "group_size must be at least 2 so every worker has a reviewer",
            ));
        }
        if self.router.observer_poll_interval_ms == 0 {
            return Err(Error::config_field_invalid(
                "router.observer_poll_interval_ms",
                "observer_poll_interval_ms must be greater than 0",
            ));
        }
        if self.router.outbound_queue_size == 0 {
            return Err(Error::config_field_invalid(
                "router.outbound_queue_size",
                "outbound_queue_size must be greater than 0",
            ));
        }

        if self.worker.host.is_empty() {
            return Err(Error::config_field_invalid("worker.host", "Worker host cannot be empty"));
        }
        if self.worker.port == 0 {
            return Err(Error::config_field_invalid("worker.port", "Worker port cannot be 0"));
        }
        if self.worker.min_write_ms > self.worker.max_write_ms {
            return Err(Error::config_field_invalid(
                "worker.min_write_ms",
                "min_write_ms must not exceed max_write_ms",
            ));
        }
        if self.worker.min_review_ms > self.worker.max_review_ms {
            return Err(Error::config_field_invalid(
                "worker.min_review_ms",
                "min_review_ms must not exceed max_review_ms",
            ));
        }
        if self.worker.poll_backoff_ms == 0 {
            return Err(Error::config_field_invalid(
                "worker.poll_backoff_ms",
                "poll_backoff_ms must be greater than 0",
            ));
        }
        if let Some(id) = self.worker.reconnect_id {
            if id >= self.router.group_size {
                return Err(Error::config_field_invalid(
                    "worker.reconnect_id",
                    format!(
                        "reconnect_id {} is outside the group of {} workers",
                        id, self.router.group_size
                    ),
                ));
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|val| val.parse().ok())
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".peer-review")
                .join("config.toml")
        });

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
fn generate_default_config() -> String {
    r#"# Peer Review Configuration

[router]
# Address and port the router listens on
host = "127.0.0.1"
port = 5555

# Number of workers in the group; work starts once all have connected
group_size = 3

# Bounded wait of the accept loop between shutdown checks (milliseconds)
observer_poll_interval_ms = 3000

# Frames buffered per connection before writes back up
outbound_queue_size = 64

[worker]
# Router to connect to
host = "127.0.0.1"
port = 5555

# Identity to reclaim when reconnecting (comment out for a fresh identity)
# reconnect_id = 0

# Simulated writing time range (milliseconds)
min_write_ms = 1000
max_write_ms = 10000

# Simulated review time range (milliseconds)
min_review_ms = 1000
max_review_ms = 10000

# Wait after an empty queue poll (milliseconds)
poll_backoff_ms = 5000

# Fixed RNG seed for reproducible runs
# seed = 42

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.peer-review/logs/peer-review.log"

# Maximum log file size in MB before rotation
max_file_size_mb = 100

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}
