//! Configuration management
//!
//! Loads configuration from config.toml at startup.
//! Every value has a default so an absent file is a valid setup.

use crate::ws::backoff::ReconnectPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Connector configuration
///
/// Loaded from config.toml (or `CONFIG_PATH`) at startup.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// WebSocket session settings
    #[serde(default)]
    pub stream: StreamConfig,

    /// REST settings for listen key management
    #[serde(default)]
    pub rest: RestConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Streams the binary subscribes on startup
    #[serde(default)]
    pub feeds: FeedsConfig,
}

/// WebSocket session configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StreamConfig {
    /// Base endpoint; route prefix and stream name are appended
    #[serde(default = "default_stream_url")]
    pub base_url: String,

    #[serde(default = "default_io_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Silence longer than this triggers a liveness probe
    #[serde(default = "default_io_timeout_ms")]
    pub recv_timeout_ms: u64,

    #[serde(default = "default_io_timeout_ms")]
    pub ping_timeout_ms: u64,

    /// Bound on awaiting a cancelled session task before aborting it
    #[serde(default = "default_io_timeout_ms")]
    pub close_grace_ms: u64,

    #[serde(default = "default_max_reconnects")]
    pub max_reconnects: u32,

    #[serde(default = "default_max_reconnect_secs")]
    pub max_reconnect_secs: u64,

    /// Listen key renewal period for the user stream
    #[serde(default = "default_user_renewal_secs")]
    pub user_renewal_secs: u64,
}

/// REST API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RestConfig {
    #[serde(default = "default_rest_url")]
    pub base_url: String,

    /// Falls back to `BINANCE_API_KEY` when empty
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Directory for rolling log files
    #[serde(default = "default_log_dir")]
    pub directory: PathBuf,

    /// Default filter directive; `RUST_LOG` overrides it
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Startup subscriptions for the binary
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FeedsConfig {
    /// Stream names, e.g. "btcusdt@trade"
    #[serde(default)]
    pub streams: Vec<String>,

    /// Subscribe `streams` over one multiplexed connection
    #[serde(default)]
    pub combined: bool,

    /// Start the authenticated user-data stream
    #[serde(default)]
    pub user_stream: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_stream_url(),
            connect_timeout_ms: default_io_timeout_ms(),
            recv_timeout_ms: default_io_timeout_ms(),
            ping_timeout_ms: default_io_timeout_ms(),
            close_grace_ms: default_io_timeout_ms(),
            max_reconnects: default_max_reconnects(),
            max_reconnect_secs: default_max_reconnect_secs(),
            user_renewal_secs: default_user_renewal_secs(),
        }
    }
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: default_rest_url(),
            api_key: String::new(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_dir(),
            level: default_log_level(),
        }
    }
}

fn default_stream_url() -> String {
    "wss://stream.binance.com:9443/".to_string()
}

fn default_io_timeout_ms() -> u64 {
    2000
}

fn default_max_reconnects() -> u32 {
    ReconnectPolicy::DEFAULT_MAX_ATTEMPTS
}

fn default_max_reconnect_secs() -> u64 {
    ReconnectPolicy::DEFAULT_MAX_BACKOFF_SECS
}

fn default_user_renewal_secs() -> u64 {
    30 * 60
}

fn default_rest_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl StreamConfig {
    #[inline]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[inline]
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    #[inline]
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    #[inline]
    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    #[inline]
    pub fn user_renewal_interval(&self) -> Duration {
        Duration::from_secs(self.user_renewal_secs)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(self.max_reconnects, self.max_reconnect_secs)
    }
}

impl RestConfig {
    /// Configured API key, or `BINANCE_API_KEY` from the environment
    pub fn resolved_api_key(&self) -> Option<String> {
        if !self.api_key.is_empty() {
            return Some(self.api_key.clone());
        }
        std::env::var("BINANCE_API_KEY").ok().filter(|key| !key.is_empty())
    }

    #[inline]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Config {
    /// Load configuration from config.toml file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// # Errors
    /// Returns error if file exists but cannot be parsed or fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => Self::from_toml(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File not found - use defaults
                Ok(Config::default())
            }
            Err(e) => Err(ConfigError::IoError(e)),
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that both endpoints parse as URLs
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("stream.base_url", &self.stream.base_url),
            ("rest.base_url", &self.rest.base_url),
        ] {
            Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
                field,
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading file
    IoError(std::io::Error),
    /// Parse error (invalid TOML)
    ParseError(String),
    /// Endpoint that is not a URL
    InvalidUrl { field: &'static str, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::ParseError(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::InvalidUrl { field, reason } => {
                write!(f, "Invalid URL in {}: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(e) => Some(e),
            ConfigError::ParseError(_) | ConfigError::InvalidUrl { .. } => None,
        }
    }
}
