//! Configuration loading for the decision engine
//!
//! A single JSON file with four sections:
//! - `server`: HTTP listener and request timeouts
//! - `feature_store`: where features come from and which pairs to request
//! - `trading`: tick interval, rule chain, buffer and evaluation settings
//! - `query`: limits used by the REST endpoints
//!
//! Every field has a default, so `{}` is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub feature_store: FeatureStoreConfig,

    #[serde(default)]
    pub trading: TradingConfig,

    #[serde(default)]
    pub query: QueryConfig,
}

impl EngineConfig {
    /// Load and validate configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        let mut config = Self::from_json(&content)?;
        config.resolve_paths(path.as_ref());
        Ok(config)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `HOST` and `PORT` environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(std::env::var("HOST").ok(), std::env::var("PORT").ok())
    }

    fn apply_overrides(&mut self, host: Option<String>, port: Option<String>) -> Result<(), ConfigError> {
        if let Some(host) = host {
            self.server.host = host;
        }
        if let Some(port) = port {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                field: "PORT",
                reason: format!("'{}' is not a valid port", port),
            })?;
        }
        Ok(())
    }

    /// A relative `rules_file` is resolved against the config file's directory
    fn resolve_paths(&mut self, config_path: &Path) {
        let Some(dir) = config_path.parent() else {
            return;
        };
        if let Some(rules) = self.trading.rules_file.as_mut() {
            if rules.is_relative() {
                *rules = dir.join(&*rules);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let pairs = &self.feature_store.trading_pairs;
        if pairs.is_empty() {
            return Err(invalid("feature_store.trading_pairs", "at least one pair is required"));
        }
        let mut seen = HashSet::new();
        for pair in pairs {
            if pair.trim().is_empty() {
                return Err(invalid("feature_store.trading_pairs", "pairs must not be blank"));
            }
            if !seen.insert(pair) {
                return Err(invalid(
                    "feature_store.trading_pairs",
                    format!("duplicate pair {}", pair),
                ));
            }
        }

        if !self.feature_store.use_mock && self.feature_store.base_url.trim().is_empty() {
            return Err(invalid(
                "feature_store.base_url",
                "required unless use_mock is set",
            ));
        }
        if self.feature_store.request_timeout_secs == 0 {
            return Err(invalid("feature_store.request_timeout_secs", "must be positive"));
        }
        if self.trading.update_interval_secs == 0 {
            return Err(invalid("trading.update_interval_secs", "must be positive"));
        }
        if self.trading.buffer_capacity == 0 {
            return Err(invalid("trading.buffer_capacity", "must be positive"));
        }
        if self.trading.evaluation_timeout_ms == 0 {
            return Err(invalid("trading.evaluation_timeout_ms", "must be positive"));
        }
        if self.trading.evaluator_workers == 0 {
            return Err(invalid("trading.evaluator_workers", "must be positive"));
        }
        if self.query.recent_limit == 0 || self.query.pair_limit == 0 {
            return Err(invalid("query", "limits must be positive"));
        }
        if self.query.over_fetch_factor == 0 {
            return Err(invalid("query.over_fetch_factor", "must be positive"));
        }

        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Applied as the request timeout of the HTTP layer
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    /// Grace period for in-flight responses on shutdown
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_read_timeout_secs() -> u64 {
    30
}

fn default_write_timeout_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            read_timeout_secs: default_read_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
        }
    }
}

/// Feature store client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureStoreConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Serve synthetic features instead of calling the store
    #[serde(default)]
    pub use_mock: bool,

    #[serde(default = "default_trading_pairs")]
    pub trading_pairs: Vec<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retries after the first attempt
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    #[serde(default = "default_retry_wait_ms")]
    pub retry_wait_ms: u64,
}

impl FeatureStoreConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_wait(&self) -> Duration {
        Duration::from_millis(self.retry_wait_ms)
    }
}

fn default_base_url() -> String {
    "http://localhost:6566".to_string()
}

fn default_trading_pairs() -> Vec<String> {
    vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_wait_ms() -> u64 {
    1000
}

impl Default for FeatureStoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            use_mock: false,
            trading_pairs: default_trading_pairs(),
            request_timeout_secs: default_request_timeout_secs(),
            retry_count: default_retry_count(),
            retry_wait_ms: default_retry_wait_ms(),
        }
    }
}

/// Decision pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    #[serde(default = "default_update_interval_secs")]
    pub update_interval_secs: u64,

    /// Rule chain definition; the built-in chain is used when absent
    #[serde(default)]
    pub rules_file: Option<PathBuf>,

    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    #[serde(default = "default_evaluation_timeout_ms")]
    pub evaluation_timeout_ms: u64,

    /// Rule engine worker threads
    #[serde(default = "default_evaluator_workers")]
    pub evaluator_workers: usize,
}

impl TradingConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_millis(self.evaluation_timeout_ms)
    }
}

fn default_update_interval_secs() -> u64 {
    30
}

fn default_buffer_capacity() -> usize {
    100
}

fn default_evaluation_timeout_ms() -> u64 {
    3000
}

fn default_evaluator_workers() -> usize {
    4
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: default_update_interval_secs(),
            rules_file: None,
            buffer_capacity: default_buffer_capacity(),
            evaluation_timeout_ms: default_evaluation_timeout_ms(),
            evaluator_workers: default_evaluator_workers(),
        }
    }
}

/// Limits applied by the query endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Default `n` for `GET /signals`
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,

    /// Default `n` for `GET /signals/{pair}`
    #[serde(default = "default_pair_limit")]
    pub pair_limit: usize,

    #[serde(default = "default_over_fetch_factor")]
    pub over_fetch_factor: usize,
}

fn default_recent_limit() -> usize {
    10
}

fn default_pair_limit() -> usize {
    5
}

fn default_over_fetch_factor() -> usize {
    5
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            recent_limit: default_recent_limit(),
            pair_limit: default_pair_limit(),
            over_fetch_factor: default_over_fetch_factor(),
        }
    }
}

/// Configuration error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {error}")]
    Io { path: String, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
