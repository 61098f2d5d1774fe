//! Main application configuration
//!
//! This module defines the configuration structures for the matchmaking
//! worker, including TOML and environment variable loading and validation.

use crate::queue::MATCH_QUEUE_KEY;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub queue: QueueSettings,
    pub database: DatabaseSettings,
    pub matchmaking: MatchmakingSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for the health and metrics endpoint
    pub metrics_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Redis queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Redis URL
    pub url: String,
    /// List key players are pushed onto
    pub queue_key: String,
    /// Connection timeout in milliseconds
    pub connection_timeout_ms: u64,
    /// Maximum connection attempts at startup
    pub max_retry_attempts: u32,
    /// Initial retry delay in milliseconds
    pub retry_delay_ms: u64,
}

/// Postgres settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Connection string; there is no default
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

/// Matchmaking loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingSettings {
    /// Pause after an empty poll
    pub poll_interval_ms: u64,
    /// Pause after a queue failure
    pub error_backoff_ms: u64,
    /// Deadline for a single queue or database operation
    pub operation_timeout_ms: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "arena-matchmaker".to_string(),
            log_level: "info".to_string(),
            metrics_port: 9090,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            url: "redis://redis:6379".to_string(),
            queue_key: MATCH_QUEUE_KEY.to_string(),
            connection_timeout_ms: 5000,
            max_retry_attempts: 5,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
            acquire_timeout_seconds: 10,
        }
    }
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            error_backoff_ms: 1000,
            operation_timeout_ms: 5000,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self =
            toml::from_str(raw).map_err(|e| anyhow!("Invalid configuration file: {}", e))?;
        config.queue.url = normalize_redis_url(&config.queue.url);
        Ok(config)
    }

    /// Overlay environment variables onto this configuration
    pub fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(port) = env::var("METRICS_PORT") {
            self.service.metrics_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid METRICS_PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            self.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Queue settings
        if let Ok(url) = env::var("REDIS_CONN") {
            self.queue.url = normalize_redis_url(&url);
        }
        if let Ok(key) = env::var("MATCH_QUEUE_KEY") {
            self.queue.queue_key = key;
        }

        // Database settings
        if let Ok(url) = env::var("DB_CONN") {
            self.database.url = Some(url);
        }
        if let Ok(max) = env::var("DB_MAX_CONNECTIONS") {
            self.database.max_connections = max
                .parse()
                .map_err(|_| anyhow!("Invalid DB_MAX_CONNECTIONS value: {}", max))?;
        }

        // Matchmaking settings
        if let Ok(interval) = env::var("POLL_INTERVAL_MS") {
            self.matchmaking.poll_interval_ms = interval
                .parse()
                .map_err(|_| anyhow!("Invalid POLL_INTERVAL_MS value: {}", interval))?;
        }
        if let Ok(backoff) = env::var("ERROR_BACKOFF_MS") {
            self.matchmaking.error_backoff_ms = backoff
                .parse()
                .map_err(|_| anyhow!("Invalid ERROR_BACKOFF_MS value: {}", backoff))?;
        }
        if let Ok(timeout) = env::var("OPERATION_TIMEOUT_MS") {
            self.matchmaking.operation_timeout_ms = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid OPERATION_TIMEOUT_MS value: {}", timeout))?;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.matchmaking.poll_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.matchmaking.error_backoff_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.matchmaking.operation_timeout_ms)
    }

    pub fn db_acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.database.acquire_timeout_seconds)
    }

    /// Database connection string, which must be configured
    pub fn database_url(&self) -> Result<&str> {
        self.database
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| anyhow!("DB_CONN environment variable not set"))
    }
}

/// Accept a bare `host:port` as well as a full `redis://` URL
pub fn normalize_redis_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("redis://") || trimmed.starts_with("rediss://") {
        trimmed.to_string()
    } else {
        format!("redis://{}", trimmed)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate ports
    if config.service.metrics_port == 0 {
        return Err(anyhow!("Metrics port cannot be 0"));
    }

    // Validate timeouts
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.queue.connection_timeout_ms == 0 {
        return Err(anyhow!("Queue connection timeout must be greater than 0"));
    }

    // Validate queue settings
    if config.queue.url == "redis://" {
        return Err(anyhow!("Redis URL cannot be empty"));
    }
    if config.queue.queue_key.is_empty() {
        return Err(anyhow!("Queue key cannot be empty"));
    }

    // Validate database settings
    config.database_url()?;
    if config.database.max_connections == 0 {
        return Err(anyhow!("Database pool needs at least one connection"));
    }

    // Validate loop settings
    if config.matchmaking.poll_interval_ms == 0 {
        return Err(anyhow!("Poll interval must be greater than 0"));
    }
    if config.matchmaking.error_backoff_ms == 0 {
        return Err(anyhow!("Error backoff must be greater than 0"));
    }
    if config.matchmaking.operation_timeout_ms == 0 {
        return Err(anyhow!("Operation timeout must be greater than 0"));
    }

    Ok(())
}
