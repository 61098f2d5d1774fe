//! Configuration management for the matchmaking worker
//!
//! This module handles configuration loading from TOML files and
//! environment variables, validation, and default values.

pub mod app;

// Re-export commonly used types
pub use app::{
    normalize_redis_url, validate_config, AppConfig, DatabaseSettings, MatchmakingSettings,
    QueueSettings, ServiceSettings,
};
