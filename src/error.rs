//! Error types for the matchmaking service
//!
//! Steady-state failures are typed so the matchmaking loop can tell a
//! transient queue outage from a poisoned entry or a failed transaction.
//! Startup and wiring code uses anyhow.

use std::time::Duration;

/// Result type alias for startup and service wiring
pub type Result<T> = anyhow::Result<T>;

/// Result type for the matchmaking components
pub type MatchmakingResult<T> = std::result::Result<T, MatchmakingError>;

/// Stage of the match transaction that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistStage {
    Begin,
    InsertMatch,
    InsertPlayer,
    Commit,
}

impl std::fmt::Display for PersistStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistStage::Begin => write!(f, "begin"),
            PersistStage::InsertMatch => write!(f, "insert match"),
            PersistStage::InsertPlayer => write!(f, "insert match player"),
            PersistStage::Commit => write!(f, "commit"),
        }
    }
}

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("Queue unavailable: {message}")]
    QueueUnavailable { message: String },

    #[error("Malformed queue entry: {reason}")]
    MalformedQueueEntry { reason: String, payload: String },

    #[error("Match persistence failed during {stage}: {message}")]
    Persistence {
        stage: PersistStage,
        message: String,
    },

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl MatchmakingError {
    pub fn persistence(stage: PersistStage, err: impl std::fmt::Display) -> Self {
        MatchmakingError::Persistence {
            stage,
            message: err.to_string(),
        }
    }

    /// Whether the failing operation may succeed if simply tried again
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MatchmakingError::QueueUnavailable { .. } | MatchmakingError::Timeout(_)
        )
    }
}

impl From<redis::RedisError> for MatchmakingError {
    fn from(err: redis::RedisError) -> Self {
        MatchmakingError::QueueUnavailable {
            message: err.to_string(),
        }
    }
}
