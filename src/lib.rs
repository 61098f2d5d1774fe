//! Arena Matchmaker - queue-driven matchmaking worker for 5v5 games
//!
//! This crate pops players from a shared Redis queue, forms red and blue
//! teams of five in arrival order, and persists each match with its roster
//! atomically in Postgres.

pub mod config;
pub mod error;
pub mod matchmaker;
pub mod metrics;
pub mod persistence;
pub mod producer;
pub mod queue;
pub mod service;
pub mod types;

// Re-export commonly used types and traits
pub use error::{MatchmakingError, MatchmakingResult, Result};
pub use types::*;

// Re-export key components
pub use matchmaker::{Matchmaker, MatchmakerStats, WaitingPool};
pub use persistence::{MatchPersister, MatchStore};
pub use queue::PlayerQueue;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
