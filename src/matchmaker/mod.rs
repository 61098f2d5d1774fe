//! Matchmaking: waiting pool, team formation and the worker loop

pub mod engine;
pub mod pool;
pub mod teams;

// Re-export commonly used types
pub use engine::{LoopSettings, Matchmaker, MatchmakerStats, StepOutcome};
pub use pool::WaitingPool;
pub use teams::{average_elo, form_teams};
