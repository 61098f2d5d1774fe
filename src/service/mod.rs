//! Service layer for the matchmaking worker
//!
//! This module contains the main application state, health aggregation,
//! and background task management for the production service.

pub mod app;
pub mod health;

pub use app::{AppState, ServiceError};
pub use health::{HealthCheck, HealthContext, HealthStatus};
