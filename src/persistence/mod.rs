//! Match persistence
//!
//! A match row and its ten roster rows are written in one transaction. The
//! store traits expose the raw transaction primitives; [`MatchPersister`]
//! owns the all-or-nothing sequencing on top of them.

pub mod memory;
pub mod postgres;

use crate::error::{MatchmakingError, MatchmakingResult, PersistStage};
use crate::types::{FormedMatch, MatchId, MatchPlayer};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

// Re-export commonly used types
pub use memory::{FailurePoint, InMemoryMatchStore};
pub use postgres::PostgresMatchStore;

/// An open transaction against the match store
#[async_trait]
pub trait MatchTransaction: Send {
    /// Insert the match row and return its generated identifier
    async fn insert_match(&mut self, region: &str, average_elo: i32) -> MatchmakingResult<MatchId>;

    /// Insert one roster row
    async fn insert_match_player(&mut self, row: &MatchPlayer) -> MatchmakingResult<()>;

    async fn commit(self: Box<Self>) -> MatchmakingResult<()>;

    async fn rollback(self: Box<Self>) -> MatchmakingResult<()>;
}

/// Relational store holding matches and their rosters
#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn begin(&self) -> MatchmakingResult<Box<dyn MatchTransaction>>;

    /// Cheap connectivity probe for health checks
    async fn ping(&self) -> MatchmakingResult<()>;
}

/// Writes formed matches atomically. Has no retry policy of its own.
#[derive(Clone)]
pub struct MatchPersister {
    store: Arc<dyn MatchStore>,
}

impl MatchPersister {
    pub fn new(store: Arc<dyn MatchStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn MatchStore> {
        self.store.clone()
    }

    /// Persist the match and its full roster, or nothing at all
    pub async fn persist(&self, formed: &FormedMatch) -> MatchmakingResult<MatchId> {
        let mut tx = self.store.begin().await?;

        match Self::write_match(tx.as_mut(), formed).await {
            Ok(match_id) => {
                tx.commit().await?;
                debug!(%match_id, "Match transaction committed");
                Ok(match_id)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback after failed match write also failed");
                }
                Err(e)
            }
        }
    }

    async fn write_match(
        tx: &mut dyn MatchTransaction,
        formed: &FormedMatch,
    ) -> MatchmakingResult<MatchId> {
        let match_id = tx.insert_match(&formed.region, formed.average_elo).await?;

        for row in formed.roster(match_id) {
            tx.insert_match_player(&row).await?;
        }

        Ok(match_id)
    }
}

/// Convert a store-specific error for a transaction stage
pub(crate) fn stage_error(stage: PersistStage) -> impl FnOnce(sqlx::Error) -> MatchmakingError {
    move |e| MatchmakingError::persistence(stage, e)
}
