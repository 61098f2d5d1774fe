//! Postgres-backed match store

use super::{stage_error, MatchStore, MatchTransaction};
use crate::error::{MatchmakingError, MatchmakingResult, PersistStage};
use crate::types::{MatchId, MatchPlayer};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::info;

/// Connection settings for the Postgres store
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

/// Match store on a Postgres connection pool
#[derive(Clone)]
pub struct PostgresMatchStore {
    pool: PgPool,
}

impl PostgresMatchStore {
    /// Open a connection pool. Connections are established lazily on first use.
    pub fn connect_lazy(config: &PostgresConfig) -> MatchmakingResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_lazy(&config.url)
            .map_err(|e| MatchmakingError::ConfigurationError {
                message: format!("Invalid database connection string: {}", e),
            })?;

        info!(
            max_connections = config.max_connections,
            "Postgres match store configured"
        );
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MatchStore for PostgresMatchStore {
    async fn begin(&self) -> MatchmakingResult<Box<dyn MatchTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(stage_error(PersistStage::Begin))?;
        Ok(Box::new(PgMatchTransaction { tx }))
    }

    async fn ping(&self) -> MatchmakingResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| MatchmakingError::InternalError {
                message: format!("Database ping failed: {}", e),
            })?;
        Ok(())
    }
}

struct PgMatchTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl MatchTransaction for PgMatchTransaction {
    async fn insert_match(&mut self, region: &str, average_elo: i32) -> MatchmakingResult<MatchId> {
        sqlx::query_scalar::<_, MatchId>(
            "INSERT INTO matches (region, average_elo) VALUES ($1, $2) RETURNING id",
        )
        .bind(region)
        .bind(average_elo)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(stage_error(PersistStage::InsertMatch))
    }

    async fn insert_match_player(&mut self, row: &MatchPlayer) -> MatchmakingResult<()> {
        sqlx::query(
            "INSERT INTO match_players (match_id, user_id, team, elo) VALUES ($1, $2, $3, $4)",
        )
        .bind(row.match_id)
        .bind(&row.user_id)
        .bind(row.team.as_str())
        .bind(row.elo)
        .execute(&mut *self.tx)
        .await
        .map_err(stage_error(PersistStage::InsertPlayer))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> MatchmakingResult<()> {
        self.tx
            .commit()
            .await
            .map_err(stage_error(PersistStage::Commit))
    }

    async fn rollback(self: Box<Self>) -> MatchmakingResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| MatchmakingError::InternalError {
                message: format!("Rollback failed: {}", e),
            })
    }
}
