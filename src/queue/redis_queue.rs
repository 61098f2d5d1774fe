//! Redis-backed player queue with connection retry

use crate::error::{MatchmakingError, MatchmakingResult};
use crate::queue::messages::EntryCodec;
use crate::queue::PlayerQueue;
use crate::types::Player;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// Configuration for the Redis queue connection
#[derive(Debug, Clone)]
pub struct RedisQueueConfig {
    pub url: String,
    pub queue_key: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub connection_timeout_ms: u64,
}

impl Default for RedisQueueConfig {
    fn default() -> Self {
        Self {
            url: "redis://redis:6379".to_string(),
            queue_key: super::MATCH_QUEUE_KEY.to_string(),
            max_retries: 5,
            retry_delay_ms: 1000,
            connection_timeout_ms: 5000,
        }
    }
}

/// Player queue stored in a Redis list (LPUSH in, RPOP out)
#[derive(Clone)]
pub struct RedisPlayerQueue {
    connection: ConnectionManager,
    queue_key: String,
}

impl RedisPlayerQueue {
    /// Connect to Redis, retrying with exponential backoff
    pub async fn connect(config: RedisQueueConfig) -> MatchmakingResult<Self> {
        let connection = Self::connect_with_retry(&config).await?;

        Ok(Self {
            connection,
            queue_key: config.queue_key,
        })
    }

    async fn connect_with_retry(config: &RedisQueueConfig) -> MatchmakingResult<ConnectionManager> {
        let mut retry_count = 0;
        let mut delay = Duration::from_millis(config.retry_delay_ms);

        loop {
            match Self::try_connect(config).await {
                Ok(connection) => {
                    info!(url = %config.url, "Connected to Redis queue");
                    return Ok(connection);
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > config.max_retries {
                        error!(
                            "Failed to connect to Redis after {} retries",
                            config.max_retries
                        );
                        return Err(MatchmakingError::QueueUnavailable {
                            message: format!("Max retries exceeded: {}", e),
                        });
                    }

                    warn!(
                        "Redis connection attempt {} failed: {}. Retrying in {:?}",
                        retry_count, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(30000));
                }
            }
        }
    }

    async fn try_connect(config: &RedisQueueConfig) -> MatchmakingResult<ConnectionManager> {
        let client = redis::Client::open(config.url.as_str()).map_err(|e| {
            MatchmakingError::ConfigurationError {
                message: format!("Invalid Redis URL '{}': {}", config.url, e),
            }
        })?;

        let limit = Duration::from_millis(config.connection_timeout_ms);
        timeout(limit, ConnectionManager::new(client))
            .await
            .map_err(|_| MatchmakingError::Timeout(limit))?
            .map_err(MatchmakingError::from)
    }

    /// Key of the Redis list this queue reads and writes
    pub fn queue_key(&self) -> &str {
        &self.queue_key
    }

    /// Remove every waiting entry
    pub async fn clear(&self) -> MatchmakingResult<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.del(&self.queue_key).await?;
        Ok(())
    }
}

#[async_trait]
impl PlayerQueue for RedisPlayerQueue {
    async fn enqueue(&self, player: &Player) -> MatchmakingResult<()> {
        let payload = EntryCodec::encode(player)?;
        let mut conn = self.connection.clone();

        let depth: usize = conn.lpush(&self.queue_key, payload).await?;
        debug!(user_id = %player.user_id, depth, "Player enqueued");
        Ok(())
    }

    async fn dequeue(&self) -> MatchmakingResult<Option<Player>> {
        let mut conn = self.connection.clone();
        let payload: Option<String> = conn.rpop(&self.queue_key, None).await?;

        match payload {
            Some(payload) => EntryCodec::decode(&payload).map(Some),
            None => Ok(None),
        }
    }

    async fn len(&self) -> MatchmakingResult<usize> {
        let mut conn = self.connection.clone();
        let depth: usize = conn.llen(&self.queue_key).await?;
        Ok(depth)
    }
}
