//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the Redis queue,
//! the Postgres store, metrics and the matchmaking loop, and owns the
//! background tasks.

use crate::config::AppConfig;
use crate::matchmaker::{LoopSettings, Matchmaker, MatchmakerStats, WaitingPool};
use crate::metrics::{HealthServer, HealthServerConfig, MetricsCollector, MetricsService};
use crate::persistence::postgres::PostgresConfig;
use crate::persistence::{MatchPersister, MatchStore, PostgresMatchStore};
use crate::queue::{PlayerQueue, RedisPlayerQueue, RedisQueueConfig};
use crate::service::health::HealthContext;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Queue connection error: {message}")]
    QueueConnection { message: String },

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// The single consumer of the player queue
    matchmaker: Matchmaker,

    /// Metrics service for monitoring and health checks
    metrics_service: Arc<MetricsService>,

    health: HealthContext,

    /// Stops the matchmaking loop
    cancel: CancellationToken,

    loop_task: Mutex<Option<JoinHandle<WaitingPool>>>,

    /// Background task handles
    background_tasks: Mutex<Vec<JoinHandle<()>>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Connect to Redis and Postgres and build the service
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing arena matchmaking worker");
        info!(
            service = %config.service.name,
            redis_url = %config.queue.url,
            queue_key = %config.queue.queue_key,
            "Configuration loaded"
        );

        let queue = Self::initialize_queue(&config).await?;
        let store = Self::initialize_store(&config)?;

        Self::from_parts(config, queue, store)
    }

    /// Build the service around already-constructed queue and store
    pub fn from_parts(
        config: AppConfig,
        queue: Arc<dyn PlayerQueue>,
        store: Arc<dyn MatchStore>,
    ) -> Result<Self, ServiceError> {
        let collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let settings = LoopSettings {
            poll_interval: config.poll_interval(),
            error_backoff: config.error_backoff(),
            operation_timeout: config.operation_timeout(),
        };
        let matchmaker = Matchmaker::with_metrics(
            queue,
            MatchPersister::new(store),
            settings,
            collector.clone(),
        );

        let is_running = Arc::new(RwLock::new(false));
        let health = HealthContext::new(
            config.service.name.clone(),
            matchmaker.clone(),
            is_running.clone(),
        );

        let health_server = HealthServer::new(
            HealthServerConfig {
                port: config.service.metrics_port,
                host: "0.0.0.0".to_string(),
            },
            collector.clone(),
        )
        .with_health_context(health.clone());
        let metrics_service = Arc::new(MetricsService::new(collector, Arc::new(health_server)));

        Ok(Self {
            config,
            matchmaker,
            metrics_service,
            health,
            cancel: CancellationToken::new(),
            loop_task: Mutex::new(None),
            background_tasks: Mutex::new(Vec::new()),
            is_running,
        })
    }

    /// Start the metrics endpoint and the matchmaking loop
    pub async fn start(&self) -> Result<(), ServiceError> {
        info!("Starting arena matchmaking worker");

        let mut loop_task = self.loop_task.lock().await;
        if loop_task.is_some() {
            return Err(ServiceError::BackgroundTask {
                message: "Matchmaking loop already started".to_string(),
            });
        }

        *self.is_running.write().await = true;

        self.start_metrics_service().await;

        let matchmaker = self.matchmaker.clone();
        let cancel = self.cancel.clone();
        *loop_task = Some(tokio::spawn(async move { matchmaker.run(cancel).await }));

        info!("✅ Arena matchmaking worker started successfully");
        Ok(())
    }

    /// Stop the loop, then the metrics endpoint. Returns the final statistics.
    pub async fn shutdown(&self) -> Result<MatchmakerStats, ServiceError> {
        info!("Starting graceful shutdown of arena matchmaking worker");

        *self.is_running.write().await = false;
        self.cancel.cancel();

        let handle = self.loop_task.lock().await.take();
        if let Some(mut handle) = handle {
            match tokio::time::timeout(self.config.shutdown_timeout(), &mut handle).await {
                Ok(Ok(pool)) => Self::report_leftover(pool),
                Ok(Err(e)) => {
                    error!(error = %e, "Matchmaking loop task failed");
                    return Err(ServiceError::BackgroundTask {
                        message: format!("Matchmaking loop task failed: {}", e),
                    });
                }
                Err(_) => {
                    warn!(
                        timeout_seconds = self.config.service.shutdown_timeout_seconds,
                        "Matchmaking loop did not stop in time, aborting"
                    );
                    handle.abort();
                }
            }
        }

        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        }
        self.stop_background_tasks().await;

        let final_stats = self.matchmaker.get_stats();
        info!(?final_stats, "✅ Arena matchmaking worker shutdown completed");
        Ok(final_stats)
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn matchmaker(&self) -> &Matchmaker {
        &self.matchmaker
    }

    /// Get metrics service
    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    pub fn health_context(&self) -> &HealthContext {
        &self.health
    }

    async fn initialize_queue(config: &AppConfig) -> Result<Arc<dyn PlayerQueue>, ServiceError> {
        info!("Connecting to Redis queue: {}", config.queue.url);

        let queue = RedisPlayerQueue::connect(RedisQueueConfig {
            url: config.queue.url.clone(),
            queue_key: config.queue.queue_key.clone(),
            max_retries: config.queue.max_retry_attempts,
            retry_delay_ms: config.queue.retry_delay_ms,
            connection_timeout_ms: config.queue.connection_timeout_ms,
        })
        .await
        .map_err(|e| ServiceError::QueueConnection {
            message: format!("Failed to connect to Redis: {}", e),
        })?;

        Ok(Arc::new(queue))
    }

    fn initialize_store(config: &AppConfig) -> Result<Arc<dyn MatchStore>, ServiceError> {
        let url = config
            .database_url()
            .map_err(|e| ServiceError::Configuration {
                message: e.to_string(),
            })?;

        let store = PostgresMatchStore::connect_lazy(&PostgresConfig {
            url: url.to_string(),
            max_connections: config.database.max_connections,
            acquire_timeout: config.db_acquire_timeout(),
        })
        .map_err(|e| ServiceError::DatabaseConnection {
            message: e.to_string(),
        })?;

        Ok(Arc::new(store))
    }

    async fn start_metrics_service(&self) {
        let metrics_service = self.metrics_service.clone();
        let port = self.config.service.metrics_port;

        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            } else {
                info!("Metrics service task completed");
            }
        });

        self.background_tasks.lock().await.push(metrics_handle);
        info!("Metrics and health endpoints starting on port {}", port);
    }

    async fn stop_background_tasks(&self) {
        let tasks: Vec<_> = self.background_tasks.lock().await.drain(..).collect();
        info!("Stopping {} background tasks", tasks.len());

        for task in tasks {
            if !task.is_finished() {
                task.abort();
            }
        }
    }

    /// Players still waiting at shutdown are not returned to the queue
    fn report_leftover(pool: WaitingPool) {
        if pool.is_empty() {
            info!("Matchmaking loop stopped with an empty waiting pool");
            return;
        }

        let users: Vec<String> = pool.into_players().into_iter().map(|p| p.user_id).collect();
        warn!(
            waiting_count = users.len(),
            ?users,
            "Players left in the waiting pool at shutdown are discarded"
        );
    }
}
