//! Health check aggregation
//!
//! This module provides health check functionality for the matchmaking
//! worker, including readiness and liveness probes.

use crate::matchmaker::{Matchmaker, MatchmakerStats};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Deadline for a single dependency probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Numeric form exported as a gauge
    pub fn as_gauge(&self) -> u8 {
        match self {
            HealthStatus::Unhealthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Healthy => 2,
        }
    }

    fn worst(self, other: HealthStatus) -> HealthStatus {
        if self.as_gauge() <= other.as_gauge() {
            self
        } else {
            other
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Everything a health probe needs, detached from the owning `AppState`
#[derive(Clone)]
pub struct HealthContext {
    service_name: String,
    matchmaker: Matchmaker,
    is_running: Arc<RwLock<bool>>,
    started_at: Instant,
}

impl HealthContext {
    pub fn new(service_name: String, matchmaker: Matchmaker, is_running: Arc<RwLock<bool>>) -> Self {
        Self {
            service_name,
            matchmaker,
            is_running,
            started_at: Instant::now(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn matchmaker(&self) -> &Matchmaker {
        &self.matchmaker
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Optional error message if unhealthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    pub loop_stats: MatchmakerStats,
    /// Entries waiting in the shared queue, if it could be read
    pub queue_depth: Option<usize>,
    pub uptime_seconds: u64,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(ctx: &HealthContext) -> Result<Self> {
        let mut checks = Vec::new();

        checks.push(Self::check_service_running(ctx).await);
        checks.push(Self::check_matchmaking_loop(ctx));
        let (queue_check, queue_depth) = Self::check_queue(ctx).await;
        checks.push(queue_check);
        checks.push(Self::check_store(ctx).await);

        let status = checks
            .iter()
            .fold(HealthStatus::Healthy, |acc, check| acc.worst(check.status));

        Ok(HealthCheck {
            status,
            service: ctx.service_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats: ServiceStats {
                loop_stats: ctx.matchmaker.get_stats(),
                queue_depth,
                uptime_seconds: ctx.uptime().as_secs(),
            },
        })
    }

    /// Simple liveness check - the service is running and its loop is alive
    pub async fn liveness_check(ctx: &HealthContext) -> Result<HealthStatus> {
        if ctx.is_running().await && ctx.matchmaker.get_stats().loop_running {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - the loop can reach both external stores
    pub async fn readiness_check(ctx: &HealthContext) -> Result<HealthStatus> {
        if !ctx.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        let (queue_check, _) = Self::check_queue(ctx).await;
        let store_check = Self::check_store(ctx).await;
        Ok(queue_check.status.worst(store_check.status))
    }

    async fn check_service_running(ctx: &HealthContext) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = if ctx.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn check_matchmaking_loop(ctx: &HealthContext) -> ComponentCheck {
        let (status, message) = if ctx.matchmaker.get_stats().loop_running {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Matchmaking loop is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "matchmaking_loop".to_string(),
            status,
            message,
            duration_ms: 0,
        }
    }

    /// A queue outage only degrades the service; the loop keeps retrying
    async fn check_queue(ctx: &HealthContext) -> (ComponentCheck, Option<usize>) {
        let start = Instant::now();
        let queue = ctx.matchmaker.queue();

        let (status, message, depth) = match probe(queue.len()).await {
            Ok(depth) => (HealthStatus::Healthy, None, Some(depth)),
            Err(message) => {
                debug!(%message, "Queue probe failed");
                (HealthStatus::Degraded, Some(message), None)
            }
        };

        let check = ComponentCheck {
            name: "queue".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        (check, depth)
    }

    async fn check_store(ctx: &HealthContext) -> ComponentCheck {
        let start = Instant::now();
        let store = ctx.matchmaker.persister().store();

        let (status, message) = match probe(store.ping()).await {
            Ok(()) => (HealthStatus::Healthy, None),
            Err(message) => {
                debug!(%message, "Match store probe failed");
                (HealthStatus::Degraded, Some(message))
            }
        };

        ComponentCheck {
            name: "match_store".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}

async fn probe<T, E: std::fmt::Display>(
    op: impl Future<Output = std::result::Result<T, E>>,
) -> std::result::Result<T, String> {
    match tokio::time::timeout(PROBE_TIMEOUT, op).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("Probe timed out after {:?}", PROBE_TIMEOUT)),
    }
}

/// Convert health check to JSON string
impl HealthCheck {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
