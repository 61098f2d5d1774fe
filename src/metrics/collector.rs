//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the matchmaking worker
//! using Prometheus metrics.

use crate::matchmaker::MatchmakerStats;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};
use std::sync::Arc;
use std::time::Duration;

/// Main metrics collector for the matchmaking service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Queue-related metrics
    queue_metrics: QueueMetrics,

    /// Match-related metrics
    match_metrics: MatchMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Queue-related metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Players taken off the queue
    pub players_dequeued_total: IntCounter,

    /// Entries dropped because they could not be decoded
    pub malformed_entries_total: IntCounter,

    /// Queue operations that failed, by operation
    pub queue_errors_total: IntCounterVec,

    /// Players currently in the waiting pool
    pub players_waiting: IntGauge,
}

/// Match-related metrics
#[derive(Clone)]
pub struct MatchMetrics {
    /// Matches committed
    pub matches_created_total: IntCounter,

    /// Reserved batches discarded after a failed persist
    pub batches_dropped_total: IntCounter,

    /// Average elo of the most recent match
    pub last_average_elo: IntGauge,

    /// Match transaction duration
    pub persist_duration: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let match_metrics = MatchMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            match_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    pub fn matches(&self) -> &MatchMetrics {
        &self.match_metrics
    }

    /// Record a player moving from the queue into the waiting pool
    pub fn record_player_dequeued(&self, players_waiting: usize) {
        self.queue_metrics.players_dequeued_total.inc();
        self.queue_metrics
            .players_waiting
            .set(players_waiting as i64);
    }

    pub fn record_malformed_entry(&self) {
        self.queue_metrics.malformed_entries_total.inc();
    }

    /// Record a failed queue operation
    pub fn record_queue_error(&self, operation: &str) {
        self.queue_metrics
            .queue_errors_total
            .with_label_values(&[operation])
            .inc();
    }

    /// Record the outcome of a match transaction
    pub fn record_persist(&self, success: bool, average_elo: i32, duration: Duration) {
        if success {
            self.match_metrics.matches_created_total.inc();
            self.match_metrics.last_average_elo.set(average_elo as i64);
        } else {
            self.match_metrics.batches_dropped_total.inc();
        }

        self.match_metrics
            .persist_duration
            .observe(duration.as_secs_f64());
    }

    /// Refresh gauges from a loop statistics snapshot
    pub fn update_from_stats(&self, stats: &MatchmakerStats) {
        self.queue_metrics
            .players_waiting
            .set(stats.players_waiting as i64);
    }

    pub fn update_uptime(&self, uptime: Duration) {
        self.service_metrics
            .uptime_seconds
            .set(uptime.as_secs() as i64);
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("arena_matchmaker_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "arena_matchmaker_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new(
                "arena_matchmaker_component_health",
                "Component health status",
            ),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            component_health,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let players_dequeued_total = IntCounter::new(
            "arena_matchmaker_players_dequeued_total",
            "Players taken off the queue",
        )?;
        registry.register(Box::new(players_dequeued_total.clone()))?;

        let malformed_entries_total = IntCounter::new(
            "arena_matchmaker_malformed_entries_total",
            "Queue entries dropped as undecodable",
        )?;
        registry.register(Box::new(malformed_entries_total.clone()))?;

        let queue_errors_total = IntCounterVec::new(
            Opts::new(
                "arena_matchmaker_queue_errors_total",
                "Failed queue operations",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(queue_errors_total.clone()))?;

        let players_waiting = IntGauge::new(
            "arena_matchmaker_players_waiting",
            "Players in the waiting pool",
        )?;
        registry.register(Box::new(players_waiting.clone()))?;

        Ok(Self {
            players_dequeued_total,
            malformed_entries_total,
            queue_errors_total,
            players_waiting,
        })
    }
}

impl MatchMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let matches_created_total = IntCounter::new(
            "arena_matchmaker_matches_created_total",
            "Matches committed with a full roster",
        )?;
        registry.register(Box::new(matches_created_total.clone()))?;

        let batches_dropped_total = IntCounter::new(
            "arena_matchmaker_batches_dropped_total",
            "Reserved batches discarded after a failed persist",
        )?;
        registry.register(Box::new(batches_dropped_total.clone()))?;

        let last_average_elo = IntGauge::new(
            "arena_matchmaker_last_average_elo",
            "Average elo of the most recent match",
        )?;
        registry.register(Box::new(last_average_elo.clone()))?;

        let persist_duration = Histogram::with_opts(
            HistogramOpts::new(
                "arena_matchmaker_persist_duration_seconds",
                "Match transaction duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(persist_duration.clone()))?;

        Ok(Self {
            matches_created_total,
            batches_dropped_total,
            last_average_elo,
            persist_duration,
        })
    }
}
