//! Main entry point for the arena matchmaking worker
//!
//! Initializes logging and configuration, connects to Redis and Postgres,
//! runs the matchmaking loop and shuts it down gracefully on SIGINT or
//! SIGTERM.

use anyhow::Result;
use arena_matchmaker::config::{normalize_redis_url, validate_config, AppConfig};
use arena_matchmaker::service::{AppState, HealthCheck, HealthStatus};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info, warn};

/// Arena Matchmaker - queue-driven 5v5 match formation
#[derive(Parser)]
#[command(
    name = "arena-matchmaker",
    version,
    about = "A matchmaking worker that forms 5v5 matches from a Redis queue",
    long_about = "Arena Matchmaker pops players from a shared Redis list, groups them in \
                 arrival order into red and blue teams of five, and records each match \
                 with its roster in Postgres in a single transaction."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Perform health check and exit
    #[arg(long, help = "Check queue and database connectivity and exit with status code")]
    health_check: bool,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Redis URL override
    #[arg(long, value_name = "URL", help = "Override Redis connection URL")]
    redis_url: Option<String>,

    /// Database URL override
    #[arg(long, value_name = "URL", help = "Override Postgres connection string")]
    database_url: Option<String>,

    /// Metrics port override
    #[arg(long, value_name = "PORT", help = "Override metrics server port")]
    metrics_port: Option<u16>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Probe the external stores once and exit with the result
async fn perform_health_check(config: AppConfig) -> Result<()> {
    info!("Performing health check...");

    let app_state = AppState::new(config).await?;

    match HealthCheck::readiness_check(app_state.health_context()).await {
        Ok(HealthStatus::Healthy) => {
            println!("Health Check: {}", HealthStatus::Healthy);
            std::process::exit(0);
        }
        Ok(status) => {
            println!("Health Check: {}", status);
            std::process::exit(1);
        }
        Err(e) => {
            error!("Health check failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Run periodic health checks and publish the result as metrics
async fn health_check_task(app_state: Arc<AppState>) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    let collector = app_state.metrics_service().collector();

    while app_state.is_running().await {
        interval.tick().await;

        match HealthCheck::check(app_state.health_context()).await {
            Ok(health) => {
                collector.update_health_status(health.status.as_gauge());
                for check in &health.checks {
                    collector.update_component_health(
                        &check.name,
                        check.status == HealthStatus::Healthy,
                    );
                }
                collector.update_from_stats(&health.stats.loop_stats);
                collector.update_uptime(Duration::from_secs(health.stats.uptime_seconds));

                info!(
                    "Health check: {} - {} matches created, {} players waiting",
                    health.status,
                    health.stats.loop_stats.matches_created,
                    health.stats.loop_stats.players_waiting
                );
            }
            Err(e) => {
                warn!("Health check failed: {}", e);
            }
        }
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("🚀 Arena Matchmaking Worker");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Metrics port: {}", config.service.metrics_port);
    info!("   Redis: {} (key '{}')", config.queue.url, config.queue.queue_key);
    info!(
        "   Poll interval: {}ms, error backoff: {}ms",
        config.matchmaking.poll_interval_ms, config.matchmaking.error_backoff_ms
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Load and merge configuration from file, environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::default()
    };

    config.apply_env()?;

    // Apply CLI overrides
    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(redis_url) = &args.redis_url {
        config.queue.url = normalize_redis_url(redis_url);
    }

    if let Some(database_url) = &args.database_url {
        config.database.url = Some(database_url.clone());
    }

    if let Some(metrics_port) = args.metrics_port {
        config.service.metrics_port = metrics_port;
    }

    validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // A missing DB_CONN ends the process here with exit status 1
    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Some(config_path) = &args.config {
        info!("Loaded configuration from: {}", config_path.display());
    }

    if args.health_check {
        return perform_health_check(config).await;
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    display_startup_banner(&config);

    info!("Initializing service components...");
    let app_state = match AppState::new(config).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting service...");
    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    let health_task = {
        let app_state = app_state.clone();
        tokio::spawn(async move {
            health_check_task(app_state).await;
        })
    };

    info!("✅ Arena Matchmaking Worker is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    wait_for_shutdown_signal().await;

    info!("🛑 Shutdown signal received, beginning graceful shutdown...");
    health_task.abort();

    match app_state.shutdown().await {
        Ok(stats) => {
            info!(
                matches_created = stats.matches_created,
                batches_dropped = stats.batches_dropped,
                "✅ Graceful shutdown completed successfully"
            );
        }
        Err(e) => {
            warn!("⚠️  Shutdown finished with errors: {}", e);
        }
    }

    info!("🛑 Arena Matchmaking Worker stopped");
    Ok(())
}
