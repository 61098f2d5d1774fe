//! Queue Producer CLI Tool
//!
//! Pushes fake players onto the matchmaking queue in Redis.
//!
//! Usage:
//!   cargo run --bin queue-producer -- --help
//!   cargo run --bin queue-producer generate --count 25
//!   cargo run --bin queue-producer generate            # runs until Ctrl+C
//!   cargo run --bin queue-producer enqueue --id alice --elo 1400 --region EU
//!   cargo run --bin queue-producer scenario
//!   cargo run --bin queue-producer depth

use anyhow::Result;
use arena_matchmaker::config::normalize_redis_url;
use arena_matchmaker::producer::{self, PlayerGenerator};
use arena_matchmaker::queue::{PlayerQueue, RedisPlayerQueue, RedisQueueConfig, MATCH_QUEUE_KEY};
use arena_matchmaker::types::Player;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "queue-producer")]
#[command(about = "Push fake players onto the arena matchmaking queue")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Redis address, as a URL or bare host:port
    #[arg(long, env = "REDIS_CONN", default_value = "redis:6379")]
    redis_url: String,

    /// Redis list players are pushed onto
    #[arg(long, env = "MATCH_QUEUE_KEY", default_value = MATCH_QUEUE_KEY)]
    queue_key: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue one player with explicit attributes
    Enqueue {
        /// Player ID
        #[arg(short, long)]
        id: String,
        /// Player elo
        #[arg(short, long, default_value = "1500")]
        elo: i32,
        /// Region code
        #[arg(short, long, default_value = "NA")]
        region: String,
    },
    /// Queue random players; runs until interrupted when no count is given
    Generate {
        /// Number of players to push back to back
        #[arg(short, long)]
        count: Option<usize>,
    },
    /// Queue ten NA players with elos 1000 to 1090
    Scenario,
    /// Print the number of entries waiting in the queue
    Depth,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let url = normalize_redis_url(&cli.redis_url);

    println!("🔌 Connecting to Redis at: {}", url);

    let queue = match RedisPlayerQueue::connect(RedisQueueConfig {
        url,
        queue_key: cli.queue_key,
        max_retries: 3,
        ..RedisQueueConfig::default()
    })
    .await
    {
        Ok(q) => {
            println!("✅ Connected to Redis successfully!");
            q
        }
        Err(e) => {
            eprintln!("❌ Failed to connect to Redis: {}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Enqueue { id, elo, region } => {
            let player = Player {
                user_id: id,
                elo,
                region,
                queued_at: Utc::now(),
            };
            match queue.enqueue(&player).await {
                Ok(()) => println!("✅ Queued '{}' ({} elo, {})", player.user_id, player.elo, player.region),
                Err(e) => {
                    eprintln!("❌ Failed to queue '{}': {}", player.user_id, e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Generate { count: Some(count) } => {
            let mut generator = PlayerGenerator::new();
            let players = producer::enqueue_random(&queue, &mut generator, count).await?;
            println!("✅ Queued {} random players", players.len());
        }

        Commands::Generate { count: None } => {
            let cancel = CancellationToken::new();
            let stop = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    stop.cancel();
                }
            });

            println!("🎲 Queueing random players, press Ctrl+C to stop...");
            let mut generator = PlayerGenerator::new();
            let queued = producer::run_continuous(&queue, &mut generator, cancel).await;
            println!("🛑 Stopped after queueing {} players", queued);
        }

        Commands::Scenario => {
            let players = producer::reference_scenario();
            producer::enqueue_all(&queue, &players).await?;
            println!(
                "✅ Queued {} scenario players; expect one NA match with average elo 1045",
                players.len()
            );
        }

        Commands::Depth => {
            let depth = queue.len().await?;
            println!("📊 {} entries waiting in '{}'", depth, queue.queue_key());
        }
    }

    Ok(())
}
