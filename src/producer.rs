//! Fake player generation for load and smoke testing
//!
//! Producers push players onto the shared queue; the worker never calls
//! anything in here.

use crate::error::MatchmakingResult;
use crate::queue::PlayerQueue;
use crate::types::{Player, MATCH_SIZE};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use std::ops::Range;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Regions fake players are drawn from
pub const REGIONS: [&str; 4] = ["NA", "EU", "AUS", "ASIA"];

pub const ELO_MEAN: f64 = 1500.0;
pub const ELO_STD_DEV: f64 = 300.0;
pub const MIN_ELO: i32 = 800;
pub const MAX_ELO: i32 = 2800;

/// Delay between players in continuous mode, in milliseconds
pub const ENQUEUE_DELAY_MS: Range<u64> = 500..2000;

/// Random player generator
pub struct PlayerGenerator<R: Rng> {
    rng: R,
}

impl PlayerGenerator<StdRng> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl Default for PlayerGenerator<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> PlayerGenerator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// A new player with a random id, elo and region, queued now
    pub fn next_player(&mut self) -> Player {
        let z: f64 = StandardNormal.sample(&mut self.rng);
        let elo = ((ELO_MEAN + ELO_STD_DEV * z) as i32).clamp(MIN_ELO, MAX_ELO);
        let region = REGIONS
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(REGIONS[0]);

        Player {
            user_id: Uuid::new_v4().to_string(),
            elo,
            region: region.to_string(),
            queued_at: Utc::now(),
        }
    }

    /// Random pause between two pushes in continuous mode
    pub fn next_delay(&mut self) -> Duration {
        Duration::from_millis(self.rng.gen_range(ENQUEUE_DELAY_MS))
    }
}

/// Ten NA players with elos 1000, 1010, ... 1090, in queue order
pub fn reference_scenario() -> Vec<Player> {
    (0..MATCH_SIZE)
        .map(|i| Player {
            user_id: format!("scenario-{}", i + 1),
            elo: 1000 + 10 * i as i32,
            region: "NA".to_string(),
            queued_at: Utc::now(),
        })
        .collect()
}

/// Push `players` in order
pub async fn enqueue_all(queue: &dyn PlayerQueue, players: &[Player]) -> MatchmakingResult<()> {
    for player in players {
        queue.enqueue(player).await?;
        info!(user_id = %player.user_id, elo = player.elo, region = %player.region, "Queued player");
    }
    Ok(())
}

/// Push `count` random players back to back
pub async fn enqueue_random<R: Rng>(
    queue: &dyn PlayerQueue,
    generator: &mut PlayerGenerator<R>,
    count: usize,
) -> MatchmakingResult<Vec<Player>> {
    let players: Vec<Player> = (0..count).map(|_| generator.next_player()).collect();
    enqueue_all(queue, &players).await?;
    Ok(players)
}

/// Push random players with a random delay until cancelled.
/// Failed pushes are logged and skipped. Returns how many were queued.
pub async fn run_continuous<R: Rng>(
    queue: &dyn PlayerQueue,
    generator: &mut PlayerGenerator<R>,
    cancel: CancellationToken,
) -> usize {
    let mut queued = 0;

    while !cancel.is_cancelled() {
        let player = generator.next_player();
        match queue.enqueue(&player).await {
            Ok(()) => {
                queued += 1;
                info!(user_id = %player.user_id, elo = player.elo, region = %player.region, "Queued player");
            }
            Err(e) => warn!(error = %e, "Failed to queue player"),
        }

        let delay = generator.next_delay();
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    queued
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryPlayerQueue;

    #[test]
    fn test_generated_players_within_bounds() {
        let mut generator = PlayerGenerator::with_rng(StdRng::seed_from_u64(7));

        for _ in 0..1000 {
            let player = generator.next_player();
            assert!((MIN_ELO..=MAX_ELO).contains(&player.elo));
            assert!(REGIONS.contains(&player.region.as_str()));
            assert!(Uuid::parse_str(&player.user_id).is_ok());
        }
    }

    #[test]
    fn test_generated_elos_centre_on_mean() {
        let mut generator = PlayerGenerator::with_rng(StdRng::seed_from_u64(42));
        let total: i64 = (0..5000).map(|_| generator.next_player().elo as i64).sum();
        let mean = total / 5000;
        assert!((1450..=1550).contains(&mean), "mean was {}", mean);
    }

    #[test]
    fn test_delay_range() {
        let mut generator = PlayerGenerator::with_rng(StdRng::seed_from_u64(1));
        for _ in 0..100 {
            let delay = generator.next_delay();
            assert!(delay >= Duration::from_millis(500) && delay < Duration::from_secs(2));
        }
    }

    #[test]
    fn test_reference_scenario() {
        let players = reference_scenario();
        assert_eq!(players.len(), MATCH_SIZE);
        assert_eq!(players[0].elo, 1000);
        assert_eq!(players[9].elo, 1090);
        assert!(players.iter().all(|p| p.region == "NA"));
    }

    #[tokio::test]
    async fn test_enqueue_random_pushes_in_order() {
        let queue = InMemoryPlayerQueue::new();
        let mut generator = PlayerGenerator::with_rng(StdRng::seed_from_u64(3));

        let pushed = enqueue_random(&queue, &mut generator, 4).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 4);

        let first = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(first.user_id, pushed[0].user_id);
    }

    #[tokio::test]
    async fn test_continuous_stops_when_cancelled() {
        let queue = InMemoryPlayerQueue::new();
        let mut generator = PlayerGenerator::with_rng(StdRng::seed_from_u64(9));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let queued = run_continuous(&queue, &mut generator, cancel).await;
        assert_eq!(queued, 0);
    }
}
