//! Test fixtures for integration testing
//!
//! Builds a matchmaker over the in-memory queue and store with short
//! intervals, plus helpers for queueing players and driving the loop.

#![allow(dead_code)]

use arena_matchmaker::matchmaker::{LoopSettings, Matchmaker, StepOutcome, WaitingPool};
use arena_matchmaker::persistence::{InMemoryMatchStore, MatchPersister};
use arena_matchmaker::queue::{InMemoryPlayerQueue, PlayerQueue};
use arena_matchmaker::types::Player;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A matchmaker wired to in-memory collaborators that tests can inspect
pub struct TestHarness {
    pub queue: Arc<InMemoryPlayerQueue>,
    pub store: InMemoryMatchStore,
    pub matchmaker: Matchmaker,
}

impl TestHarness {
    pub fn new() -> Self {
        let queue = Arc::new(InMemoryPlayerQueue::new());
        let store = InMemoryMatchStore::new();
        let settings = LoopSettings {
            poll_interval: POLL_INTERVAL,
            error_backoff: POLL_INTERVAL,
            operation_timeout: Duration::from_secs(1),
        };
        let matchmaker = Matchmaker::new(
            queue.clone(),
            MatchPersister::new(Arc::new(store.clone())),
            settings,
        );

        Self {
            queue,
            store,
            matchmaker,
        }
    }

    /// Push players in order
    pub async fn enqueue(&self, players: &[Player]) {
        for player in players {
            self.queue
                .enqueue(player)
                .await
                .expect("in-memory enqueue failed");
        }
    }

    /// Step until the queue reports empty, returning every outcome
    pub async fn drain(&self, pool: &mut WaitingPool) -> Vec<StepOutcome> {
        let mut outcomes = Vec::new();
        loop {
            let outcome = self.matchmaker.step(pool).await;
            if matches!(outcome, StepOutcome::Idle) {
                return outcomes;
            }
            outcomes.push(outcome);
        }
    }

    /// Run the loop on a background task
    pub fn spawn(&self) -> (CancellationToken, JoinHandle<WaitingPool>) {
        let cancel = CancellationToken::new();
        let matchmaker = self.matchmaker.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { matchmaker.run(token).await });
        (cancel, handle)
    }

    /// Poll until `condition` holds or the deadline passes
    pub async fn wait_for(&self, deadline: Duration, condition: impl Fn(&Self) -> bool) -> bool {
        let started = tokio::time::Instant::now();
        while started.elapsed() < deadline {
            if condition(self) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        condition(self)
    }
}

pub fn player(id: &str, elo: i32, region: &str) -> Player {
    Player {
        user_id: id.to_string(),
        elo,
        region: region.to_string(),
        queued_at: Utc::now(),
    }
}

/// `count` players named `{prefix}-{i}` with elo 1000 + 10 * i
pub fn numbered_players(prefix: &str, count: usize, region: &str) -> Vec<Player> {
    (0..count)
        .map(|i| player(&format!("{}-{}", prefix, i), 1000 + 10 * i as i32, region))
        .collect()
}

pub fn match_ids(outcomes: &[StepOutcome]) -> Vec<uuid::Uuid> {
    outcomes
        .iter()
        .filter_map(|o| match o {
            StepOutcome::MatchCreated { match_id, .. } => Some(*match_id),
            _ => None,
        })
        .collect()
}
