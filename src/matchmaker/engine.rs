//! The matchmaking loop
//!
//! Each iteration checks the cancellation token, pulls at most one player
//! off the queue into the waiting pool and, once ten players are waiting,
//! reserves them, forms teams and persists the match.
//!
//! A reserved batch is removed from the pool before persistence is
//! attempted. When persistence fails the batch is dropped, not returned to
//! the pool or the queue.

use super::pool::WaitingPool;
use super::teams::form_teams;
use crate::error::{MatchmakingError, MatchmakingResult};
use crate::metrics::MetricsCollector;
use crate::persistence::MatchPersister;
use crate::queue::PlayerQueue;
use crate::types::{FormedMatch, MatchId, Player};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Timing knobs for the loop
#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Pause after finding the queue empty
    pub poll_interval: Duration,
    /// Pause after a transient queue failure
    pub error_backoff: Duration,
    /// Deadline for a single dequeue or persist call
    pub operation_timeout: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            error_backoff: Duration::from_secs(1),
            operation_timeout: Duration::from_secs(5),
        }
    }
}

/// What a single loop iteration did
#[derive(Debug)]
pub enum StepOutcome {
    /// Queue was empty
    Idle,
    /// Queue could not be reached
    QueueFailed(MatchmakingError),
    /// An undecodable entry was consumed and dropped
    MalformedDropped,
    /// Player joined the pool; not enough for a match yet
    Queued { waiting: usize },
    /// A batch was reserved and committed as a match
    MatchCreated {
        match_id: MatchId,
        formed: FormedMatch,
    },
    /// A batch was reserved but persistence failed; the players are gone
    BatchDropped {
        formed: FormedMatch,
        error: MatchmakingError,
    },
}

/// Snapshot of loop counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchmakerStats {
    pub players_dequeued: u64,
    pub malformed_entries: u64,
    pub queue_errors: u64,
    pub matches_created: u64,
    pub players_matched: u64,
    pub batches_dropped: u64,
    pub players_dropped: u64,
    pub dequeue_timeouts: u64,
    pub persist_timeouts: u64,
    pub players_waiting: usize,
    pub loop_running: bool,
}

#[derive(Debug, Default)]
struct StatsCounters {
    players_dequeued: AtomicU64,
    malformed_entries: AtomicU64,
    queue_errors: AtomicU64,
    matches_created: AtomicU64,
    players_matched: AtomicU64,
    batches_dropped: AtomicU64,
    players_dropped: AtomicU64,
    dequeue_timeouts: AtomicU64,
    persist_timeouts: AtomicU64,
    players_waiting: AtomicUsize,
    loop_running: AtomicBool,
}

/// Single-consumer matchmaking engine
#[derive(Clone)]
pub struct Matchmaker {
    queue: Arc<dyn PlayerQueue>,
    persister: MatchPersister,
    settings: LoopSettings,
    counters: Arc<StatsCounters>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Matchmaker {
    pub fn new(queue: Arc<dyn PlayerQueue>, persister: MatchPersister, settings: LoopSettings) -> Self {
        Self {
            queue,
            persister,
            settings,
            counters: Arc::new(StatsCounters::default()),
            metrics: None,
        }
    }

    /// Create a matchmaker that also reports to Prometheus
    pub fn with_metrics(
        queue: Arc<dyn PlayerQueue>,
        persister: MatchPersister,
        settings: LoopSettings,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            metrics: Some(metrics),
            ..Self::new(queue, persister, settings)
        }
    }

    pub fn queue(&self) -> Arc<dyn PlayerQueue> {
        self.queue.clone()
    }

    pub fn persister(&self) -> &MatchPersister {
        &self.persister
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn get_stats(&self) -> MatchmakerStats {
        let c = &self.counters;
        MatchmakerStats {
            players_dequeued: c.players_dequeued.load(Ordering::Relaxed),
            malformed_entries: c.malformed_entries.load(Ordering::Relaxed),
            queue_errors: c.queue_errors.load(Ordering::Relaxed),
            matches_created: c.matches_created.load(Ordering::Relaxed),
            players_matched: c.players_matched.load(Ordering::Relaxed),
            batches_dropped: c.batches_dropped.load(Ordering::Relaxed),
            players_dropped: c.players_dropped.load(Ordering::Relaxed),
            dequeue_timeouts: c.dequeue_timeouts.load(Ordering::Relaxed),
            persist_timeouts: c.persist_timeouts.load(Ordering::Relaxed),
            players_waiting: c.players_waiting.load(Ordering::Relaxed),
            loop_running: c.loop_running.load(Ordering::Relaxed),
        }
    }

    /// Run until `cancel` fires, returning the players still waiting
    pub async fn run(&self, cancel: CancellationToken) -> WaitingPool {
        self.run_with_pool(WaitingPool::new(), cancel).await
    }

    /// Run with a pre-populated pool until `cancel` fires
    pub async fn run_with_pool(&self, mut pool: WaitingPool, cancel: CancellationToken) -> WaitingPool {
        self.counters.loop_running.store(true, Ordering::Relaxed);
        info!(
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            "Matchmaking loop started"
        );

        loop {
            if cancel.is_cancelled() {
                info!(
                    waiting_count = pool.len(),
                    "Matchmaking loop stopped due to cancellation"
                );
                break;
            }

            let pause = match self.step(&mut pool).await {
                StepOutcome::Idle => Some(self.settings.poll_interval),
                StepOutcome::QueueFailed(_) => Some(self.settings.error_backoff),
                _ => None,
            };

            if let Some(pause) = pause {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = sleep(pause) => {}
                }
            }
        }

        self.counters.loop_running.store(false, Ordering::Relaxed);
        pool
    }

    /// Execute one iteration of the loop against `pool`
    ///
    /// A pool already holding a full batch is drained before the queue is
    /// polled again.
    pub async fn step(&self, pool: &mut WaitingPool) -> StepOutcome {
        if let Some(outcome) = self.form_ready_batch(pool).await {
            return outcome;
        }

        let player = match self.deadline(self.queue.dequeue()).await {
            Ok(Some(player)) => player,
            Ok(None) => return StepOutcome::Idle,
            Err(MatchmakingError::MalformedQueueEntry { reason, payload }) => {
                warn!(%reason, payload = %payload, "Dropping malformed queue entry");
                self.counters.malformed_entries.fetch_add(1, Ordering::Relaxed);
                if let Some(metrics) = &self.metrics {
                    metrics.record_malformed_entry();
                }
                return StepOutcome::MalformedDropped;
            }
            Err(e @ MatchmakingError::Timeout(_)) => {
                // RPOP may have completed server-side after the deadline fired
                error!(
                    error = %e,
                    "Dequeue timed out; an entry may have been popped and lost"
                );
                self.counters.queue_errors.fetch_add(1, Ordering::Relaxed);
                self.counters.dequeue_timeouts.fetch_add(1, Ordering::Relaxed);
                if let Some(metrics) = &self.metrics {
                    metrics.record_queue_error("dequeue_timeout");
                }
                return StepOutcome::QueueFailed(e);
            }
            Err(e) => {
                error!(error = %e, transient = e.is_transient(), "Error popping user");
                self.counters.queue_errors.fetch_add(1, Ordering::Relaxed);
                if let Some(metrics) = &self.metrics {
                    metrics.record_queue_error("dequeue");
                }
                return StepOutcome::QueueFailed(e);
            }
        };

        self.accumulate(pool, player);

        match self.form_ready_batch(pool).await {
            Some(outcome) => outcome,
            None => StepOutcome::Queued {
                waiting: pool.len(),
            },
        }
    }

    async fn form_ready_batch(&self, pool: &mut WaitingPool) -> Option<StepOutcome> {
        let batch = pool.take_batch()?;
        self.set_waiting(pool.len());
        Some(self.persist(form_teams(batch)).await)
    }

    fn accumulate(&self, pool: &mut WaitingPool, player: Player) {
        let user_id = player.user_id.clone();
        pool.append(player);

        self.counters.players_dequeued.fetch_add(1, Ordering::Relaxed);
        self.set_waiting(pool.len());
        if let Some(metrics) = &self.metrics {
            metrics.record_player_dequeued(pool.len());
        }

        info!(user_id = %user_id, waiting_count = pool.len(), "User queued");
    }

    async fn persist(&self, formed: FormedMatch) -> StepOutcome {
        debug!(
            region = %formed.region,
            average_elo = formed.average_elo,
            "Batch reserved, persisting match"
        );

        let started = Instant::now();
        let result = self.deadline(self.persister.persist(&formed)).await;
        let elapsed = started.elapsed();

        if let Some(metrics) = &self.metrics {
            metrics.record_persist(result.is_ok(), formed.average_elo, elapsed);
        }

        match result {
            Ok(match_id) => {
                self.counters.matches_created.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .players_matched
                    .fetch_add(formed.players().count() as u64, Ordering::Relaxed);
                info!(
                    %match_id,
                    region = %formed.region,
                    average_elo = formed.average_elo,
                    "Match and players saved"
                );
                StepOutcome::MatchCreated { match_id, formed }
            }
            Err(e) => {
                self.counters.batches_dropped.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .players_dropped
                    .fetch_add(formed.players().count() as u64, Ordering::Relaxed);
                // A deadline can fire after COMMIT reached the server, so the
                // match may in fact be stored
                let outcome_unknown = matches!(e, MatchmakingError::Timeout(_));
                if outcome_unknown {
                    self.counters.persist_timeouts.fetch_add(1, Ordering::Relaxed);
                }
                let dropped: Vec<&str> = formed.players().map(|p| p.user_id.as_str()).collect();
                error!(
                    error = %e,
                    region = %formed.region,
                    dropped_users = ?dropped,
                    outcome_unknown,
                    "Failed to save match; reserved batch dropped"
                );
                StepOutcome::BatchDropped { formed, error: e }
            }
        }
    }

    async fn deadline<T>(
        &self,
        op: impl Future<Output = MatchmakingResult<T>>,
    ) -> MatchmakingResult<T> {
        let limit = self.settings.operation_timeout;
        timeout(limit, op)
            .await
            .unwrap_or(Err(MatchmakingError::Timeout(limit)))
    }

    fn set_waiting(&self, waiting: usize) {
        self.counters.players_waiting.store(waiting, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{FailurePoint, InMemoryMatchStore};
    use crate::queue::{InMemoryPlayerQueue, MockPlayerQueue};
    use chrono::Utc;

    fn player(i: usize, elo: i32) -> Player {
        Player {
            user_id: format!("user{}", i),
            elo,
            region: "NA".to_string(),
            queued_at: Utc::now(),
        }
    }

    fn fast_settings() -> LoopSettings {
        LoopSettings {
            poll_interval: Duration::from_millis(10),
            error_backoff: Duration::from_millis(10),
            operation_timeout: Duration::from_millis(500),
        }
    }

    fn build(queue: Arc<dyn PlayerQueue>, store: &InMemoryMatchStore) -> Matchmaker {
        let persister = MatchPersister::new(Arc::new(store.clone()));
        Matchmaker::new(queue, persister, fast_settings())
    }

    #[tokio::test]
    async fn test_tenth_player_triggers_match() {
        let queue = Arc::new(InMemoryPlayerQueue::new());
        for i in 0..10 {
            queue.enqueue(&player(i, 1000 + i as i32 * 10)).await.unwrap();
        }
        let store = InMemoryMatchStore::new();
        let matchmaker = build(queue, &store);
        let mut pool = WaitingPool::new();

        for expected in 1..10 {
            match matchmaker.step(&mut pool).await {
                StepOutcome::Queued { waiting } => assert_eq!(waiting, expected),
                other => panic!("unexpected outcome {:?}", other),
            }
        }

        match matchmaker.step(&mut pool).await {
            StepOutcome::MatchCreated { formed, .. } => assert_eq!(formed.average_elo, 1045),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(pool.is_empty());
        assert_eq!(store.matches().len(), 1);

        let stats = matchmaker.get_stats();
        assert_eq!(stats.players_dequeued, 10);
        assert_eq!(stats.players_matched, 10);
        assert_eq!(stats.players_waiting, 0);
    }

    #[tokio::test]
    async fn test_failed_persist_drops_reserved_batch() {
        let queue = Arc::new(InMemoryPlayerQueue::new());
        for i in 0..10 {
            queue.enqueue(&player(i, 1500)).await.unwrap();
        }
        let store = InMemoryMatchStore::new();
        store.inject_failure(FailurePoint::Commit);
        let matchmaker = build(queue.clone(), &store);
        let mut pool = WaitingPool::new();

        let mut last = None;
        for _ in 0..10 {
            last = Some(matchmaker.step(&mut pool).await);
        }

        assert!(matches!(last, Some(StepOutcome::BatchDropped { .. })));
        assert!(pool.is_empty());
        assert_eq!(queue.len().await.unwrap(), 0);
        assert!(store.matches().is_empty());
        assert_eq!(matchmaker.get_stats().players_dropped, 10);
    }

    #[tokio::test]
    async fn test_transient_queue_error_then_recovery() {
        let mut queue = MockPlayerQueue::new();
        let mut calls = 0;
        queue.expect_dequeue().times(2).returning(move || {
            calls += 1;
            if calls == 1 {
                Err(MatchmakingError::QueueUnavailable {
                    message: "connection reset".to_string(),
                })
            } else {
                Ok(Some(player(1, 1200)))
            }
        });

        let store = InMemoryMatchStore::new();
        let matchmaker = build(Arc::new(queue), &store);
        let mut pool = WaitingPool::new();

        assert!(matches!(
            matchmaker.step(&mut pool).await,
            StepOutcome::QueueFailed(_)
        ));
        assert!(pool.is_empty());
        assert!(matches!(
            matchmaker.step(&mut pool).await,
            StepOutcome::Queued { waiting: 1 }
        ));
        assert_eq!(matchmaker.get_stats().queue_errors, 1);
    }

    #[tokio::test]
    async fn test_malformed_entry_dropped() {
        let queue = Arc::new(InMemoryPlayerQueue::new());
        queue.push_raw(r#"{"user_id":"x"}"#).unwrap();
        let store = InMemoryMatchStore::new();
        let matchmaker = build(queue.clone(), &store);
        let mut pool = WaitingPool::new();

        assert!(matches!(
            matchmaker.step(&mut pool).await,
            StepOutcome::MalformedDropped
        ));
        assert!(pool.is_empty());
        assert_eq!(queue.len().await.unwrap(), 0);
        assert_eq!(matchmaker.get_stats().malformed_entries, 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation() {
        let mut queue = MockPlayerQueue::new();
        queue.expect_dequeue().returning(|| Ok(None));

        let store = InMemoryMatchStore::new();
        let matchmaker = build(Arc::new(queue), &store);
        let cancel = CancellationToken::new();

        let handle = {
            let matchmaker = matchmaker.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { matchmaker.run(cancel).await })
        };

        sleep(Duration::from_millis(30)).await;
        assert!(matchmaker.get_stats().loop_running);
        cancel.cancel();

        let pool = timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop did not stop in time")
            .expect("loop task panicked");
        assert!(pool.is_empty());
        assert!(!matchmaker.get_stats().loop_running);
    }

    #[tokio::test]
    async fn test_slow_dequeue_hits_deadline() {
        struct StalledQueue;

        #[async_trait::async_trait]
        impl PlayerQueue for StalledQueue {
            async fn enqueue(&self, _player: &Player) -> MatchmakingResult<()> {
                Ok(())
            }
            async fn dequeue(&self) -> MatchmakingResult<Option<Player>> {
                sleep(Duration::from_secs(60)).await;
                Ok(None)
            }
            async fn len(&self) -> MatchmakingResult<usize> {
                Ok(0)
            }
        }

        let store = InMemoryMatchStore::new();
        let mut matchmaker = build(Arc::new(StalledQueue), &store);
        matchmaker.settings.operation_timeout = Duration::from_millis(20);

        match matchmaker.step(&mut WaitingPool::new()).await {
            StepOutcome::QueueFailed(MatchmakingError::Timeout(_)) => {}
            other => panic!("expected timeout, got {:?}", other),
        }

        let stats = matchmaker.get_stats();
        assert_eq!(stats.queue_errors, 1);
        assert_eq!(stats.dequeue_timeouts, 1);
    }

    #[tokio::test]
    async fn test_full_pool_forms_matches_without_new_arrivals() {
        let queue = Arc::new(InMemoryPlayerQueue::new());
        let store = InMemoryMatchStore::new();
        let matchmaker = build(queue, &store);

        let mut pool = WaitingPool::new();
        for i in 0..25 {
            pool.append(player(i, 1000 + i as i32 * 10));
        }

        match matchmaker.step(&mut pool).await {
            StepOutcome::MatchCreated { formed, .. } => {
                assert_eq!(formed.red[0].user_id, "user0");
                assert_eq!(formed.average_elo, 1045);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(matches!(
            matchmaker.step(&mut pool).await,
            StepOutcome::MatchCreated { .. }
        ));
        assert!(matches!(matchmaker.step(&mut pool).await, StepOutcome::Idle));

        assert_eq!(pool.len(), 5);
        assert_eq!(store.matches().len(), 2);
        assert_eq!(matchmaker.get_stats().players_dequeued, 0);
    }

    #[tokio::test]
    async fn test_run_with_full_pool_drains_it_while_queue_is_empty() {
        let queue = Arc::new(InMemoryPlayerQueue::new());
        let store = InMemoryMatchStore::new();
        let matchmaker = build(queue, &store);

        let mut pool = WaitingPool::new();
        for i in 0..25 {
            pool.append(player(i, 1500));
        }

        let cancel = CancellationToken::new();
        let handle = {
            let matchmaker = matchmaker.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { matchmaker.run_with_pool(pool, cancel).await })
        };

        sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        let pool = timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop did not stop in time")
            .expect("loop task panicked");

        assert_eq!(store.matches().len(), 2);
        assert_eq!(pool.len(), 5);
    }

    #[tokio::test]
    async fn test_persist_deadline_marks_outcome_unknown() {
        struct StalledStore;

        #[async_trait::async_trait]
        impl crate::persistence::MatchStore for StalledStore {
            async fn begin(
                &self,
            ) -> MatchmakingResult<Box<dyn crate::persistence::MatchTransaction>> {
                sleep(Duration::from_secs(60)).await;
                Err(MatchmakingError::Timeout(Duration::from_secs(60)))
            }
            async fn ping(&self) -> MatchmakingResult<()> {
                Ok(())
            }
        }

        let queue = Arc::new(InMemoryPlayerQueue::new());
        let mut matchmaker = Matchmaker::new(
            queue,
            MatchPersister::new(Arc::new(StalledStore)),
            fast_settings(),
        );
        matchmaker.settings.operation_timeout = Duration::from_millis(20);

        let mut pool = WaitingPool::new();
        for i in 0..10 {
            pool.append(player(i, 1500));
        }

        match matchmaker.step(&mut pool).await {
            StepOutcome::BatchDropped {
                error: MatchmakingError::Timeout(_),
                ..
            } => {}
            other => panic!("expected dropped batch on timeout, got {:?}", other),
        }

        let stats = matchmaker.get_stats();
        assert_eq!(stats.persist_timeouts, 1);
        assert_eq!(stats.batches_dropped, 1);
        assert!(pool.is_empty());
    }
}
