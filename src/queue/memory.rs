//! In-process player queue
//!
//! Stores raw entry payloads so that tests and local runs exercise the same
//! decode path as the Redis queue, including poisoned entries.

use crate::error::{MatchmakingError, MatchmakingResult};
use crate::queue::messages::EntryCodec;
use crate::queue::PlayerQueue;
use crate::types::Player;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct QueueState {
    entries: VecDeque<String>,
    pending_failures: usize,
}

/// FIFO player queue held in memory
#[derive(Debug, Default)]
pub struct InMemoryPlayerQueue {
    state: Mutex<QueueState>,
}

impl InMemoryPlayerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an arbitrary payload, bypassing encoding
    pub fn push_raw(&self, payload: impl Into<String>) -> MatchmakingResult<()> {
        let mut state = self.lock()?;
        state.entries.push_back(payload.into());
        Ok(())
    }

    /// Make the next `count` queue operations fail as if the store were unreachable
    pub fn fail_next(&self, count: usize) -> MatchmakingResult<()> {
        let mut state = self.lock()?;
        state.pending_failures += count;
        Ok(())
    }

    fn lock(&self) -> MatchmakingResult<std::sync::MutexGuard<'_, QueueState>> {
        self.state
            .lock()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire queue lock".to_string(),
            })
    }

    fn check_available(state: &mut QueueState) -> MatchmakingResult<()> {
        if state.pending_failures > 0 {
            state.pending_failures -= 1;
            return Err(MatchmakingError::QueueUnavailable {
                message: "simulated queue outage".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PlayerQueue for InMemoryPlayerQueue {
    async fn enqueue(&self, player: &Player) -> MatchmakingResult<()> {
        let payload = EntryCodec::encode(player)?;
        let mut state = self.lock()?;
        Self::check_available(&mut state)?;
        state.entries.push_back(payload);
        Ok(())
    }

    async fn dequeue(&self) -> MatchmakingResult<Option<Player>> {
        let payload = {
            let mut state = self.lock()?;
            Self::check_available(&mut state)?;
            state.entries.pop_front()
        };

        match payload {
            Some(payload) => EntryCodec::decode(&payload).map(Some),
            None => Ok(None),
        }
    }

    async fn len(&self) -> MatchmakingResult<usize> {
        let mut state = self.lock()?;
        Self::check_available(&mut state)?;
        Ok(state.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn player(id: &str) -> Player {
        Player {
            user_id: id.to_string(),
            elo: 1200,
            region: "EU".to_string(),
            queued_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = InMemoryPlayerQueue::new();
        for id in ["a", "b", "c"] {
            queue.enqueue(&player(id)).await.unwrap();
        }

        let mut order = Vec::new();
        while let Some(p) = queue.dequeue().await.unwrap() {
            order.push(p.user_id);
        }
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_empty_is_not_an_error() {
        let queue = InMemoryPlayerQueue::new();
        assert!(queue.dequeue().await.unwrap().is_none());
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_simulated_outage_is_transient() {
        let queue = InMemoryPlayerQueue::new();
        queue.enqueue(&player("a")).await.unwrap();
        queue.fail_next(1).unwrap();

        let err = queue.dequeue().await.unwrap_err();
        assert!(err.is_transient());

        // Entry survives the outage
        assert_eq!(queue.dequeue().await.unwrap().unwrap().user_id, "a");
    }

    #[tokio::test]
    async fn test_malformed_entry_is_consumed() {
        let queue = InMemoryPlayerQueue::new();
        queue.push_raw("{garbage").unwrap();
        queue.enqueue(&player("b")).await.unwrap();

        assert!(matches!(
            queue.dequeue().await,
            Err(MatchmakingError::MalformedQueueEntry { .. })
        ));
        assert_eq!(queue.len().await.unwrap(), 1);
        assert_eq!(queue.dequeue().await.unwrap().unwrap().user_id, "b");
    }
}
