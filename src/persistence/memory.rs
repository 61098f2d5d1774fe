//! In-memory match store with transactional visibility
//!
//! Writes are staged per transaction and become visible only on commit.
//! Failures can be injected at any transaction stage.

use super::{MatchStore, MatchTransaction};
use crate::error::{MatchmakingError, MatchmakingResult, PersistStage};
use crate::types::{Match, MatchId, MatchPlayer};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Where an injected failure fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    Begin,
    InsertMatch,
    /// Fail on the roster insert with this zero-based index
    InsertPlayer(usize),
    Commit,
}

#[derive(Debug, Default)]
struct StoreState {
    matches: Vec<Match>,
    players: Vec<MatchPlayer>,
    open_transactions: usize,
    transactions_started: usize,
    rollbacks: usize,
    failures: VecDeque<FailurePoint>,
}

/// Match store kept in process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryMatchStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for a future transaction. Failures are consumed in
    /// order, one per transaction that reaches the named stage.
    pub fn inject_failure(&self, point: FailurePoint) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.push_back(point);
        }
    }

    /// Committed matches
    pub fn matches(&self) -> Vec<Match> {
        self.state
            .lock()
            .map(|s| s.matches.clone())
            .unwrap_or_default()
    }

    /// Committed roster rows
    pub fn match_players(&self) -> Vec<MatchPlayer> {
        self.state
            .lock()
            .map(|s| s.players.clone())
            .unwrap_or_default()
    }

    /// Roster rows committed for one match
    pub fn roster_of(&self, match_id: MatchId) -> Vec<MatchPlayer> {
        self.match_players()
            .into_iter()
            .filter(|row| row.match_id == match_id)
            .collect()
    }

    /// Transactions begun but neither committed, rolled back nor dropped
    pub fn open_transactions(&self) -> usize {
        self.state.lock().map(|s| s.open_transactions).unwrap_or(0)
    }

    pub fn transactions_started(&self) -> usize {
        self.state
            .lock()
            .map(|s| s.transactions_started)
            .unwrap_or(0)
    }

    pub fn rollbacks(&self) -> usize {
        self.state.lock().map(|s| s.rollbacks).unwrap_or(0)
    }

    fn lock(state: &Mutex<StoreState>) -> MatchmakingResult<MutexGuard<'_, StoreState>> {
        state.lock().map_err(|_| MatchmakingError::InternalError {
            message: "Failed to acquire match store lock".to_string(),
        })
    }

    /// Consume the next injected failure if it matches `point`
    fn take_failure(state: &mut StoreState, point: FailurePoint) -> bool {
        if state.failures.front() == Some(&point) {
            state.failures.pop_front();
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl MatchStore for InMemoryMatchStore {
    async fn begin(&self) -> MatchmakingResult<Box<dyn MatchTransaction>> {
        let mut state = Self::lock(&self.state)?;
        if Self::take_failure(&mut state, FailurePoint::Begin) {
            return Err(MatchmakingError::persistence(
                PersistStage::Begin,
                "simulated begin failure",
            ));
        }

        state.open_transactions += 1;
        state.transactions_started += 1;

        Ok(Box::new(InMemoryTransaction {
            state: self.state.clone(),
            staged_match: None,
            staged_players: Vec::new(),
            finished: false,
        }))
    }

    async fn ping(&self) -> MatchmakingResult<()> {
        Self::lock(&self.state).map(|_| ())
    }
}

struct InMemoryTransaction {
    state: Arc<Mutex<StoreState>>,
    staged_match: Option<Match>,
    staged_players: Vec<MatchPlayer>,
    finished: bool,
}

impl InMemoryTransaction {
    fn close(&mut self, state: &mut StoreState) {
        if !self.finished {
            self.finished = true;
            state.open_transactions = state.open_transactions.saturating_sub(1);
        }
    }
}

#[async_trait]
impl MatchTransaction for InMemoryTransaction {
    async fn insert_match(&mut self, region: &str, average_elo: i32) -> MatchmakingResult<MatchId> {
        {
            let mut state = InMemoryMatchStore::lock(&self.state)?;
            if InMemoryMatchStore::take_failure(&mut state, FailurePoint::InsertMatch) {
                return Err(MatchmakingError::persistence(
                    PersistStage::InsertMatch,
                    "simulated match insert failure",
                ));
            }
        }

        let id = Uuid::new_v4();
        self.staged_match = Some(Match {
            id,
            region: region.to_string(),
            average_elo,
        });
        Ok(id)
    }

    async fn insert_match_player(&mut self, row: &MatchPlayer) -> MatchmakingResult<()> {
        let index = self.staged_players.len();
        {
            let mut state = InMemoryMatchStore::lock(&self.state)?;
            if InMemoryMatchStore::take_failure(&mut state, FailurePoint::InsertPlayer(index)) {
                return Err(MatchmakingError::persistence(
                    PersistStage::InsertPlayer,
                    format!("simulated failure on roster row {}", index),
                ));
            }
        }

        let references_staged = self
            .staged_match
            .as_ref()
            .is_some_and(|m| m.id == row.match_id);
        if !references_staged {
            return Err(MatchmakingError::persistence(
                PersistStage::InsertPlayer,
                format!("match {} does not exist", row.match_id),
            ));
        }

        self.staged_players.push(row.clone());
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> MatchmakingResult<()> {
        let state_handle = self.state.clone();
        let mut state = InMemoryMatchStore::lock(&state_handle)?;
        self.close(&mut state);

        if InMemoryMatchStore::take_failure(&mut state, FailurePoint::Commit) {
            return Err(MatchmakingError::persistence(
                PersistStage::Commit,
                "simulated commit failure",
            ));
        }

        if let Some(m) = self.staged_match.take() {
            state.matches.push(m);
        }
        state.players.append(&mut self.staged_players);
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> MatchmakingResult<()> {
        let state_handle = self.state.clone();
        let mut state = InMemoryMatchStore::lock(&state_handle)?;
        self.close(&mut state);
        state.rollbacks += 1;
        Ok(())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let state_handle = self.state.clone();
        if let Ok(mut state) = state_handle.lock() {
            self.close(&mut state);
            state.rollbacks += 1;
        };
    }
}
