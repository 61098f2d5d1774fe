//! Waiting pool of dequeued players not yet placed in a match

use crate::types::{Player, MATCH_SIZE};
use std::collections::VecDeque;

/// Ordered buffer of waiting players, oldest-queued first.
///
/// Owned by the matchmaking loop; it is never shared between tasks.
#[derive(Debug, Clone, Default)]
pub struct WaitingPool {
    players: VecDeque<Player>,
}

impl WaitingPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, player: Player) {
        self.players.push_back(player);
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Remove and return the first `n` players, or `None` if fewer are waiting
    pub fn take_front(&mut self, n: usize) -> Option<Vec<Player>> {
        if self.players.len() < n {
            return None;
        }
        Some(self.players.drain(..n).collect())
    }

    /// Reserve one full match worth of players
    pub fn take_batch(&mut self) -> Option<[Player; MATCH_SIZE]> {
        self.take_front(MATCH_SIZE)
            .and_then(|batch| <[Player; MATCH_SIZE]>::try_from(batch).ok())
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    pub fn into_players(self) -> Vec<Player> {
        self.players.into()
    }
}
