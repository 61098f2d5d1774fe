//! Player queue integration for the matchmaking service
//!
//! The queue is an external FIFO shared by any number of producers and a
//! single consumer (the matchmaking loop). Producers push at the head and
//! the loop pops from the tail.

pub mod memory;
pub mod messages;
pub mod redis_queue;

use crate::error::MatchmakingResult;
use crate::types::Player;
use async_trait::async_trait;

// Re-export commonly used types
pub use memory::InMemoryPlayerQueue;
pub use messages::{EntryCodec, MATCH_QUEUE_KEY};
pub use redis_queue::{RedisPlayerQueue, RedisQueueConfig};

/// Interface to the shared player queue
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlayerQueue: Send + Sync {
    /// Push a player onto the queue
    async fn enqueue(&self, player: &Player) -> MatchmakingResult<()>;

    /// Pop the oldest entry without waiting.
    ///
    /// `Ok(None)` means the queue is empty. A transport failure comes back as
    /// `QueueUnavailable`, an undecodable entry as `MalformedQueueEntry` (the
    /// entry has already been removed from the queue in that case).
    async fn dequeue(&self) -> MatchmakingResult<Option<Player>>;

    /// Number of entries currently waiting
    async fn len(&self) -> MatchmakingResult<usize>;
}
