//! Queue entry definitions and serialization

use crate::error::{MatchmakingError, MatchmakingResult};
use crate::types::Player;

/// Redis list shared by producers and the matchmaking loop
pub const MATCH_QUEUE_KEY: &str = "match_queue";

/// Queue entry serialization and validation utilities
pub struct EntryCodec;

impl EntryCodec {
    /// Serialize a player into a queue entry
    pub fn encode(player: &Player) -> MatchmakingResult<String> {
        Self::validate(player).map_err(|reason| MatchmakingError::InternalError {
            message: format!("Refusing to enqueue invalid player: {}", reason),
        })?;

        serde_json::to_string(player).map_err(|e| MatchmakingError::InternalError {
            message: format!("Failed to serialize player: {}", e),
        })
    }

    /// Deserialize a queue entry into a player snapshot
    pub fn decode(payload: &str) -> MatchmakingResult<Player> {
        let player: Player =
            serde_json::from_str(payload).map_err(|e| MatchmakingError::MalformedQueueEntry {
                reason: format!("Failed to deserialize queue entry: {}", e),
                payload: payload.to_string(),
            })?;

        Self::validate(&player).map_err(|reason| MatchmakingError::MalformedQueueEntry {
            reason,
            payload: payload.to_string(),
        })?;

        Ok(player)
    }

    fn validate(player: &Player) -> std::result::Result<(), String> {
        if player.user_id.is_empty() {
            return Err("User ID cannot be empty".to_string());
        }

        if player.region.is_empty() {
            return Err("Region cannot be empty".to_string());
        }

        if player.elo < 0 {
            return Err(format!("Elo cannot be negative: {}", player.elo));
        }

        Ok(())
    }
}
