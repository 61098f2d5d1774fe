//! Common types used throughout the matchmaking service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Unique identifier for players, as issued by the producer
pub type UserId = String;

/// Unique identifier for persisted matches
pub type MatchId = Uuid;

/// Players per team
pub const TEAM_SIZE: usize = 5;

/// Players per match (two teams)
pub const MATCH_SIZE: usize = TEAM_SIZE * 2;

/// Snapshot of a queued player, taken when the entry was dequeued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub user_id: UserId,
    pub elo: i32,
    pub region: String,
    #[serde(deserialize_with = "deserialize_queued_at")]
    pub queued_at: DateTime<Utc>,
}

/// Side of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Red,
    Blue,
}

impl Team {
    pub fn as_str(&self) -> &'static str {
        match self {
            Team::Red => "red",
            Team::Blue => "blue",
        }
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Team {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "red" => Ok(Team::Red),
            "blue" => Ok(Team::Blue),
            other => Err(format!("unknown team '{}'", other)),
        }
    }
}

/// A persisted match row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub region: String,
    pub average_elo: i32,
}

/// A persisted roster row linking a player to a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPlayer {
    pub match_id: MatchId,
    pub user_id: UserId,
    pub team: Team,
    pub elo: i32,
}

/// Two teams formed from one batch, ready to be persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormedMatch {
    pub red: Vec<Player>,
    pub blue: Vec<Player>,
    pub region: String,
    pub average_elo: i32,
}

impl FormedMatch {
    /// Roster rows for this match, red and blue interleaved by seat
    pub fn roster(&self, match_id: MatchId) -> Vec<MatchPlayer> {
        let row = |player: &Player, team: Team| MatchPlayer {
            match_id,
            user_id: player.user_id.clone(),
            team,
            elo: player.elo,
        };

        self.red
            .iter()
            .zip(self.blue.iter())
            .flat_map(|(red, blue)| [row(red, Team::Red), row(blue, Team::Blue)])
            .collect()
    }

    /// Every player in the match, red team first
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.red.iter().chain(self.blue.iter())
    }
}

/// Accept strict RFC3339 as well as the `+00:00Z` form some producers emit
fn deserialize_queued_at<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_queued_at(&raw).map_err(serde::de::Error::custom)
}

pub(crate) fn parse_queued_at(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    raw.strip_suffix('Z')
        .and_then(|trimmed| DateTime::parse_from_rfc3339(trimmed).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .ok_or_else(|| format!("invalid queued_at timestamp '{}'", raw))
}
