//! Team forming for a reserved batch
//!
//! Queue order is the only signal: the first half of the batch plays red,
//! the second half plays blue. No skill balancing is attempted.

use crate::types::{FormedMatch, Player, MATCH_SIZE, TEAM_SIZE};

/// Split a batch into red and blue teams and compute match statistics
pub fn form_teams(batch: [Player; MATCH_SIZE]) -> FormedMatch {
    let average_elo = average_elo(&batch);
    let region = batch[0].region.clone();

    let mut players = Vec::from(batch);
    let blue = players.split_off(TEAM_SIZE);
    let red = players;

    FormedMatch {
        red,
        blue,
        region,
        average_elo,
    }
}

/// Mean elo, truncated toward zero
pub fn average_elo(players: &[Player]) -> i32 {
    if players.is_empty() {
        return 0;
    }
    let total: i64 = players.iter().map(|p| i64::from(p.elo)).sum();
    (total / players.len() as i64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn batch_from(elos: &[i32], regions: &[&str]) -> [Player; MATCH_SIZE] {
        let players: Vec<Player> = elos
            .iter()
            .enumerate()
            .map(|(i, &elo)| Player {
                user_id: format!("user{}", i + 1),
                elo,
                region: regions[i % regions.len()].to_string(),
                queued_at: Utc::now(),
            })
            .collect();
        players.try_into().unwrap()
    }

    #[test]
    fn test_reference_batch() {
        let elos: Vec<i32> = (0..10).map(|i| 1000 + i * 10).collect();
        let formed = form_teams(batch_from(&elos, &["NA"]));

        assert_eq!(formed.average_elo, 1045);
        assert_eq!(formed.region, "NA");
        let red: Vec<_> = formed.red.iter().map(|p| p.user_id.as_str()).collect();
        let blue: Vec<_> = formed.blue.iter().map(|p| p.user_id.as_str()).collect();
        assert_eq!(red, vec!["user1", "user2", "user3", "user4", "user5"]);
        assert_eq!(blue, vec!["user6", "user7", "user8", "user9", "user10"]);
    }

    #[test]
    fn test_region_comes_from_first_player() {
        let formed = form_teams(batch_from(&[1500; 10], &["EU", "NA", "ASIA"]));
        assert_eq!(formed.region, "EU");
    }

    #[test]
    fn test_average_truncates() {
        let mut elos = [1000; 10];
        elos[0] = 1009;
        let formed = form_teams(batch_from(&elos, &["NA"]));
        assert_eq!(formed.average_elo, 1000);
    }

    #[test]
    fn test_negative_average_truncates_toward_zero() {
        let mut elos = [0; 10];
        elos[0] = -5;
        let formed = form_teams(batch_from(&elos, &["NA"]));
        assert_eq!(formed.average_elo, 0);

        elos[0] = -15;
        let formed = form_teams(batch_from(&elos, &["NA"]));
        assert_eq!(formed.average_elo, -1);
    }

    proptest! {
        #[test]
        fn prop_average_is_truncated_mean(elos in prop::collection::vec(-4000i32..4000, MATCH_SIZE)) {
            let formed = form_teams(batch_from(&elos, &["NA"]));
            let sum: i64 = elos.iter().map(|&e| e as i64).sum();
            prop_assert_eq!(formed.average_elo as i64, sum / 10);
        }

        #[test]
        fn prop_teams_partition_batch_in_order(elos in prop::collection::vec(800i32..2800, MATCH_SIZE)) {
            let batch = batch_from(&elos, &["NA", "EU"]);
            let expected: Vec<String> = batch.iter().map(|p| p.user_id.clone()).collect();
            let formed = form_teams(batch);

            prop_assert_eq!(formed.red.len(), TEAM_SIZE);
            prop_assert_eq!(formed.blue.len(), TEAM_SIZE);
            let actual: Vec<String> = formed.players().map(|p| p.user_id.clone()).collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
