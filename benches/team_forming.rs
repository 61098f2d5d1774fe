//! Performance benchmarks for team forming and the matchmaking step

use arena_matchmaker::matchmaker::{form_teams, LoopSettings, Matchmaker, WaitingPool};
use arena_matchmaker::persistence::{InMemoryMatchStore, MatchPersister};
use arena_matchmaker::producer::PlayerGenerator;
use arena_matchmaker::queue::{InMemoryPlayerQueue, PlayerQueue};
use arena_matchmaker::types::{Player, MATCH_SIZE};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

fn random_players(count: usize) -> Vec<Player> {
    let mut generator = PlayerGenerator::with_rng(StdRng::seed_from_u64(17));
    (0..count).map(|_| generator.next_player()).collect()
}

fn bench_form_teams(c: &mut Criterion) {
    let players = random_players(MATCH_SIZE);

    c.bench_function("form_teams_10_players", |b| {
        b.iter_batched(
            || {
                <[Player; MATCH_SIZE]>::try_from(players.clone())
                    .expect("exactly ten players")
            },
            |batch| black_box(form_teams(batch)),
            BatchSize::SmallInput,
        )
    });
}

fn bench_pool_throughput(c: &mut Criterion) {
    let players = random_players(1000);

    c.bench_function("pool_1000_players_into_batches", |b| {
        b.iter_batched(
            || players.clone(),
            |players| {
                let mut pool = WaitingPool::new();
                let mut formed = 0;
                for player in players {
                    pool.append(player);
                    if let Some(batch) = pool.take_batch() {
                        black_box(form_teams(batch));
                        formed += 1;
                    }
                }
                formed
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_step_to_persisted_match(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let players = random_players(MATCH_SIZE);

    c.bench_function("ten_steps_in_memory", |b| {
        b.iter(|| {
            rt.block_on(async {
                let queue = Arc::new(InMemoryPlayerQueue::new());
                for player in &players {
                    queue.enqueue(player).await.unwrap();
                }
                let matchmaker = Matchmaker::new(
                    queue,
                    MatchPersister::new(Arc::new(InMemoryMatchStore::new())),
                    LoopSettings::default(),
                );

                let mut pool = WaitingPool::new();
                for _ in 0..MATCH_SIZE {
                    black_box(matchmaker.step(&mut pool).await);
                }
            })
        })
    });
}

criterion_group!(
    benches,
    bench_form_teams,
    bench_pool_throughput,
    bench_step_to_persisted_match
);
criterion_main!(benches);
