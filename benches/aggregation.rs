use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use family_board::{
    best_scores_by_category, Leaderboard, Player, Roster, ScoreDirection, ScoreEvent,
};

fn events(count: usize, users: usize, categories: usize) -> Vec<ScoreEvent> {
    (0..count)
        .map(|i| {
            let direction = if i % categories % 2 == 0 {
                ScoreDirection::HigherBetter
            } else {
                ScoreDirection::LowerBetter
            };
            ScoreEvent::new(
                i.to_string(),
                format!("user-{}", i % users),
                format!("category-{}", i % categories),
                ((i * 7919) % 1000) as f64,
                direction,
            )
        })
        .collect()
}

fn roster(users: usize) -> Roster {
    Roster::new((0..users).map(|i| Player::new(format!("user-{}", i), format!("User {}", i))))
}

/// Benchmark best-per-user ranking for growing event histories
fn bench_rankings(c: &mut Criterion) {
    let mut group = c.benchmark_group("rankings");

    for count in [100usize, 1000, 10_000].iter() {
        let events = events(*count, 8, 12);
        group.throughput(Throughput::Elements(*count as u64));

        group.bench_with_input(BenchmarkId::new("events", count), &events, |b, events| {
            b.iter(|| black_box(best_scores_by_category(black_box(events))))
        });
    }

    group.finish();
}

/// Benchmark the full leaderboard view
fn bench_view(c: &mut Criterion) {
    let mut group = c.benchmark_group("leaderboard_view");

    for users in [4usize, 16, 64].iter() {
        let events = events(5000, *users, 20);
        let board = Leaderboard::new(roster(*users));

        group.bench_with_input(BenchmarkId::new("users", users), &events, |b, events| {
            b.iter(|| black_box(board.view(black_box(events))))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_rankings, bench_view);
criterion_main!(benches);
