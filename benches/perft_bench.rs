use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

use royal100::board::position::Position;
use royal100::movegen::moves::perft;
use royal100::uci::bench::DEFAULT_FENS;

fn perft_benchmark(c: &mut Criterion) {
    royal100::init();

    let mut group = c.benchmark_group("Perft");
    group.sample_size(20).measurement_time(Duration::from_secs(15));

    for depth in [1, 2, 3] {
        group.bench_with_input(
            BenchmarkId::new("startpos", depth),
            &depth,
            |b, &depth| {
                let mut pos = Position::startpos();
                b.iter(|| black_box(perft(&mut pos, depth)));
            },
        );
    }

    group.bench_function("royal_endgame_depth_3", |b| {
        let mut pos = Position::from_fen(DEFAULT_FENS[7]).unwrap();
        b.iter(|| black_box(perft(&mut pos, 3)));
    });

    group.finish();
}

criterion_group!(
    name = perft_benches;
    config = Criterion::default().noise_threshold(0.02);
    targets = perft_benchmark,
);
criterion_main!(perft_benches);
