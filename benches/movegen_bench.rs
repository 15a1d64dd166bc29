use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::time::Duration;

use royal100::board::position::Position;
use royal100::movegen::moves::{generate, GenType};
use royal100::uci::bench::DEFAULT_FENS;

fn movegen_benchmark(c: &mut Criterion) {
    royal100::init();

    let positions: Vec<(&str, Position)> = vec![
        ("startpos", Position::startpos()),
        ("middlegame", Position::from_fen(DEFAULT_FENS[6]).unwrap()),
        ("royal_endgame", Position::from_fen(DEFAULT_FENS[7]).unwrap()),
    ];

    let mut group = c.benchmark_group("Move Generation");
    group.measurement_time(Duration::from_secs(10));

    for (name, pos) in &positions {
        let count = generate(pos, GenType::Legal).len();
        group.throughput(Throughput::Elements(count as u64));
        group.bench_function(format!("legal/{}", name), |b| {
            b.iter(|| black_box(generate(pos, GenType::Legal)));
        });
        group.bench_function(format!("pseudo/{}", name), |b| {
            b.iter(|| black_box(generate(pos, GenType::NonEvasions)));
        });
    }

    group.finish();
}

fn make_unmake_benchmark(c: &mut Criterion) {
    royal100::init();

    let mut group = c.benchmark_group("Make Unmake");
    group.measurement_time(Duration::from_secs(10));

    let pos = Position::startpos();
    let moves = generate(&pos, GenType::Legal);
    group.throughput(Throughput::Elements(moves.len() as u64));
    group.bench_function("startpos", |b| {
        b.iter(|| {
            let mut p = pos.clone();
            for &m in &moves {
                p.do_move(m);
                p.undo_move(m);
            }
            black_box(&mut p);
        });
    });

    group.finish();
}

criterion_group!(
    name = movegen_benches;
    config = Criterion::default().noise_threshold(0.02);
    targets = movegen_benchmark, make_unmake_benchmark,
);
criterion_main!(movegen_benches);
