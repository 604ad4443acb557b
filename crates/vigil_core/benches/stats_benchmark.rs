//! # Detection Primitive Benchmark
//!
//! Every combat packet feeds three rolling windows and up to five
//! accumulators, so these sit on the per-packet hot path.
//!
//! Run with: `cargo bench --package vigil_core`

// Benchmarks don't need docs
#![allow(missing_docs)]

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vigil_core::{NullSink, RollingStatistics, ViolationAccumulator};

/// Benchmark: steady-state insert + evict at typical packet rates.
fn bench_rolling_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("rolling_insert");

    for interval_ms in [5u64, 50, 250] {
        group.bench_with_input(
            BenchmarkId::from_parameter(interval_ms),
            &interval_ms,
            |b, &interval_ms| {
                let mut stats = RollingStatistics::new(Duration::from_secs(6));
                let mut now = 0u64;
                b.iter(|| {
                    now += interval_ms;
                    stats.add_sample(black_box(now as f64 % 17.0), now);
                    black_box(stats.variance())
                });
            },
        );
    }

    group.finish();
}

/// Benchmark: accumulator decay + add.
fn bench_accumulator(c: &mut Criterion) {
    c.bench_function("accumulator_add", |b| {
        let sink = NullSink;
        let mut acc = ViolationAccumulator::new(6.0, Duration::from_secs(45));
        let mut now = 0u64;
        b.iter(|| {
            now += 16;
            black_box(acc.add_violation(&sink, "bench", 0.5, now, "bench"))
        });
    });
}

criterion_group!(benches, bench_rolling_insert, bench_accumulator);
criterion_main!(benches);
