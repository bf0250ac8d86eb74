//! Benchmarks for offset lookups.
//!
//! Run with: cargo bench
//!
//! Results are saved to `target/criterion/` with HTML reports.
#![allow(clippy::expect_used, clippy::cast_precision_loss)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sheettext::layout::OffsetIndex;
use sheettext::{OffsetsData, RenderConfig};

/// Index with `count` resized columns and rows spread around the origin.
fn sparse_index(count: i64) -> OffsetIndex {
    let sizes: Vec<(i64, f64)> = (-count / 2..count / 2)
        .map(|i| (i * 37, 20.0 + (i.rem_euclid(13) * 7) as f64))
        .collect();
    let mut index = OffsetIndex::from_config(&RenderConfig::default());
    index
        .load(&OffsetsData {
            columns: sizes.clone(),
            rows: sizes,
        })
        .expect("Failed to load offsets");
    index
}

fn bench_placement(c: &mut Criterion) {
    let mut group = c.benchmark_group("column_placement");
    for count in [0, 1_000, 100_000] {
        let index = sparse_index(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &index, |b, index| {
            b.iter(|| index.column_placement(black_box(1_234_567)));
        });
    }
    group.finish();
}

fn bench_index_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("row_index");
    for count in [0, 1_000, 100_000] {
        let index = sparse_index(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &index, |b, index| {
            // vary the position so the cache does not answer every lookup
            let mut y = -5_000_000.0;
            b.iter(|| {
                y += 997.0;
                index.row_index(black_box(y))
            });
        });
    }
    group.finish();
}

fn bench_screen_rectangle(c: &mut Criterion) {
    let index = sparse_index(10_000);
    c.bench_function("screen_rectangle_tile", |b| {
        b.iter(|| index.screen_rectangle(black_box(-150), black_box(3_000), 15, 30));
    });
}

criterion_group!(
    benches,
    bench_placement,
    bench_index_lookup,
    bench_screen_rectangle
);
criterion_main!(benches);
