//! Criterion benchmarks for the feature path.
//!
//! Benchmarks:
//! 1. Individual indicator kernels
//! 2. Full feature engine over the default catalog
//! 3. Raw quality gate

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use barflow_core::data::synthetic::generate_walk;
use barflow_core::domain::{BarSeries, Interval};
use barflow_core::features::{FeatureEngine, FeatureSet};
use barflow_core::indicators::{adx, atr, bollinger, macd, obv, rsi, vwap};
use barflow_core::quality::{QualityGate, QualityThresholds};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_series(years: i32) -> BarSeries {
    let start = Utc.with_ymd_and_hms(2000, 1, 3, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2000 + years, 1, 3, 0, 0, 0).unwrap();
    BarSeries::new(
        "BENCH",
        Interval::Day1,
        generate_walk("BENCH", start, end, Interval::Day1),
    )
}

// ── 1. Kernels ───────────────────────────────────────────────────────

fn bench_kernels(c: &mut Criterion) {
    let series = make_series(10);
    let bars = series.bars();
    let closes = series.closes();

    let mut group = c.benchmark_group("kernels");
    group.bench_function("rsi_14", |b| b.iter(|| rsi(black_box(&closes), 14)));
    group.bench_function("macd_12_26_9", |b| {
        b.iter(|| macd(black_box(&closes), 12, 26, 9))
    });
    group.bench_function("adx_14", |b| b.iter(|| adx(black_box(bars), 14)));
    group.bench_function("atr_14", |b| b.iter(|| atr(black_box(bars), 14)));
    group.bench_function("bollinger_20", |b| {
        b.iter(|| bollinger(black_box(&closes), 20, 2.0))
    });
    group.bench_function("obv", |b| b.iter(|| obv(black_box(bars))));
    group.bench_function("vwap", |b| b.iter(|| vwap(black_box(bars))));
    group.finish();
}

// ── 2. Engine ────────────────────────────────────────────────────────

fn bench_engine(c: &mut Criterion) {
    let engine = FeatureEngine::new(&FeatureSet::default()).expect("default feature set");
    let mut group = c.benchmark_group("feature_engine");
    for years in [1, 5, 20] {
        let series = make_series(years);
        group.bench_with_input(BenchmarkId::new("default_catalog", years), &series, |b, s| {
            b.iter(|| engine.compute(black_box(s)))
        });
    }
    group.finish();
}

// ── 3. Quality gate ──────────────────────────────────────────────────

fn bench_gate(c: &mut Criterion) {
    let gate = QualityGate::new(QualityThresholds {
        max_gaps: Some(10_000),
        ..QualityThresholds::default()
    });
    let series = make_series(10);
    c.bench_function("gate_raw_10y", |b| {
        b.iter(|| gate.gate_raw(black_box(&series), Interval::Day1))
    });
}

criterion_group!(benches, bench_kernels, bench_engine, bench_gate);
criterion_main!(benches);
