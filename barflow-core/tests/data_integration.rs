//! Integration tests across sources, the quality gate, the feature engine
//! and the stores.

use barflow_core::data::{
    symbol_tags, write_csv, BarSource, BarStore, CsvSource, MemoryStore, ParquetStore,
    SyntheticSource,
};
use barflow_core::domain::Interval;
use barflow_core::features::{FeatureEngine, FeatureSet};
use barflow_core::quality::QualityGate;
use chrono::{DateTime, TimeZone, Utc};

fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

const M: &str = "market_data_1d";

#[test]
fn synthetic_series_passes_both_gates_and_round_trips_through_parquet() {
    let source = SyntheticSource::new();
    let raw = source
        .fetch("SPY", utc(2023, 6, 1), utc(2024, 6, 1), Interval::Day1)
        .unwrap();
    assert!(raw.len() > 200);

    let gate = QualityGate::default();
    gate.gate_raw(&raw, Interval::Day1).unwrap();

    let engine = FeatureEngine::new(&FeatureSet::default()).unwrap();
    let enriched = engine.compute(&raw);
    gate.gate_enriched(&enriched, engine.output_keys()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = ParquetStore::new(dir.path());
    let tags = symbol_tags("SPY");
    assert_eq!(store.write(M, &enriched, &tags).unwrap(), enriched.len());

    // Spans two calendar years
    let part = dir.path().join(M).join("symbol=SPY");
    assert!(part.join("2023.parquet").exists());
    assert!(part.join("2024.parquet").exists());

    let back = store.read(M, utc(2023, 1, 1), utc(2024, 12, 31), &tags).unwrap();
    assert_eq!(back.content_hash(), enriched.content_hash());

    let meta = store.meta(M, &tags).unwrap();
    assert_eq!(meta.rows, enriched.len());
    assert_eq!(meta.content_hash, enriched.content_hash());
    assert_eq!(meta.columns.len(), engine.output_keys().len());
}

#[test]
fn rewriting_the_same_window_is_idempotent() {
    let source = SyntheticSource::new();
    let engine = FeatureEngine::new(&FeatureSet::default()).unwrap();
    let enriched = engine.compute(
        &source
            .fetch("QQQ", utc(2024, 1, 1), utc(2024, 9, 1), Interval::Day1)
            .unwrap(),
    );

    let store = MemoryStore::new();
    let tags = symbol_tags("QQQ");
    store.write(M, &enriched, &tags).unwrap();
    let first = store.read(M, utc(2024, 1, 1), utc(2024, 12, 31), &tags).unwrap();
    store.write(M, &enriched, &tags).unwrap();
    let second = store.read(M, utc(2024, 1, 1), utc(2024, 12, 31), &tags).unwrap();

    assert_eq!(first.content_hash(), second.content_hash());
    assert_eq!(store.total_rows(), enriched.len());
}

#[test]
fn csv_export_feeds_the_csv_source() {
    let raw = SyntheticSource::new()
        .fetch("IWM", utc(2024, 1, 1), utc(2024, 3, 1), Interval::Day1)
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("IWM.csv"), write_csv(&raw).unwrap()).unwrap();

    let back = CsvSource::new(dir.path())
        .fetch("IWM", utc(2024, 1, 1), utc(2024, 3, 1), Interval::Day1)
        .unwrap();
    assert_eq!(back.len(), raw.len());
    for (a, b) in back.bars().iter().zip(raw.bars()) {
        assert_eq!(a.timestamp, b.timestamp);
        assert_eq!(a.close, b.close);
    }
}
