//! Barflow Core: bar series model, quality gate, feature engine, sources and stores.
//!
//! This crate contains everything below the pipeline orchestrator:
//! - Domain types (bars, intervals, bar series, feature keys)
//! - Indicator kernels (RSI, MACD, ADX, ATR, Bollinger, Keltner, OBV, VWAP, CVD)
//! - Feature engine driven by a declarative feature set
//! - Quality gate for raw and enriched series
//! - Fetch sources (Yahoo, CSV, synthetic) and stores (Parquet, memory)

pub mod data;
pub mod domain;
pub mod features;
pub mod indicators;
pub mod quality;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types crossing worker threads are Send + Sync.
    ///
    /// The orchestrator fans symbols out across a thread pool, sharing the
    /// engine, gate, source and store by reference.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::BarSeries>();
        require_sync::<domain::BarSeries>();

        require_send::<features::FeatureEngine>();
        require_sync::<features::FeatureEngine>();
        require_send::<quality::QualityGate>();
        require_sync::<quality::QualityGate>();
        require_send::<quality::QualityIssue>();
        require_sync::<quality::QualityIssue>();

        require_send::<data::CircuitBreaker>();
        require_sync::<data::CircuitBreaker>();
        require_send::<data::YahooSource>();
        require_sync::<data::YahooSource>();
        require_send::<data::CsvSource>();
        require_sync::<data::CsvSource>();
        require_send::<data::ParquetStore>();
        require_sync::<data::ParquetStore>();
        require_send::<data::MemoryStore>();
        require_sync::<data::MemoryStore>();
        require_send::<data::DataError>();
        require_send::<data::StoreError>();
    }

    /// Sources and stores are used as trait objects by the orchestrator.
    #[test]
    fn sources_and_stores_are_object_safe() {
        fn _source(_: &dyn data::BarSource) {}
        fn _store(_: &dyn data::BarStore) {}
        _source(&data::SyntheticSource::new());
        _store(&data::MemoryStore::new());
    }
}
