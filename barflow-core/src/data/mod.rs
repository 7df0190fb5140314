//! Fetch sources and bar stores.

pub mod circuit_breaker;
pub mod csv_source;
pub mod memory_store;
pub mod parquet_store;
pub mod provider;
pub mod store;
pub mod synthetic;
pub mod yahoo;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use csv_source::{write_csv, CsvSource};
pub use memory_store::MemoryStore;
pub use parquet_store::ParquetStore;
pub use provider::{BarSource, DataError};
pub use store::{symbol_tags, BarStore, PartitionMeta, StoreError, Tags, SYMBOL_TAG};
pub use synthetic::SyntheticSource;
pub use yahoo::{YahooConfig, YahooSource};
