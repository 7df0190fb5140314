//! Store trait, tag sets and the timestamp-keyed row set the stores share.
//!
//! Series live under a measurement (`market_data_{interval}`) and a tag set
//! that must include `symbol`. Writes upsert by timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::domain::{Bar, BarSeries, FeatureColumn, FeatureKey, Interval};

/// Tag set identifying a partition within a measurement.
pub type Tags = BTreeMap<String, String>;

pub const SYMBOL_TAG: &str = "symbol";

/// Tags for a single symbol.
pub fn symbol_tags(symbol: &str) -> Tags {
    let mut tags = Tags::new();
    tags.insert(SYMBOL_TAG.to_string(), symbol.to_string());
    tags
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("missing required tag '{0}'")]
    MissingTag(String),

    #[error("invalid tag {key}={value:?}")]
    InvalidTag { key: String, value: String },

    #[error("invalid measurement '{0}', expected market_data_{{interval}}")]
    InvalidMeasurement(String),

    #[error("corrupt partition: {0}")]
    Corrupt(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Summary of one stored partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionMeta {
    pub measurement: String,
    pub tags: Tags,
    pub interval: Interval,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub rows: usize,
    pub columns: Vec<String>,
    /// BLAKE3 of the stored series.
    pub content_hash: String,
    pub written_at: DateTime<Utc>,
}

/// Persistent time-series store for bar series.
pub trait BarStore: Send + Sync {
    /// Upsert `series` keyed on timestamp. Returns rows written.
    fn write(&self, measurement: &str, series: &BarSeries, tags: &Tags) -> Result<usize, StoreError>;

    /// Rows with timestamps in `[start, end]`. Empty when nothing is stored.
    fn read(
        &self,
        measurement: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        tags: &Tags,
    ) -> Result<BarSeries, StoreError>;

    /// Remove rows in `[start, end]`. Returns rows removed.
    fn delete(
        &self,
        measurement: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        tags: &Tags,
    ) -> Result<usize, StoreError>;

    fn list_measurements(&self) -> Result<Vec<String>, StoreError>;

    /// Partitions of a measurement, ordered by tags.
    fn partitions(&self, measurement: &str) -> Result<Vec<PartitionMeta>, StoreError>;

    fn latest_timestamp(&self, measurement: &str, tags: &Tags) -> Result<Option<DateTime<Utc>>, StoreError>;
}

/// Check measurement and tags; return the interval and symbol they name.
pub fn validate_key(measurement: &str, tags: &Tags) -> Result<(Interval, String), StoreError> {
    let interval = Interval::from_measurement(measurement)
        .ok_or_else(|| StoreError::InvalidMeasurement(measurement.to_string()))?;
    for (key, value) in tags {
        let bad = |s: &str| {
            s.is_empty() || s.starts_with('.') || s.contains(['/', '\\', '=', '\0'])
        };
        if bad(key) || bad(value) {
            return Err(StoreError::InvalidTag {
                key: key.clone(),
                value: value.clone(),
            });
        }
    }
    let symbol = tags
        .get(SYMBOL_TAG)
        .cloned()
        .ok_or_else(|| StoreError::MissingTag(SYMBOL_TAG.to_string()))?;
    Ok((interval, symbol))
}

/// One stored row: the bar plus its defined feature values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub bar: Bar,
    pub features: BTreeMap<FeatureKey, f64>,
}

/// Rows keyed by timestamp plus the set of feature columns they carry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: BTreeSet<FeatureKey>,
    pub rows: BTreeMap<DateTime<Utc>, Row>,
}

impl RowSet {
    /// Later rows win when the series repeats a timestamp.
    pub fn from_series(series: &BarSeries) -> Self {
        let columns: BTreeSet<FeatureKey> = series.features().keys().copied().collect();
        let mut rows = BTreeMap::new();
        for (i, bar) in series.bars().iter().enumerate() {
            let features = series
                .features()
                .iter()
                .filter_map(|(k, col)| col.get(i).map(|v| (*k, v)))
                .collect();
            rows.insert(bar.timestamp, Row { bar: *bar, features });
        }
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Replace rows with matching timestamps, add the rest. Returns the
    /// number of incoming rows.
    pub fn upsert(&mut self, incoming: RowSet) -> usize {
        let written = incoming.rows.len();
        self.columns.extend(incoming.columns);
        self.rows.extend(incoming.rows);
        written
    }

    pub fn range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> RowSet {
        if start > end {
            return RowSet {
                columns: self.columns.clone(),
                rows: BTreeMap::new(),
            };
        }
        RowSet {
            columns: self.columns.clone(),
            rows: self
                .rows
                .range(start..=end)
                .map(|(ts, row)| (*ts, row.clone()))
                .collect(),
        }
    }

    /// Drop rows in `[start, end]`; returns how many went.
    pub fn remove_range(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> usize {
        let before = self.rows.len();
        self.rows.retain(|ts, _| *ts < start || *ts > end);
        before - self.rows.len()
    }

    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.rows.keys().next_back().copied()
    }

    pub fn into_series(self, symbol: &str, interval: Interval) -> Result<BarSeries, StoreError> {
        let bars: Vec<Bar> = self.rows.values().map(|r| r.bar).collect();
        let mut series = BarSeries::new(symbol, interval, bars);
        for key in &self.columns {
            let values = self
                .rows
                .values()
                .map(|r| r.features.get(key).copied())
                .collect();
            series
                .insert_feature(*key, FeatureColumn::new(values))
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        }
        Ok(series)
    }
}
