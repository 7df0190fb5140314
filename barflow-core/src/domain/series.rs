//! Bar series and feature columns.

use super::bar::Bar;
use super::feature_key::{Column, FeatureKey};
use super::interval::Interval;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Per-bar values of one derived feature; `None` where undefined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureColumn(Vec<Option<f64>>);

impl FeatureColumn {
    pub fn new(values: Vec<Option<f64>>) -> Self {
        Self(values)
    }

    /// Kernels mark undefined positions with NaN; map them to `None`.
    pub fn from_nan_padded(values: Vec<f64>) -> Self {
        Self(
            values
                .into_iter()
                .map(|v| if v.is_nan() { None } else { Some(v) })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied().flatten()
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.0
    }

    /// Index of the first defined value.
    pub fn first_defined(&self) -> Option<usize> {
        self.0.iter().position(Option::is_some)
    }

    /// Undefined positions after the first defined one (warm-up excluded).
    pub fn gaps_after_warmup(&self) -> usize {
        match self.first_defined() {
            Some(start) => self.0[start..].iter().filter(|v| v.is_none()).count(),
            None => 0,
        }
    }

    pub fn is_all_undefined(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("feature column '{0}' already exists")]
    DuplicateFeature(FeatureKey),

    #[error("feature column '{key}' has {actual} values but the series has {expected} bars")]
    LengthMismatch {
        key: FeatureKey,
        expected: usize,
        actual: usize,
    },
}

/// A symbol's bars at one interval plus any derived feature columns.
///
/// Bars are kept sorted by timestamp. Duplicate timestamps are preserved so
/// the quality gate can reject them rather than silently merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarSeries {
    symbol: String,
    interval: Interval,
    bars: Vec<Bar>,
    features: BTreeMap<FeatureKey, FeatureColumn>,
}

impl BarSeries {
    pub fn new(symbol: impl Into<String>, interval: Interval, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        Self {
            symbol: symbol.into(),
            interval,
            bars,
            features: BTreeMap::new(),
        }
    }

    pub fn empty(symbol: impl Into<String>, interval: Interval) -> Self {
        Self::new(symbol, interval, Vec::new())
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.bars.first().map(|b| b.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.bars.last().map(|b| b.timestamp)
    }

    pub fn timestamps(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.bars.iter().map(|b| b.timestamp)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn features(&self) -> &BTreeMap<FeatureKey, FeatureColumn> {
        &self.features
    }

    pub fn feature(&self, key: &FeatureKey) -> Option<&FeatureColumn> {
        self.features.get(key)
    }

    pub fn has_feature(&self, key: &FeatureKey) -> bool {
        self.features.contains_key(key)
    }

    /// Attach a feature column. Existing columns are never overwritten.
    pub fn insert_feature(
        &mut self,
        key: FeatureKey,
        column: FeatureColumn,
    ) -> Result<(), SeriesError> {
        if self.features.contains_key(&key) {
            return Err(SeriesError::DuplicateFeature(key));
        }
        if column.len() != self.bars.len() {
            return Err(SeriesError::LengthMismatch {
                key,
                expected: self.bars.len(),
                actual: column.len(),
            });
        }
        self.features.insert(key, column);
        Ok(())
    }

    /// Whether the named column is present.
    pub fn has_column(&self, column: &Column) -> bool {
        match column {
            Column::Feature(key) => self.has_feature(key),
            _ => true,
        }
    }

    /// Raw values of an OHLCV column; `None` for feature columns.
    pub fn raw_values(&self, column: &Column) -> Option<Vec<f64>> {
        let pick: fn(&Bar) -> f64 = match column {
            Column::Open => |b| b.open,
            Column::High => |b| b.high,
            Column::Low => |b| b.low,
            Column::Close => |b| b.close,
            Column::Volume => |b| b.volume,
            Column::Feature(_) => return None,
        };
        Some(self.bars.iter().map(pick).collect())
    }

    /// Bars with timestamps in `[start, end]`, feature columns sliced alike.
    pub fn slice_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> BarSeries {
        let lo = self.bars.partition_point(|b| b.timestamp < start);
        let hi = self.bars.partition_point(|b| b.timestamp <= end).max(lo);
        let features = self
            .features
            .iter()
            .map(|(k, col)| (*k, FeatureColumn::new(col.values()[lo..hi].to_vec())))
            .collect();
        BarSeries {
            symbol: self.symbol.clone(),
            interval: self.interval,
            bars: self.bars[lo..hi].to_vec(),
            features,
        }
    }

    /// BLAKE3 over symbol, interval, bars and feature columns in key order.
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.symbol.as_bytes());
        hasher.update(self.interval.as_str().as_bytes());
        for bar in &self.bars {
            hasher.update(&bar.timestamp.timestamp_millis().to_le_bytes());
            hasher.update(&bar.open.to_le_bytes());
            hasher.update(&bar.high.to_le_bytes());
            hasher.update(&bar.low.to_le_bytes());
            hasher.update(&bar.close.to_le_bytes());
            hasher.update(&bar.volume.to_le_bytes());
        }
        for (key, column) in &self.features {
            hasher.update(key.column_name().as_bytes());
            for value in column.values() {
                match value {
                    Some(v) => {
                        hasher.update(&[1]);
                        hasher.update(&v.to_le_bytes());
                    }
                    None => {
                        hasher.update(&[0]);
                    }
                }
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}
