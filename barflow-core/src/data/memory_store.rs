//! In-process store with the same upsert semantics as the Parquet store.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::store::{validate_key, BarStore, PartitionMeta, RowSet, StoreError, Tags};
use crate::domain::{BarSeries, FeatureKey};

struct Partition {
    rows: RowSet,
    written_at: DateTime<Utc>,
}

type Key = (String, Tags);

#[derive(Default)]
pub struct MemoryStore {
    partitions: Mutex<BTreeMap<Key, Partition>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<Key, Partition>> {
        self.partitions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Total stored rows across every partition.
    pub fn total_rows(&self) -> usize {
        self.lock().values().map(|p| p.rows.len()).sum()
    }
}

impl BarStore for MemoryStore {
    fn write(&self, measurement: &str, series: &BarSeries, tags: &Tags) -> Result<usize, StoreError> {
        validate_key(measurement, tags)?;
        if series.is_empty() {
            return Ok(0);
        }
        let mut partitions = self.lock();
        let partition = partitions
            .entry((measurement.to_string(), tags.clone()))
            .or_insert_with(|| Partition {
                rows: RowSet::default(),
                written_at: Utc::now(),
            });
        partition.written_at = Utc::now();
        Ok(partition.rows.upsert(RowSet::from_series(series)))
    }

    fn read(
        &self,
        measurement: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        tags: &Tags,
    ) -> Result<BarSeries, StoreError> {
        let (interval, symbol) = validate_key(measurement, tags)?;
        let partitions = self.lock();
        match partitions.get(&(measurement.to_string(), tags.clone())) {
            Some(p) => p.rows.range(start, end).into_series(&symbol, interval),
            None => Ok(BarSeries::empty(symbol, interval)),
        }
    }

    fn delete(
        &self,
        measurement: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        tags: &Tags,
    ) -> Result<usize, StoreError> {
        validate_key(measurement, tags)?;
        let mut partitions = self.lock();
        let key = (measurement.to_string(), tags.clone());
        let Some(partition) = partitions.get_mut(&key) else {
            return Ok(0);
        };
        let removed = partition.rows.remove_range(start, end);
        if partition.rows.is_empty() {
            partitions.remove(&key);
        }
        Ok(removed)
    }

    fn list_measurements(&self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self.lock().keys().map(|(m, _)| m.clone()).collect();
        names.dedup();
        Ok(names)
    }

    fn partitions(&self, measurement: &str) -> Result<Vec<PartitionMeta>, StoreError> {
        let partitions = self.lock();
        let mut out = Vec::new();
        for ((m, tags), p) in partitions.iter() {
            if m != measurement {
                continue;
            }
            let (interval, symbol) = validate_key(m, tags)?;
            let (Some(start), Some(end)) = (p.rows.rows.keys().next().copied(), p.rows.latest()) else {
                continue;
            };
            let series = p.rows.clone().into_series(&symbol, interval)?;
            out.push(PartitionMeta {
                measurement: m.clone(),
                tags: tags.clone(),
                interval,
                start,
                end,
                rows: p.rows.len(),
                columns: p.rows.columns.iter().map(FeatureKey::column_name).collect(),
                content_hash: series.content_hash(),
                written_at: p.written_at,
            });
        }
        Ok(out)
    }

    fn latest_timestamp(&self, measurement: &str, tags: &Tags) -> Result<Option<DateTime<Utc>>, StoreError> {
        validate_key(measurement, tags)?;
        Ok(self
            .lock()
            .get(&(measurement.to_string(), tags.clone()))
            .and_then(|p| p.rows.latest()))
    }
}
