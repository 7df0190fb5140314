//! Parquet store with Hive-style partitioning.
//!
//! Layout: `{root}/{measurement}/{k}={v}/.../{year}.parquet`, tags in key
//! order, one file per calendar year.
//!
//! - Atomic writes (write to .tmp, rename into place)
//! - Merge-on-write upsert keyed on timestamp
//! - Files that fail to load are quarantined (`{file}.quarantined`)
//! - `meta.json` sidecar per partition (range, rows, columns, hash)

use chrono::{DateTime, Datelike, Utc};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::store::{validate_key, BarStore, PartitionMeta, Row, RowSet, StoreError, Tags};
use crate::domain::{Bar, BarSeries, FeatureKey, Interval};

const META_FILE: &str = "meta.json";
const BASE_COLUMNS: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

pub struct ParquetStore {
    root: PathBuf,
}

impl ParquetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_dir(&self, measurement: &str, tags: &Tags) -> PathBuf {
        let mut dir = self.root.join(measurement);
        for (k, v) in tags {
            dir.push(format!("{k}={v}"));
        }
        dir
    }

    fn year_path(dir: &Path, year: i32) -> PathBuf {
        dir.join(format!("{year}.parquet"))
    }

    /// Year files in a partition, ascending.
    fn year_files(dir: &Path) -> Result<Vec<(i32, PathBuf)>, StoreError> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }
            if let Some(year) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<i32>().ok())
            {
                files.push((year, path));
            }
        }
        files.sort();
        Ok(files)
    }

    /// Load one year file, quarantining it when unreadable.
    fn load_or_quarantine(path: &Path) -> RowSet {
        match read_rows(path) {
            Ok(rows) => rows,
            Err(e) => {
                let quarantine = path.with_extension("parquet.quarantined");
                warn!(path = %path.display(), error = %e, "quarantining corrupt partition file");
                if let Err(rename_err) = fs::rename(path, &quarantine) {
                    warn!(path = %path.display(), error = %rename_err, "quarantine rename failed");
                }
                RowSet::default()
            }
        }
    }

    fn load_partition(dir: &Path) -> Result<RowSet, StoreError> {
        let mut all = RowSet::default();
        for (_, path) in Self::year_files(dir)? {
            all.upsert(Self::load_or_quarantine(&path));
        }
        Ok(all)
    }

    fn write_year(path: &Path, rows: &RowSet) -> Result<(), StoreError> {
        if rows.is_empty() {
            if path.exists() {
                fs::remove_file(path)?;
            }
            return Ok(());
        }
        let tmp_path = path.with_extension("parquet.tmp");
        write_rows(&tmp_path, rows)?;
        fs::rename(&tmp_path, path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Io(e)
        })
    }

    /// Rewrite (or remove) the sidecar from the partition's current content.
    fn refresh_meta(
        dir: &Path,
        measurement: &str,
        tags: &Tags,
        symbol: &str,
        interval: Interval,
    ) -> Result<(), StoreError> {
        let meta_path = dir.join(META_FILE);
        let rows = Self::load_partition(dir)?;
        if rows.is_empty() {
            if meta_path.exists() {
                fs::remove_file(meta_path)?;
            }
            return Ok(());
        }
        let columns = rows.columns.iter().map(FeatureKey::column_name).collect();
        let row_count = rows.len();
        let series = rows.into_series(symbol, interval)?;
        let (Some(start), Some(end)) = (series.first_timestamp(), series.last_timestamp()) else {
            return Ok(());
        };
        let meta = PartitionMeta {
            measurement: measurement.to_string(),
            tags: tags.clone(),
            interval,
            start,
            end,
            rows: row_count,
            columns,
            content_hash: series.content_hash(),
            written_at: Utc::now(),
        };
        let tmp = meta_path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&meta)?)?;
        fs::rename(&tmp, &meta_path)?;
        Ok(())
    }

    /// Sidecar for one partition, if present and readable.
    pub fn meta(&self, measurement: &str, tags: &Tags) -> Option<PartitionMeta> {
        let path = self.partition_dir(measurement, tags).join(META_FILE);
        let content = fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }
}

impl BarStore for ParquetStore {
    fn write(&self, measurement: &str, series: &BarSeries, tags: &Tags) -> Result<usize, StoreError> {
        let (interval, symbol) = validate_key(measurement, tags)?;
        if series.is_empty() {
            return Ok(0);
        }
        let dir = self.partition_dir(measurement, tags);
        fs::create_dir_all(&dir)?;

        let incoming = RowSet::from_series(series);
        let mut by_year: BTreeMap<i32, RowSet> = BTreeMap::new();
        for (ts, row) in incoming.rows {
            let year_set = by_year.entry(ts.year()).or_insert_with(|| RowSet {
                columns: incoming.columns.clone(),
                rows: BTreeMap::new(),
            });
            year_set.rows.insert(ts, row);
        }

        let mut written = 0;
        for (year, rows) in by_year {
            let path = Self::year_path(&dir, year);
            let mut existing = if path.exists() {
                Self::load_or_quarantine(&path)
            } else {
                RowSet::default()
            };
            written += existing.upsert(rows);
            Self::write_year(&path, &existing)?;
        }

        Self::refresh_meta(&dir, measurement, tags, &symbol, interval)?;
        debug!(%measurement, %symbol, rows = written, "parquet write");
        Ok(written)
    }

    fn read(
        &self,
        measurement: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        tags: &Tags,
    ) -> Result<BarSeries, StoreError> {
        let (interval, symbol) = validate_key(measurement, tags)?;
        if start > end {
            return Ok(BarSeries::empty(symbol, interval));
        }
        let dir = self.partition_dir(measurement, tags);
        let mut all = RowSet::default();
        for (year, path) in Self::year_files(&dir)? {
            if year < start.year() || year > end.year() {
                continue;
            }
            all.upsert(Self::load_or_quarantine(&path));
        }
        all.range(start, end).into_series(&symbol, interval)
    }

    fn delete(
        &self,
        measurement: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        tags: &Tags,
    ) -> Result<usize, StoreError> {
        let (interval, symbol) = validate_key(measurement, tags)?;
        let dir = self.partition_dir(measurement, tags);
        let mut removed = 0;
        for (year, path) in Self::year_files(&dir)? {
            if year < start.year() || year > end.year() {
                continue;
            }
            let mut rows = Self::load_or_quarantine(&path);
            let n = rows.remove_range(start, end);
            if n > 0 {
                Self::write_year(&path, &rows)?;
                removed += n;
            }
        }
        if removed > 0 {
            Self::refresh_meta(&dir, measurement, tags, &symbol, interval)?;
        }
        debug!(%measurement, %symbol, rows = removed, "parquet delete");
        Ok(removed)
    }

    fn list_measurements(&self) -> Result<Vec<String>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if Interval::from_measurement(name).is_some() {
                    out.push(name.to_string());
                }
            }
        }
        out.sort();
        Ok(out)
    }

    fn partitions(&self, measurement: &str) -> Result<Vec<PartitionMeta>, StoreError> {
        let mut metas = Vec::new();
        let mut stack = vec![self.root.join(measurement)];
        while let Some(dir) = stack.pop() {
            if !dir.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    stack.push(path);
                } else if path.file_name().and_then(|n| n.to_str()) == Some(META_FILE) {
                    match serde_json::from_str::<PartitionMeta>(&fs::read_to_string(&path)?) {
                        Ok(meta) => metas.push(meta),
                        Err(e) => warn!(path = %path.display(), error = %e, "unreadable meta.json"),
                    }
                }
            }
        }
        metas.sort_by(|a, b| a.tags.cmp(&b.tags));
        Ok(metas)
    }

    fn latest_timestamp(&self, measurement: &str, tags: &Tags) -> Result<Option<DateTime<Utc>>, StoreError> {
        validate_key(measurement, tags)?;
        let dir = self.partition_dir(measurement, tags);
        for (_, path) in Self::year_files(&dir)?.into_iter().rev() {
            if let Some(ts) = Self::load_or_quarantine(&path).latest() {
                return Ok(Some(ts));
            }
        }
        Ok(None)
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn polars_err(context: &str) -> impl Fn(PolarsError) -> StoreError + '_ {
    move |e| StoreError::Parquet(format!("{context}: {e}"))
}

fn rows_to_dataframe(rows: &RowSet) -> Result<DataFrame, StoreError> {
    let bars: Vec<&Bar> = rows.rows.values().map(|r| &r.bar).collect();
    let millis: Vec<i64> = bars.iter().map(|b| b.timestamp.timestamp_millis()).collect();
    let pick = |f: fn(&Bar) -> f64| -> Vec<f64> { bars.iter().map(|b| f(b)).collect() };

    let mut columns = vec![
        Column::new("timestamp".into(), millis)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .map_err(polars_err("timestamp cast"))?,
        Column::new("open".into(), pick(|b| b.open)),
        Column::new("high".into(), pick(|b| b.high)),
        Column::new("low".into(), pick(|b| b.low)),
        Column::new("close".into(), pick(|b| b.close)),
        Column::new("volume".into(), pick(|b| b.volume)),
    ];
    for key in &rows.columns {
        let values: Vec<Option<f64>> = rows.rows.values().map(|r| r.features.get(key).copied()).collect();
        columns.push(Column::new(key.column_name().into(), values));
    }

    DataFrame::new(columns).map_err(polars_err("dataframe creation"))
}

fn write_rows(path: &Path, rows: &RowSet) -> Result<(), StoreError> {
    let mut df = rows_to_dataframe(rows)?;
    let file = fs::File::create(path)?;
    ParquetWriter::new(file)
        .finish(&mut df)
        .map_err(polars_err("write parquet"))?;
    Ok(())
}

fn read_rows(path: &Path) -> Result<RowSet, StoreError> {
    let file = fs::File::open(path)?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(polars_err("read parquet"))?;

    for name in BASE_COLUMNS {
        if df.column(name).is_err() {
            return Err(StoreError::Corrupt(format!("missing column '{name}'")));
        }
    }

    let millis = df
        .column("timestamp")
        .and_then(|c| c.cast(&DataType::Int64))
        .map_err(polars_err("timestamp column"))?;
    let millis = millis.i64().map_err(polars_err("timestamp type"))?;

    let float_column = |name: &str| -> Result<Vec<Option<f64>>, StoreError> {
        let col = df.column(name).map_err(polars_err(name))?;
        let ca = col.f64().map_err(polars_err(name))?;
        Ok((0..df.height()).map(|i| ca.get(i)).collect())
    };
    let opens = float_column("open")?;
    let highs = float_column("high")?;
    let lows = float_column("low")?;
    let closes = float_column("close")?;
    let volumes = float_column("volume")?;

    let mut features: Vec<(FeatureKey, Vec<Option<f64>>)> = Vec::new();
    for name in df.get_column_names() {
        let name = name.as_str();
        if BASE_COLUMNS.contains(&name) {
            continue;
        }
        match FeatureKey::from_column_name(name) {
            Some(key) => features.push((key, float_column(name)?)),
            None => warn!(path = %path.display(), column = name, "ignoring unknown column"),
        }
    }

    let mut out = RowSet {
        columns: features.iter().map(|(k, _)| *k).collect(),
        rows: BTreeMap::new(),
    };
    let nan = |v: Option<f64>| v.unwrap_or(f64::NAN);
    for i in 0..df.height() {
        let ms = millis
            .get(i)
            .ok_or_else(|| StoreError::Corrupt(format!("null timestamp at row {i}")))?;
        let timestamp = DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range at row {i}")))?;
        let bar = Bar {
            timestamp,
            open: nan(opens[i]),
            high: nan(highs[i]),
            low: nan(lows[i]),
            close: nan(closes[i]),
            volume: nan(volumes[i]),
        };
        let row_features = features
            .iter()
            .filter_map(|(k, values)| values[i].map(|v| (*k, v)))
            .collect();
        out.rows.insert(
            timestamp,
            Row {
                bar,
                features: row_features,
            },
        );
    }
    Ok(out)
}
