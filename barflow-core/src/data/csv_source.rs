//! CSV import and export.
//!
//! Import layout: `{dir}/{SYMBOL}.csv` with header
//! `timestamp,open,high,low,close,volume`. Empty cells read as missing.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::provider::{BarSource, DataError};
use crate::domain::{Bar, BarSeries, Interval};

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "date", alias = "Date", alias = "Timestamp")]
    timestamp: String,
    #[serde(alias = "Open")]
    open: Option<f64>,
    #[serde(alias = "High")]
    high: Option<f64>,
    #[serde(alias = "Low")]
    low: Option<f64>,
    #[serde(alias = "Close")]
    close: Option<f64>,
    #[serde(alias = "Volume")]
    volume: Option<f64>,
}

/// Reads bars from per-symbol CSV files.
#[derive(Debug, Clone)]
pub struct CsvSource {
    dir: PathBuf,
}

impl CsvSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}.csv"))
    }

    fn read_bars(path: &Path) -> Result<Vec<Bar>, DataError> {
        let csv_err = |message: String| DataError::Csv {
            path: path.display().to_string(),
            message,
        };

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| csv_err(e.to_string()))?;

        let mut bars = Vec::new();
        for (line, record) in reader.deserialize::<CsvRow>().enumerate() {
            let row = record.map_err(|e| csv_err(e.to_string()))?;
            let timestamp = parse_timestamp(&row.timestamp)
                .ok_or_else(|| csv_err(format!("row {}: bad timestamp {:?}", line + 1, row.timestamp)))?;
            bars.push(Bar {
                timestamp,
                open: row.open.unwrap_or(f64::NAN),
                high: row.high.unwrap_or(f64::NAN),
                low: row.low.unwrap_or(f64::NAN),
                close: row.close.unwrap_or(f64::NAN),
                volume: row.volume.unwrap_or(f64::NAN),
            });
        }
        Ok(bars)
    }
}

impl BarSource for CsvSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> Result<BarSeries, DataError> {
        let path = self.path_for(symbol);
        if !path.exists() {
            debug!(symbol, path = %path.display(), "no CSV file");
            return Ok(BarSeries::empty(symbol, interval));
        }
        let bars = Self::read_bars(&path)?;
        let series = BarSeries::new(symbol, interval, bars).slice_range(start, end);
        debug!(symbol, rows = series.len(), "read CSV");
        Ok(series)
    }
}

/// RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Render a series as CSV: timestamp, OHLCV, then every feature column in
/// key order. Missing values are empty cells.
pub fn write_csv(series: &BarSeries) -> Result<String, DataError> {
    let to_err = |e: csv::Error| DataError::Csv {
        path: "<memory>".into(),
        message: e.to_string(),
    };
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header: Vec<String> = ["timestamp", "open", "high", "low", "close", "volume"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    header.extend(series.features().keys().map(|k| k.column_name()));
    wtr.write_record(&header).map_err(to_err)?;

    let cell = |v: f64| if v.is_nan() { String::new() } else { v.to_string() };
    for (i, bar) in series.bars().iter().enumerate() {
        let mut record = vec![
            bar.timestamp.to_rfc3339(),
            cell(bar.open),
            cell(bar.high),
            cell(bar.low),
            cell(bar.close),
            cell(bar.volume),
        ];
        record.extend(
            series
                .features()
                .values()
                .map(|col| col.get(i).map(cell).unwrap_or_default()),
        );
        wtr.write_record(&record).map_err(to_err)?;
    }

    let data = wtr
        .into_inner()
        .map_err(|e| DataError::Other(format!("failed to flush CSV writer: {e}")))?;
    String::from_utf8(data).map_err(|e| DataError::Other(format!("CSV output is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_support::make_series;
    use crate::domain::{FeatureColumn, FeatureKey};
    use chrono::TimeZone;
    use std::fs;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn parses_all_timestamp_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-01T14:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T15:30:00+01:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01 14:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01"), Some(utc(2024, 3, 1)));
        assert_eq!(parse_timestamp("03/01/2024"), None);
    }

    #[test]
    fn reads_and_filters_range() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("SPY.csv"),
            "timestamp,open,high,low,close,volume\n\
             2024-01-03,101,103,100,102,1100\n\
             2024-01-02,100,102,99,101,1000\n\
             2024-01-04,102,104,101,,1200\n",
        )
        .unwrap();
        let source = CsvSource::new(dir.path());

        let all = source
            .fetch("SPY", utc(2024, 1, 1), utc(2024, 12, 31), Interval::Day1)
            .unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all.first_timestamp(), Some(utc(2024, 1, 2)));
        assert!(all.bars()[2].close.is_nan());

        let window = source
            .fetch("SPY", utc(2024, 1, 3), utc(2024, 1, 3), Interval::Day1)
            .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window.bars()[0].close, 102.0);
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let series = CsvSource::new(dir.path())
            .fetch("NOPE", utc(2024, 1, 1), utc(2024, 2, 1), Interval::Day1)
            .unwrap();
        assert!(series.is_empty());
    }

    #[test]
    fn bad_timestamp_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("X.csv"),
            "timestamp,open,high,low,close,volume\nyesterday,1,1,1,1,1\n",
        )
        .unwrap();
        let result = CsvSource::new(dir.path()).fetch("X", utc(2024, 1, 1), utc(2024, 2, 1), Interval::Day1);
        assert!(matches!(result, Err(DataError::Csv { .. })));
    }

    #[test]
    fn write_then_read_preserves_bars() {
        let mut series = make_series("SPY", &[10.0, 11.0, 12.0]);
        series
            .insert_feature(FeatureKey::Obv, FeatureColumn::new(vec![None, Some(1.0), Some(2.0)]))
            .unwrap();
        let text = write_csv(&series).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("timestamp,open,high,low,close,volume,obv")
        );
        assert!(lines.next().unwrap().ends_with(",1000,"));

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("SPY.csv"), &text).unwrap();
        let back = CsvSource::new(dir.path())
            .fetch("SPY", utc(2024, 1, 1), utc(2024, 12, 31), Interval::Day1)
            .unwrap();
        assert_eq!(back.bars(), series.bars());
    }
}
