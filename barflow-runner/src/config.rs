//! Pipeline configuration, loaded from TOML.
//!
//! ```toml
//! [collection]
//! interval = "1d"
//! symbols = ["AAPL", "MSFT"]
//! start_date = "2023-01-01"
//! end_date = "now"
//!
//! [source]
//! kind = "yahoo"
//!
//! [[features.momentum]]
//! name = "RSI"
//! periods = [14, 28]
//! ```
//!
//! Every field has a default, so a partial (or empty) file is valid.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use barflow_core::data::{
    BarSource, CircuitBreaker, CsvSource, DataError, SyntheticSource, YahooConfig, YahooSource,
};
use barflow_core::domain::{Interval, Symbol};
use barflow_core::features::{FeatureConfigError, FeatureEngine, FeatureSet};
use barflow_core::quality::QualityThresholds;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render TOML: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid feature configuration: {0}")]
    Features(#[from] FeatureConfigError),

    #[error("{0}")]
    Invalid(String),
}

/// A configured date, or the current time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DateBound {
    Date(NaiveDate),
    Now,
}

impl DateBound {
    /// As a range start: midnight UTC of the date.
    pub fn resolve_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            DateBound::Now => now,
            DateBound::Date(d) => d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()).unwrap_or(now),
        }
    }

    /// As a range end: the last second of the date.
    pub fn resolve_end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            DateBound::Now => now,
            DateBound::Date(d) => d
                .and_hms_opt(23, 59, 59)
                .map(|dt| dt.and_utc())
                .unwrap_or(now),
        }
    }
}

impl fmt::Display for DateBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateBound::Now => f.write_str("now"),
            DateBound::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl TryFrom<String> for DateBound {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s.eq_ignore_ascii_case("now") {
            return Ok(DateBound::Now);
        }
        NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map(DateBound::Date)
            .map_err(|_| format!("expected YYYY-MM-DD or \"now\", got {s:?}"))
    }
}

impl From<DateBound> for String {
    fn from(d: DateBound) -> Self {
        d.to_string()
    }
}

/// `[collection]`: what to fetch by default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    pub interval: Interval,
    pub symbols: Vec<Symbol>,
    pub start_date: DateBound,
    pub end_date: DateBound,
    /// Default window for `update`.
    pub lookback_days: u32,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval: Interval::Day1,
            symbols: vec!["AAPL".into(), "GOOGL".into(), "MSFT".into()],
            start_date: NaiveDate::from_ymd_opt(2023, 1, 1)
                .map(DateBound::Date)
                .unwrap_or(DateBound::Now),
            end_date: DateBound::Now,
            lookback_days: 180,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Yahoo,
    Csv,
    Synthetic,
}

/// `[source]`: where bars come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Directory of `{SYMBOL}.csv` files for the CSV source.
    pub csv_dir: PathBuf,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Yahoo,
            csv_dir: PathBuf::from("data/csv"),
            timeout_secs: 30,
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

impl SourceConfig {
    pub fn build(&self) -> Result<Arc<dyn BarSource>, DataError> {
        Ok(match self.kind {
            SourceKind::Yahoo => {
                let yahoo = YahooConfig {
                    timeout: Duration::from_secs(self.timeout_secs),
                    max_retries: self.max_retries,
                    base_delay: Duration::from_millis(self.retry_delay_ms),
                };
                Arc::new(YahooSource::new(yahoo, Arc::new(CircuitBreaker::default()))?)
            }
            SourceKind::Csv => Arc::new(CsvSource::new(&self.csv_dir)),
            SourceKind::Synthetic => Arc::new(SyntheticSource::new()),
        })
    }
}

/// `[store]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/store"),
        }
    }
}

/// `[pipeline]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Worker threads for the symbol fan-out; 1 runs sequentially.
    pub parallelism: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self { parallelism: 1 }
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub collection: CollectionConfig,
    pub source: SourceConfig,
    pub store: StoreConfig,
    pub quality: QualityThresholds,
    pub pipeline: ExecutionConfig,
    pub features: FeatureSet,
}

impl PipelineConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject settings no run could honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let q = &self.quality;
        if self.pipeline.parallelism == 0 {
            return Err(ConfigError::Invalid("pipeline.parallelism must be at least 1".into()));
        }
        if q.volume_window == 0 {
            return Err(ConfigError::Invalid("quality.volume_window must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&q.max_missing_fraction) {
            return Err(ConfigError::Invalid(format!(
                "quality.max_missing_fraction must be within [0, 1], got {}",
                q.max_missing_fraction
            )));
        }
        if !(q.max_price_change > 0.0) || !(q.volume_spike_multiple > 0.0) {
            return Err(ConfigError::Invalid(
                "quality.max_price_change and quality.volume_spike_multiple must be positive".into(),
            ));
        }
        if let (DateBound::Date(start), DateBound::Date(end)) =
            (self.collection.start_date, self.collection.end_date)
        {
            if start > end {
                return Err(ConfigError::Invalid(format!(
                    "collection.start_date {start} is after end_date {end}"
                )));
            }
        }
        FeatureEngine::new(&self.features)?;
        Ok(())
    }
}
