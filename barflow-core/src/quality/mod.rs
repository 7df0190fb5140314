//! Quality Gate: structural and plausibility checks on bar series.
//!
//! The raw gate runs before features are derived, the enriched gate after.
//! Each gate reports the first failing check.

pub mod checks;

pub use checks::{
    check_continuity, check_price_validity, check_quality, check_volume_validity,
    count_missing_grid_points, find_price_violation, find_volume_violation, missing_fraction,
    PriceViolation, VolumeViolation,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{BarSeries, Column, FeatureKey, Interval};

/// Tunable limits for every check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// Largest accepted absolute bar-to-bar fractional change per price column.
    pub max_price_change: f64,
    /// Volume above this multiple of its trailing mean is a spike.
    pub volume_spike_multiple: f64,
    /// Trailing window for the volume mean, current bar included.
    pub volume_window: usize,
    pub max_missing_fraction: f64,
    pub min_rows: usize,
    /// `None` skips the continuity check.
    pub max_gaps: Option<usize>,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            max_price_change: 0.50,
            volume_spike_multiple: 10.0,
            volume_window: 20,
            max_missing_fraction: 0.05,
            min_rows: 100,
            max_gaps: None,
        }
    }
}

/// Reason a series was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum QualityIssue {
    #[error("series is empty")]
    Empty,

    #[error("{rows} rows, at least {min_rows} required")]
    InsufficientRows { rows: usize, min_rows: usize },

    #[error("missing columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("{count} duplicate timestamps")]
    DuplicateTimestamps { count: usize },

    #[error("column {column} is {:.1}% missing (max {:.1}%)", fraction * 100.0, max * 100.0)]
    ExcessiveMissing {
        column: String,
        fraction: f64,
        max: f64,
    },

    #[error("{missing} missing bars exceed the allowed {max_gaps}")]
    Discontinuous { missing: usize, max_gaps: usize },

    #[error("invalid prices: {0}")]
    InvalidPrice(PriceViolation),

    #[error("invalid volume: {0}")]
    InvalidVolume(VolumeViolation),

    #[error("column {column} has a non-finite value at row {index}")]
    NonFiniteFeature { column: String, index: usize },
}

/// Pass/fail with the first failure's reason.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    pub reason: Option<QualityIssue>,
}

impl ValidationResult {
    pub fn pass() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn fail(issue: QualityIssue) -> Self {
        Self {
            valid: false,
            reason: Some(issue),
        }
    }

    pub fn into_result(self) -> Result<(), QualityIssue> {
        match self.reason {
            Some(issue) => Err(issue),
            None => Ok(()),
        }
    }
}

/// Thresholds bundled with the two composite gates.
#[derive(Debug, Clone, Default)]
pub struct QualityGate {
    thresholds: QualityThresholds,
}

impl QualityGate {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &QualityThresholds {
        &self.thresholds
    }

    /// Structure and completeness of OHLCV, then continuity (when a gap
    /// limit is set), then prices, then volume.
    pub fn gate_raw(&self, series: &BarSeries, interval: Interval) -> Result<(), QualityIssue> {
        let t = &self.thresholds;

        check_quality(series, &Column::OHLCV, t.min_rows, t.max_missing_fraction)
            .into_result()?;

        if let Some(max_gaps) = t.max_gaps {
            if !check_continuity(series, interval, max_gaps) {
                let missing = count_missing_grid_points(series, interval, usize::MAX);
                return Err(QualityIssue::Discontinuous { missing, max_gaps });
            }
        }

        if let Some(v) = find_price_violation(series, t) {
            return Err(QualityIssue::InvalidPrice(v));
        }

        if let Some(v) = find_volume_violation(series, t) {
            return Err(QualityIssue::InvalidVolume(v));
        }

        debug!(symbol = series.symbol(), rows = series.len(), "raw gate passed");
        Ok(())
    }

    /// OHLCV structure and completeness as in the raw gate, then every
    /// derived column must be present and hold only finite values.
    ///
    /// The missing-fraction limit covers OHLCV only: a rolling indicator
    /// turns one missing input into a whole window of undefined outputs.
    pub fn gate_enriched(
        &self,
        series: &BarSeries,
        feature_keys: &[FeatureKey],
    ) -> Result<(), QualityIssue> {
        let t = &self.thresholds;

        check_quality(series, &Column::OHLCV, t.min_rows, t.max_missing_fraction)
            .into_result()?;

        let absent: Vec<String> = feature_keys
            .iter()
            .filter(|k| !series.has_feature(k))
            .map(FeatureKey::column_name)
            .collect();
        if !absent.is_empty() {
            return Err(QualityIssue::MissingColumns(absent));
        }

        for key in feature_keys {
            let non_finite = series.feature(key).and_then(|col| {
                col.values()
                    .iter()
                    .position(|v| v.is_some_and(|x| !x.is_finite()))
            });
            if let Some(index) = non_finite {
                return Err(QualityIssue::NonFiniteFeature {
                    column: key.column_name(),
                    index,
                });
            }
        }

        debug!(
            symbol = series.symbol(),
            features = feature_keys.len(),
            "enriched gate passed"
        );
        Ok(())
    }
}
