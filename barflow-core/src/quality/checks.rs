//! Individual quality predicates over a bar series.
//!
//! Each `check_*` function answers pass/fail; the matching `find_*` function
//! reports the first offending bar so the gate can say why.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::{QualityIssue, QualityThresholds, ValidationResult};
use crate::domain::{BarSeries, Column, Interval};
use crate::indicators::rolling_mean;

/// Why a bar failed the price check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PriceViolation {
    Negative { index: usize, column: String },
    NonFinite { index: usize, column: String },
    InvertedRange { index: usize },
    ExcessiveChange { index: usize, column: String, change: f64 },
}

impl fmt::Display for PriceViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceViolation::Negative { index, column } => {
                write!(f, "negative {column} at row {index}")
            }
            PriceViolation::NonFinite { index, column } => {
                write!(f, "non-finite {column} at row {index}")
            }
            PriceViolation::InvertedRange { index } => {
                write!(f, "OHLC ordering violated at row {index}")
            }
            PriceViolation::ExcessiveChange {
                index,
                column,
                change,
            } => write!(f, "{column} moved {:.1}% at row {index}", change * 100.0),
        }
    }
}

/// Why a bar failed the volume check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VolumeViolation {
    Negative { index: usize },
    NonFinite { index: usize },
    Spike { index: usize, ratio: f64 },
}

impl fmt::Display for VolumeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolumeViolation::Negative { index } => write!(f, "negative volume at row {index}"),
            VolumeViolation::NonFinite { index } => write!(f, "non-finite volume at row {index}"),
            VolumeViolation::Spike { index, ratio } => {
                write!(f, "volume {ratio:.1}x its trailing mean at row {index}")
            }
        }
    }
}

// ── Continuity ───────────────────────────────────────────────────────

/// Grid points between the first and last bar that have no bar, counting
/// no further than `limit + 1`.
pub fn count_missing_grid_points(series: &BarSeries, interval: Interval, limit: usize) -> usize {
    let (Some(first), Some(last)) = (series.first_timestamp(), series.last_timestamp()) else {
        return 0;
    };
    let present: HashSet<DateTime<Utc>> = series.timestamps().collect();

    let mut missing = 0;
    let mut k: u32 = 0;
    while let Some(point) = interval.nth_step(first, k) {
        if point > last {
            break;
        }
        if !present.contains(&point) {
            missing += 1;
            if missing > limit {
                break;
            }
        }
        k = match k.checked_add(1) {
            Some(next) => next,
            None => break,
        };
    }
    missing
}

/// At most `max_gaps` grid points between the first and last bar are absent.
/// Series with fewer than two bars pass.
pub fn check_continuity(series: &BarSeries, interval: Interval, max_gaps: usize) -> bool {
    if series.len() < 2 {
        return true;
    }
    count_missing_grid_points(series, interval, max_gaps) <= max_gaps
}

// ── Prices ───────────────────────────────────────────────────────────

const PRICE_COLUMNS: [&str; 4] = ["open", "high", "low", "close"];

pub fn find_price_violation(
    series: &BarSeries,
    thresholds: &QualityThresholds,
) -> Option<PriceViolation> {
    // Last seen finite value per column, so a NaN bar does not hide a jump
    let mut prev: [Option<f64>; 4] = [None; 4];

    for (index, bar) in series.bars().iter().enumerate() {
        let prices = [bar.open, bar.high, bar.low, bar.close];

        for (value, column) in prices.iter().zip(PRICE_COLUMNS) {
            if value.is_infinite() {
                return Some(PriceViolation::NonFinite {
                    index,
                    column: column.to_string(),
                });
            }
            if *value < 0.0 {
                return Some(PriceViolation::Negative {
                    index,
                    column: column.to_string(),
                });
            }
        }

        if bar.is_void() {
            continue;
        }

        if !bar.is_sane() {
            return Some(PriceViolation::InvertedRange { index });
        }

        for (slot, (value, column)) in prices.iter().zip(PRICE_COLUMNS).enumerate() {
            if let Some(p) = prev[slot] {
                let change = pct_change(p, *value);
                if change > thresholds.max_price_change {
                    return Some(PriceViolation::ExcessiveChange {
                        index,
                        column: column.to_string(),
                        change,
                    });
                }
            }
            prev[slot] = Some(*value);
        }
    }

    None
}

/// Absolute fractional change. Zero to non-zero is infinite; zero to zero is 0.
fn pct_change(from: f64, to: f64) -> f64 {
    if from == 0.0 {
        if to == 0.0 {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        ((to - from) / from).abs()
    }
}

pub fn check_price_validity(series: &BarSeries, thresholds: &QualityThresholds) -> bool {
    find_price_violation(series, thresholds).is_none()
}

// ── Volume ───────────────────────────────────────────────────────────

pub fn find_volume_violation(
    series: &BarSeries,
    thresholds: &QualityThresholds,
) -> Option<VolumeViolation> {
    let volumes: Vec<f64> = series.bars().iter().map(|b| b.volume).collect();

    for (index, &v) in volumes.iter().enumerate() {
        if v.is_infinite() {
            return Some(VolumeViolation::NonFinite { index });
        }
        if v < 0.0 {
            return Some(VolumeViolation::Negative { index });
        }
    }

    // Window includes the current bar; the first window - 1 bars have no mean
    let means = rolling_mean(&volumes, thresholds.volume_window);
    for (index, (&v, &mean)) in volumes.iter().zip(&means).enumerate() {
        if mean.is_nan() || mean <= 0.0 || v.is_nan() {
            continue;
        }
        let ratio = v / mean;
        if ratio > thresholds.volume_spike_multiple {
            return Some(VolumeViolation::Spike { index, ratio });
        }
    }

    None
}

pub fn check_volume_validity(series: &BarSeries, thresholds: &QualityThresholds) -> bool {
    find_volume_violation(series, thresholds).is_none()
}

// ── Structure and completeness ───────────────────────────────────────

/// Fraction of rows where `column` is missing.
///
/// Raw columns count NaN. Feature columns count undefined positions after
/// the first defined one, so indicator warm-up is not "missing". `None` if
/// the column is absent.
pub fn missing_fraction(series: &BarSeries, column: &Column) -> Option<f64> {
    let n = series.len();
    if n == 0 {
        return Some(0.0);
    }
    let missing = match column {
        Column::Feature(key) => series.feature(key)?.gaps_after_warmup(),
        raw => series
            .raw_values(raw)?
            .iter()
            .filter(|v| v.is_nan())
            .count(),
    };
    Some(missing as f64 / n as f64)
}

/// Structural checks in priority order; the first failure is reported.
///
/// 1. empty series
/// 2. fewer than `min_rows` rows
/// 3. a required column is absent
/// 4. duplicate timestamps
/// 5. a required column's missing fraction exceeds `max_missing_fraction`
pub fn check_quality(
    series: &BarSeries,
    required_columns: &[Column],
    min_rows: usize,
    max_missing_fraction: f64,
) -> ValidationResult {
    if series.is_empty() {
        return ValidationResult::fail(QualityIssue::Empty);
    }

    if series.len() < min_rows {
        return ValidationResult::fail(QualityIssue::InsufficientRows {
            rows: series.len(),
            min_rows,
        });
    }

    let absent: Vec<String> = required_columns
        .iter()
        .filter(|c| !series.has_column(c))
        .map(Column::name)
        .collect();
    if !absent.is_empty() {
        return ValidationResult::fail(QualityIssue::MissingColumns(absent));
    }

    let duplicates = series
        .bars()
        .windows(2)
        .filter(|w| w[0].timestamp == w[1].timestamp)
        .count();
    if duplicates > 0 {
        return ValidationResult::fail(QualityIssue::DuplicateTimestamps { count: duplicates });
    }

    for column in required_columns {
        let fraction = missing_fraction(series, column).unwrap_or(0.0);
        if fraction > max_missing_fraction {
            return ValidationResult::fail(QualityIssue::ExcessiveMissing {
                column: column.name(),
                fraction,
                max: max_missing_fraction,
            });
        }
    }

    ValidationResult::pass()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_support::{make_bars, make_series};
    use crate::domain::{Bar, FeatureColumn, FeatureKey};

    fn thresholds() -> QualityThresholds {
        QualityThresholds::default()
    }

    fn flat_bars(n: usize, volume: f64) -> Vec<Bar> {
        let mut bars = make_bars(&vec![100.0; n]);
        for b in &mut bars {
            b.volume = volume;
        }
        bars
    }

    fn series_of(bars: Vec<Bar>) -> BarSeries {
        BarSeries::new("TEST", Interval::Day1, bars)
    }

    #[test]
    fn price_rejects_low_above_high() {
        let mut bars = make_bars(&[100.0, 101.0, 102.0]);
        bars[1].low = bars[1].high + 1.0;
        assert!(!check_price_validity(&series_of(bars), &thresholds()));
    }

    #[test]
    fn price_rejects_negative() {
        let mut bars = make_bars(&[100.0, 101.0, 102.0]);
        bars[2].low = -1.0;
        assert!(matches!(
            find_price_violation(&series_of(bars), &thresholds()),
            Some(PriceViolation::Negative { index: 2, .. })
        ));
    }

    #[test]
    fn price_rejects_jump_over_threshold() {
        let series = make_series("TEST", &[100.0, 101.0, 160.0]);
        assert!(matches!(
            find_price_violation(&series, &thresholds()),
            Some(PriceViolation::ExcessiveChange { index: 2, .. })
        ));
    }

    #[test]
    fn price_accepts_jump_at_threshold() {
        // close 100 -> 150 is exactly 50%; high/low move less
        let mut bars = make_bars(&[100.0, 150.0]);
        bars[1].open = 100.0;
        bars[1].high = 150.0;
        bars[1].low = 100.0;
        bars[0].high = 100.0;
        bars[0].low = 100.0;
        assert!(check_price_validity(&series_of(bars), &thresholds()));
    }

    #[test]
    fn price_zero_to_nonzero_is_infinite_change() {
        let mut bars = make_bars(&[0.0, 0.0, 1.0]);
        for b in &mut bars {
            b.open = b.close;
            b.high = b.close;
            b.low = b.close;
        }
        assert!(matches!(
            find_price_violation(&series_of(bars.clone()), &thresholds()),
            Some(PriceViolation::ExcessiveChange { index: 2, .. })
        ));
        // zero to zero passes
        bars.truncate(2);
        assert!(check_price_validity(&series_of(bars), &thresholds()));
    }

    #[test]
    fn price_skips_nan_bars() {
        let mut bars = make_bars(&[100.0, 101.0, 102.0]);
        bars[1].close = f64::NAN;
        assert!(check_price_validity(&series_of(bars), &thresholds()));
    }

    #[test]
    fn price_rejects_infinite() {
        let mut bars = make_bars(&[100.0, 101.0]);
        bars[1].high = f64::INFINITY;
        assert!(matches!(
            find_price_violation(&series_of(bars), &thresholds()),
            Some(PriceViolation::NonFinite { index: 1, .. })
        ));
    }

    #[test]
    fn volume_rejects_negative() {
        let mut bars = flat_bars(5, 1000.0);
        bars[3].volume = -5.0;
        assert!(!check_volume_validity(&series_of(bars), &thresholds()));
    }

    #[test]
    fn volume_accepts_all_zero() {
        assert!(check_volume_validity(&series_of(flat_bars(40, 0.0)), &thresholds()));
    }

    #[test]
    fn volume_rejects_spike() {
        // mean over 20 bars with one at 1000x: 19*1 + 1000 / 20 = 50.95, ratio ~19.6
        let mut bars = flat_bars(30, 1.0);
        bars[25].volume = 1000.0;
        assert!(matches!(
            find_volume_violation(&series_of(bars), &thresholds()),
            Some(VolumeViolation::Spike { index: 25, .. })
        ));
    }

    #[test]
    fn volume_exempts_first_window() {
        let mut bars = flat_bars(30, 1.0);
        bars[5].volume = 1000.0;
        // only windows ending at 19..=24 contain it: mean = 50.95, ratio for
        // bar 5 is never evaluated and the other bars sit far below the mean
        assert!(check_volume_validity(&series_of(bars), &thresholds()));
    }

    #[test]
    fn continuity_counts_missing_days() {
        let mut bars = make_bars(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        bars.remove(2);
        bars.remove(2);
        let series = series_of(bars);
        assert_eq!(count_missing_grid_points(&series, Interval::Day1, 10), 2);
        assert!(check_continuity(&series, Interval::Day1, 2));
        assert!(!check_continuity(&series, Interval::Day1, 1));
    }

    #[test]
    fn continuity_short_series_passes() {
        let series = make_series("TEST", &[1.0]);
        assert!(check_continuity(&series, Interval::Day1, 0));
    }

    #[test]
    fn quality_priority_order() {
        let thresholds = thresholds();
        let empty = BarSeries::empty("TEST", Interval::Day1);
        assert_eq!(
            check_quality(&empty, &Column::OHLCV, 1, 0.05).reason,
            Some(QualityIssue::Empty)
        );

        let short = make_series("TEST", &[1.0, 2.0]);
        assert!(matches!(
            check_quality(&short, &Column::OHLCV, thresholds.min_rows, 0.05).reason,
            Some(QualityIssue::InsufficientRows { rows: 2, min_rows: 100 })
        ));

        let required = [Column::Close, Column::Feature(FeatureKey::Obv)];
        assert!(matches!(
            check_quality(&short, &required, 1, 0.05).reason,
            Some(QualityIssue::MissingColumns(ref cols)) if cols == &vec!["obv".to_string()]
        ));
    }

    #[test]
    fn quality_rejects_duplicates() {
        let mut bars = make_bars(&[1.0, 2.0, 3.0]);
        bars[2].timestamp = bars[1].timestamp;
        let result = check_quality(&series_of(bars), &Column::OHLCV, 1, 0.05);
        assert!(!result.valid);
        assert_eq!(
            result.reason,
            Some(QualityIssue::DuplicateTimestamps { count: 1 })
        );
    }

    #[test]
    fn quality_rejects_excess_missing() {
        let mut bars = make_bars(&[1.0; 10]);
        bars[3].close = f64::NAN;
        let result = check_quality(&series_of(bars), &Column::OHLCV, 1, 0.05);
        assert!(matches!(
            result.reason,
            Some(QualityIssue::ExcessiveMissing { ref column, .. }) if column == "close"
        ));
    }

    #[test]
    fn feature_warmup_is_not_missing() {
        let mut series = make_series("TEST", &[1.0; 10]);
        let mut values = vec![None; 5];
        values.extend(vec![Some(1.0); 5]);
        series
            .insert_feature(FeatureKey::Rsi { period: 5 }, FeatureColumn::new(values))
            .unwrap();
        let required = [Column::Feature(FeatureKey::Rsi { period: 5 })];
        assert!(check_quality(&series, &required, 1, 0.0).valid);
    }

    #[test]
    fn feature_gap_after_warmup_is_missing() {
        let mut series = make_series("TEST", &[1.0; 10]);
        let mut values = vec![Some(1.0); 10];
        values[0] = None;
        values[6] = None;
        series
            .insert_feature(FeatureKey::Vwap, FeatureColumn::new(values))
            .unwrap();
        let required = [Column::Feature(FeatureKey::Vwap)];
        assert!(!check_quality(&series, &required, 1, 0.05).valid);
    }
}
