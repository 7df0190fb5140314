//! Bar interval: the sampling period of a series.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported bar intervals, displayed and parsed as `1m`, `1h`, `1d`, `1wk`, ...
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum Interval {
    Minute1,
    Minute2,
    Minute5,
    Minute15,
    Minute30,
    Minute60,
    Minute90,
    Hour1,
    #[default]
    Day1,
    Day5,
    Week1,
    Month1,
    Month3,
}

impl Interval {
    pub const ALL: [Interval; 13] = [
        Interval::Minute1,
        Interval::Minute2,
        Interval::Minute5,
        Interval::Minute15,
        Interval::Minute30,
        Interval::Minute60,
        Interval::Minute90,
        Interval::Hour1,
        Interval::Day1,
        Interval::Day5,
        Interval::Week1,
        Interval::Month1,
        Interval::Month3,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Minute1 => "1m",
            Interval::Minute2 => "2m",
            Interval::Minute5 => "5m",
            Interval::Minute15 => "15m",
            Interval::Minute30 => "30m",
            Interval::Minute60 => "60m",
            Interval::Minute90 => "90m",
            Interval::Hour1 => "1h",
            Interval::Day1 => "1d",
            Interval::Day5 => "5d",
            Interval::Week1 => "1wk",
            Interval::Month1 => "1mo",
            Interval::Month3 => "3mo",
        }
    }

    /// Fixed step length, or `None` for calendar-month intervals.
    pub fn fixed_step(&self) -> Option<Duration> {
        match self {
            Interval::Minute1 => Some(Duration::minutes(1)),
            Interval::Minute2 => Some(Duration::minutes(2)),
            Interval::Minute5 => Some(Duration::minutes(5)),
            Interval::Minute15 => Some(Duration::minutes(15)),
            Interval::Minute30 => Some(Duration::minutes(30)),
            Interval::Minute60 | Interval::Hour1 => Some(Duration::hours(1)),
            Interval::Minute90 => Some(Duration::minutes(90)),
            Interval::Day1 => Some(Duration::days(1)),
            Interval::Day5 => Some(Duration::days(5)),
            Interval::Week1 => Some(Duration::weeks(1)),
            Interval::Month1 | Interval::Month3 => None,
        }
    }

    /// The `k`-th grid point from `origin`. Month grids are anchored to
    /// `origin` so day-of-month clamping does not accumulate.
    pub fn nth_step(&self, origin: DateTime<Utc>, k: u32) -> Option<DateTime<Utc>> {
        match self {
            Interval::Month1 => origin.checked_add_months(Months::new(k)),
            Interval::Month3 => origin.checked_add_months(Months::new(k.checked_mul(3)?)),
            _ => {
                let offset = self.fixed_step()?.checked_mul(i32::try_from(k).ok()?)?;
                origin.checked_add_signed(offset)
            }
        }
    }

    /// True for sub-daily intervals.
    pub fn is_intraday(&self) -> bool {
        matches!(
            self,
            Interval::Minute1
                | Interval::Minute2
                | Interval::Minute5
                | Interval::Minute15
                | Interval::Minute30
                | Interval::Minute60
                | Interval::Minute90
                | Interval::Hour1
        )
    }

    /// Store measurement holding series of this interval: `market_data_{interval}`.
    pub fn measurement(&self) -> String {
        format!("market_data_{}", self.as_str())
    }

    /// Inverse of [`Interval::measurement`].
    pub fn from_measurement(measurement: &str) -> Option<Self> {
        measurement
            .strip_prefix("market_data_")
            .and_then(|s| s.parse().ok())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no supported interval.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported interval '{0}' (expected one of 1m, 2m, 5m, 15m, 30m, 60m, 90m, 1h, 1d, 5d, 1wk, 1mo, 3mo)")]
pub struct ParseIntervalError(pub String);

impl FromStr for Interval {
    type Err = ParseIntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .iter()
            .copied()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| ParseIntervalError(s.to_string()))
    }
}

impl TryFrom<String> for Interval {
    type Error = ParseIntervalError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Interval> for String {
    fn from(i: Interval) -> Self {
        i.as_str().to_string()
    }
}
