//! Deterministic synthetic bars for development and tests.
//!
//! A random walk from 100.0 seeded by the BLAKE3 hash of the symbol. The
//! walk starts at the requested `start`, so equal requests give equal bars.

use chrono::{DateTime, Datelike, Utc, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::provider::{BarSource, DataError};
use crate::domain::{Bar, BarSeries, Interval};

const START_PRICE: f64 = 100.0;

/// Generates bars for any symbol, except those listed as unknown.
#[derive(Debug, Clone, Default)]
pub struct SyntheticSource {
    unknown: Vec<String>,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Symbols that will come back empty, as if the provider had no data.
    pub fn with_unknown(mut self, symbols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.unknown.extend(symbols.into_iter().map(Into::into));
        self
    }
}

impl BarSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> Result<BarSeries, DataError> {
        if self.unknown.iter().any(|s| s == symbol) {
            return Ok(BarSeries::empty(symbol, interval));
        }
        Ok(BarSeries::new(
            symbol,
            interval,
            generate_walk(symbol, start, end, interval),
        ))
    }
}

/// Random walk over the interval grid in `[start, end]`.
///
/// Daily data starts at midnight UTC of `start`'s date. Daily and intraday
/// grids skip weekends.
pub fn generate_walk(
    symbol: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval: Interval,
) -> Vec<Bar> {
    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let origin = if interval.is_intraday() {
        start
    } else {
        start
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or(start)
    };
    let skip_weekends = interval.is_intraday() || interval == Interval::Day1;

    let mut bars = Vec::new();
    let mut price = START_PRICE;
    let mut k: u32 = 0;

    while let Some(current) = interval.nth_step(origin, k) {
        if current > end {
            break;
        }
        k += 1;
        if current < start {
            continue;
        }
        if skip_weekends && matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            continue;
        }

        let step_return: f64 = rng.gen_range(-0.03..0.03);
        let open = price;
        let close = price * (1.0 + step_return);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
        let volume = rng.gen_range(500_000..5_000_000u64) as f64;

        bars.push(Bar {
            timestamp: current,
            open,
            high,
            low,
            close,
            volume,
        });
        price = close;
    }

    bars
}
