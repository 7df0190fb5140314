//! Fetch source trait and its error type.
//!
//! A [`BarSource`] turns (symbol, range, interval) into a [`BarSeries`].
//! Yahoo, CSV and synthetic sources implement it; tests substitute their own.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{BarSeries, Interval, Symbol};

/// Errors raised while fetching bars.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("HTTP {status} for {symbol}")]
    Http { status: u16, symbol: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("provider has blocked requests (circuit breaker open)")]
    CircuitBreakerTripped,

    #[error("interval {0} is not supported by this source")]
    UnsupportedInterval(Interval),

    #[error("CSV error in {path}: {message}")]
    Csv { path: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("data error: {0}")]
    Other(String),
}

impl DataError {
    /// Failures worth retrying later: the provider or network, not the request.
    pub fn is_transient(&self) -> bool {
        match self {
            DataError::NetworkUnreachable(_)
            | DataError::Timeout(_)
            | DataError::RateLimited { .. }
            | DataError::CircuitBreakerTripped => true,
            DataError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// A source of OHLCV bars.
pub trait BarSource: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Bars for `symbol` with timestamps in `[start, end]`.
    ///
    /// No data for the range is an empty series, not an error.
    fn fetch(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> Result<BarSeries, DataError>;

    /// Fetch several symbols. Symbols that fail or have no rows are absent
    /// from the result.
    fn fetch_many(
        &self,
        symbols: &[Symbol],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> BTreeMap<Symbol, BarSeries> {
        let mut out = BTreeMap::new();
        for symbol in symbols {
            match self.fetch(symbol, start, end, interval) {
                Ok(series) if series.is_empty() => {
                    debug!(source = self.name(), %symbol, "no rows");
                }
                Ok(series) => {
                    out.insert(symbol.clone(), series);
                }
                Err(e) => {
                    warn!(source = self.name(), %symbol, error = %e, "fetch failed");
                }
            }
        }
        out
    }

    /// False while the source refuses requests (e.g. breaker open).
    fn is_available(&self) -> bool {
        true
    }
}
