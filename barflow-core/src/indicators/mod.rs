//! Indicator kernels.
//!
//! Each kernel is a pure function over bar or price slices returning one
//! `Vec<f64>` per output line, aligned with the input. Positions where the
//! indicator is not yet (or not) defined hold `NaN`; the feature engine turns
//! those into undefined column entries.
//!
//! Rolling windows containing a `NaN` input produce `NaN`, mirroring the
//! usual dataframe semantics of a full-window rolling mean.

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod keltner;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod volume;

pub use adx::adx;
pub use atr::{atr, true_range};
pub use bollinger::bollinger;
pub use ema::ema_of_series;
pub use keltner::keltner;
pub use macd::{macd, MacdOutput};
pub use rsi::rsi;
pub use sma::{rolling_mean, rolling_std};
pub use volume::{cvd, obv, vwap};

/// Upper, middle and lower lines of a channel indicator.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

impl ChannelBands {
    fn undefined(n: usize) -> Self {
        Self {
            upper: vec![f64::NAN; n],
            middle: vec![f64::NAN; n],
            lower: vec![f64::NAN; n],
        }
    }
}

#[cfg(test)]
pub use crate::domain::test_support::{make_bars, make_ohlc_bars};

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
