//! Bollinger Bands: moving average +/- standard deviation multiplier.
//!
//! - Middle: SMA(close, period)
//! - Upper: middle + std_dev * stddev(close, period)
//! - Lower: middle - std_dev * stddev(close, period)
//!
//! Uses sample stddev (divide by N-1), so `period` must be at least 2.
//! Lookback: period - 1.

use super::sma::{rolling_mean, rolling_std};
use super::ChannelBands;

pub fn bollinger(closes: &[f64], period: usize, std_dev: f64) -> ChannelBands {
    let n = closes.len();
    if period < 2 {
        return ChannelBands::undefined(n);
    }

    let middle = rolling_mean(closes, period);
    let sd = rolling_std(closes, period);

    let mut upper = vec![f64::NAN; n];
    let mut lower = vec![f64::NAN; n];
    for i in 0..n {
        if middle[i].is_nan() || sd[i].is_nan() {
            continue;
        }
        upper[i] = middle[i] + std_dev * sd[i];
        lower[i] = middle[i] - std_dev * sd[i];
    }

    ChannelBands {
        upper,
        middle,
        lower,
    }
}
