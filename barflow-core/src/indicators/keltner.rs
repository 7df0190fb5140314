//! Keltner Channels: SMA +/- ATR multiplier.
//!
//! - Middle: SMA(close, period)
//! - Upper: middle + multiplier * ATR(atr_period)
//! - Lower: middle - multiplier * ATR(atr_period)
//!
//! The ATR line is an input so the caller can reuse an already computed ATR
//! column. Defined where both the SMA and the ATR are.

use super::sma::rolling_mean;
use super::ChannelBands;
use crate::domain::Bar;

pub fn keltner(bars: &[Bar], period: usize, multiplier: f64, atr: &[f64]) -> ChannelBands {
    let n = bars.len();
    if atr.len() != n {
        return ChannelBands::undefined(n);
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let sma = rolling_mean(&closes, period);

    let mut bands = ChannelBands::undefined(n);
    for i in 0..n {
        if sma[i].is_nan() || atr[i].is_nan() {
            continue;
        }
        bands.middle[i] = sma[i];
        bands.upper[i] = sma[i] + multiplier * atr[i];
        bands.lower[i] = sma[i] - multiplier * atr[i];
    }

    bands
}
