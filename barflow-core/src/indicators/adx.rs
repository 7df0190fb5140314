//! ADX: Average Directional Index.
//!
//! Steps:
//! 1. +DM and -DM from consecutive bars; only the dominant positive move is kept
//! 2. ATR = rolling mean of True Range
//! 3. +DI = 100 * mean(+DM) / ATR, -DI = 100 * mean(-DM) / ATR (ATR of 0 gives DI 0)
//! 4. DX = 100 * |+DI - -DI| / (+DI + -DI) (zero DI sum gives DX 0)
//! 5. ADX = rolling mean of DX
//!
//! All averages are simple rolling means over `period`.
//! Lookback: 2 * period - 1.

use super::atr::atr;
use super::sma::rolling_mean;
use crate::domain::Bar;

pub fn adx(bars: &[Bar], period: usize) -> Vec<f64> {
    let n = bars.len();
    if period == 0 || n < 2 {
        return vec![f64::NAN; n];
    }

    let mut plus_dm = vec![f64::NAN; n];
    let mut minus_dm = vec![f64::NAN; n];
    for i in 1..n {
        let up = bars[i].high - bars[i - 1].high;
        let down = bars[i - 1].low - bars[i].low;
        if up.is_nan() || down.is_nan() {
            continue;
        }
        plus_dm[i] = if up > down && up > 0.0 { up } else { 0.0 };
        minus_dm[i] = if down > up && down > 0.0 { down } else { 0.0 };
    }

    let atr_values = atr(bars, period);
    let mean_plus = rolling_mean(&plus_dm, period);
    let mean_minus = rolling_mean(&minus_dm, period);

    let mut dx = vec![f64::NAN; n];
    for i in 0..n {
        let (a, p, m) = (atr_values[i], mean_plus[i], mean_minus[i]);
        if a.is_nan() || p.is_nan() || m.is_nan() {
            continue;
        }
        let (plus_di, minus_di) = if a == 0.0 {
            (0.0, 0.0)
        } else {
            (100.0 * p / a, 100.0 * m / a)
        };
        let di_sum = plus_di + minus_di;
        dx[i] = if di_sum == 0.0 {
            0.0
        } else {
            100.0 * (plus_di - minus_di).abs() / di_sum
        };
    }

    rolling_mean(&dx, period)
}
