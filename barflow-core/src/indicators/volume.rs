//! Volume indicators: OBV, CVD and VWAP.
//!
//! OBV and CVD accumulate volume signed by the close-to-close direction:
//! +1 when the close rose, -1 otherwise (an unchanged close counts as down).
//! The first bar contributes 0. Both are defined on every bar. A bar whose
//! direction or volume is unknown adds 0.
//!
//! VWAP is cumulative (typical price * volume) / cumulative volume from the
//! start of the series, undefined while cumulative volume is 0.

use crate::domain::Bar;

fn signed_volume_cumsum(bars: &[Bar]) -> Vec<f64> {
    let mut result = Vec::with_capacity(bars.len());
    let mut total = 0.0;
    for (i, bar) in bars.iter().enumerate() {
        if i > 0 && !bar.volume.is_nan() {
            let prev = bars[i - 1].close;
            if !bar.close.is_nan() && !prev.is_nan() {
                total += if bar.close > prev { bar.volume } else { -bar.volume };
            }
        }
        result.push(total);
    }
    result
}

/// On-Balance Volume.
pub fn obv(bars: &[Bar]) -> Vec<f64> {
    signed_volume_cumsum(bars)
}

/// Cumulative Volume Delta, computed with the bar-direction proxy.
pub fn cvd(bars: &[Bar]) -> Vec<f64> {
    signed_volume_cumsum(bars)
}

/// Volume-Weighted Average Price from series start.
///
/// Bars with a missing price or volume are undefined and do not contribute.
pub fn vwap(bars: &[Bar]) -> Vec<f64> {
    let mut result = vec![f64::NAN; bars.len()];
    let mut cum_pv = 0.0;
    let mut cum_vol = 0.0;

    for (i, bar) in bars.iter().enumerate() {
        let tp = bar.typical_price();
        if tp.is_nan() || bar.volume.is_nan() {
            continue;
        }
        cum_pv += tp * bar.volume;
        cum_vol += bar.volume;
        if cum_vol > 0.0 {
            result[i] = cum_pv / cum_vol;
        }
    }

    result
}
