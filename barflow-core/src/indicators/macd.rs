//! MACD: Moving Average Convergence/Divergence.
//!
//! macd = EMA(close, fast) - EMA(close, slow)
//! signal = EMA(macd, signal)
//! hist = macd - signal
//!
//! EMAs are seeded from the first value, so every line is defined from
//! index 0. A series shorter than `slow` has no meaningful slow average and
//! yields all-undefined output.

use super::ema::ema_of_series;

#[derive(Debug, Clone, PartialEq)]
pub struct MacdOutput {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub hist: Vec<f64>,
}

pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MacdOutput {
    let n = closes.len();
    if n < slow || fast == 0 || signal == 0 {
        return MacdOutput {
            macd: vec![f64::NAN; n],
            signal: vec![f64::NAN; n],
            hist: vec![f64::NAN; n],
        };
    }

    let fast_ema = ema_of_series(closes, fast);
    let slow_ema = ema_of_series(closes, slow);
    let macd_line: Vec<f64> = fast_ema.iter().zip(&slow_ema).map(|(f, s)| f - s).collect();
    let signal_line = ema_of_series(&macd_line, signal);
    let hist = macd_line.iter().zip(&signal_line).map(|(m, s)| m - s).collect();

    MacdOutput {
        macd: macd_line,
        signal: signal_line,
        hist,
    }
}
