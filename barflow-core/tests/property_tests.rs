//! Property tests for indicator and quality-gate invariants.
//!
//! Uses proptest to verify:
//! 1. RSI stays within [0, 100]; a strictly rising series reads 100
//! 2. The MACD histogram is exactly macd - signal
//! 3. Bollinger bands are ordered for any non-negative width
//! 4. OBV and CVD agree
//! 5. A series shorter than the lookback yields an undefined column
//! 6. Price and volume checks reject impossible bars

use barflow_core::domain::{Bar, BarSeries, Interval};
use barflow_core::indicators::{bollinger, cvd, macd, obv, rsi};
use barflow_core::quality::{check_price_validity, check_volume_validity, QualityThresholds};
use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

// ── Helpers ──────────────────────────────────────────────────────────

fn bars_from(closes: &[f64], volumes: &[f64]) -> Vec<Bar> {
    let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .zip(volumes)
        .enumerate()
        .map(|(i, (&close, &volume))| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                timestamp: base + Duration::days(i as i64),
                open,
                high: open.max(close) + 0.5,
                low: (open.min(close) - 0.5).max(0.0),
                close,
                volume,
            }
        })
        .collect()
}

fn arb_closes(min: usize, max: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.0..1000.0_f64, min..max)
}

fn arb_series() -> impl Strategy<Value = (Vec<f64>, Vec<f64>)> {
    (2usize..80).prop_flat_map(|n| {
        (
            prop::collection::vec(1.0..1000.0_f64, n),
            prop::collection::vec(0.0..1e6_f64, n),
        )
    })
}

// ── 1. RSI ───────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn rsi_is_bounded(closes in arb_closes(2, 120), period in 1usize..30) {
        for v in rsi(&closes, period).into_iter().filter(|v| !v.is_nan()) {
            prop_assert!((0.0..=100.0).contains(&v), "rsi {v}");
        }
    }

    #[test]
    fn rising_series_reads_100(
        start in 1.0..500.0_f64,
        steps in prop::collection::vec(0.01..5.0_f64, 20..60),
        period in 2usize..15,
    ) {
        let mut closes = vec![start];
        for s in &steps {
            let last = closes[closes.len() - 1];
            closes.push(last + s);
        }
        let out = rsi(&closes, period);
        for (i, v) in out.iter().enumerate() {
            if i < period {
                prop_assert!(v.is_nan());
            } else {
                prop_assert_eq!(*v, 100.0);
            }
        }
    }
}

// ── 2. MACD ──────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn macd_hist_is_exact_difference(closes in arb_closes(30, 120)) {
        let out = macd(&closes, 12, 26, 9);
        for i in 0..closes.len() {
            prop_assert_eq!(out.hist[i], out.macd[i] - out.signal[i]);
        }
    }
}

// ── 3. Bollinger ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn bollinger_bands_are_ordered(
        closes in arb_closes(2, 100),
        period in 2usize..30,
        std_dev in 0.0..4.0_f64,
    ) {
        let bands = bollinger(&closes, period, std_dev);
        for i in 0..closes.len() {
            if bands.middle[i].is_nan() {
                continue;
            }
            prop_assert!(bands.upper[i] >= bands.middle[i]);
            prop_assert!(bands.middle[i] >= bands.lower[i]);
        }
    }
}

// ── 4. OBV / CVD ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn obv_equals_cvd((closes, volumes) in arb_series()) {
        let bars = bars_from(&closes, &volumes);
        prop_assert_eq!(obv(&bars), cvd(&bars));
    }
}

// ── 5. Short series ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn short_series_is_undefined(closes in arb_closes(1, 14)) {
        prop_assert!(rsi(&closes, 14).iter().all(|v| v.is_nan()));
        prop_assert!(macd(&closes, 12, 26, 9).macd.iter().all(|v| v.is_nan()));
        prop_assert!(bollinger(&closes, 20, 2.0).middle.iter().all(|v| v.is_nan()));
    }
}

// ── 6. Quality checks ────────────────────────────────────────────────

proptest! {
    #[test]
    fn low_above_high_is_rejected((closes, volumes) in arb_series(), idx in any::<prop::sample::Index>()) {
        let mut bars = bars_from(&closes, &volumes);
        let i = idx.index(bars.len());
        bars[i].low = bars[i].high + 1.0;
        let series = BarSeries::new("P", Interval::Day1, bars);
        prop_assert!(!check_price_validity(&series, &QualityThresholds::default()));
    }

    #[test]
    fn negative_volume_is_rejected((closes, volumes) in arb_series(), idx in any::<prop::sample::Index>()) {
        let mut bars = bars_from(&closes, &volumes);
        let i = idx.index(bars.len());
        bars[i].volume = -1.0;
        let series = BarSeries::new("P", Interval::Day1, bars);
        prop_assert!(!check_volume_validity(&series, &QualityThresholds::default()));
    }

    #[test]
    fn zero_volume_is_accepted(closes in arb_closes(1, 100)) {
        let volumes = vec![0.0; closes.len()];
        let series = BarSeries::new("P", Interval::Day1, bars_from(&closes, &volumes));
        prop_assert!(check_volume_validity(&series, &QualityThresholds::default()));
    }
}
