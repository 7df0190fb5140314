//! Feature Engine: derives indicator columns from a validated bar series.
//!
//! Construction validates the [`FeatureSet`] and resolves it into an ordered
//! plan. Within the volatility family ATR steps run first so that Keltner
//! Channels can reuse a configured ATR with the matching period.

use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use super::spec::{Family, FeatureConfigError, FeatureSet, IndicatorSpec};
use crate::domain::{Band, BarSeries, FeatureColumn, FeatureKey, MacdLine};
use crate::indicators::{self, ChannelBands};

/// Validated, ordered computation plan.
#[derive(Debug, Clone)]
pub struct FeatureEngine {
    steps: Vec<IndicatorSpec>,
    output_keys: Vec<FeatureKey>,
}

impl FeatureEngine {
    pub fn new(set: &FeatureSet) -> Result<Self, FeatureConfigError> {
        let mut steps = Vec::new();

        for (family, spec) in set.iter() {
            match spec.family() {
                None => {
                    warn!(indicator = spec.name(), %family, "unknown indicator, skipping");
                    continue;
                }
                Some(actual) if actual != family => {
                    warn!(
                        indicator = spec.name(),
                        configured = %family,
                        expected = %actual,
                        "indicator listed under the wrong family, skipping"
                    );
                    continue;
                }
                Some(_) => {}
            }
            spec.validate()?;
            steps.push(spec.clone());
        }

        steps.sort_by_key(plan_rank);

        let mut seen = BTreeSet::new();
        let mut output_keys = Vec::new();
        for step in &steps {
            for key in step.output_keys() {
                if !seen.insert(key) {
                    return Err(FeatureConfigError::DuplicateColumn(key));
                }
                output_keys.push(key);
            }
        }

        debug!(columns = output_keys.len(), "feature engine ready");
        Ok(Self { steps, output_keys })
    }

    /// Every column [`FeatureEngine::compute`] will attach, in order.
    pub fn output_keys(&self) -> &[FeatureKey] {
        &self.output_keys
    }

    /// Return a copy of `series` with every configured column attached.
    ///
    /// Columns already present on the input are left as they are. Series
    /// too short for an indicator receive an all-undefined column.
    pub fn compute(&self, series: &BarSeries) -> BarSeries {
        let mut out = series.clone();
        let bars = series.bars();
        let closes = series.closes();
        let mut atr_cache: HashMap<usize, Vec<f64>> = HashMap::new();

        for step in &self.steps {
            match step {
                IndicatorSpec::Rsi { periods } => {
                    for &period in periods {
                        attach(&mut out, FeatureKey::Rsi { period }, indicators::rsi(&closes, period));
                    }
                }
                IndicatorSpec::Macd { fast, slow, signal } => {
                    let m = indicators::macd(&closes, *fast, *slow, *signal);
                    attach(&mut out, FeatureKey::Macd(MacdLine::Macd), m.macd);
                    attach(&mut out, FeatureKey::Macd(MacdLine::Signal), m.signal);
                    attach(&mut out, FeatureKey::Macd(MacdLine::Histogram), m.hist);
                }
                IndicatorSpec::Adx { period } => {
                    attach(&mut out, FeatureKey::Adx { period: *period }, indicators::adx(bars, *period));
                }
                IndicatorSpec::Atr { period } => {
                    let values = atr_cache
                        .entry(*period)
                        .or_insert_with(|| indicators::atr(bars, *period))
                        .clone();
                    attach(&mut out, FeatureKey::Atr { period: *period }, values);
                }
                IndicatorSpec::Bollinger { period, std_dev } => {
                    let bands = indicators::bollinger(&closes, *period, *std_dev);
                    attach_bands(&mut out, bands, |band| FeatureKey::Bollinger {
                        band,
                        period: *period,
                    });
                }
                IndicatorSpec::Keltner {
                    period,
                    atr_period,
                    multiplier,
                } => {
                    let atr = atr_cache
                        .entry(*atr_period)
                        .or_insert_with(|| indicators::atr(bars, *atr_period));
                    let bands = indicators::keltner(bars, *period, *multiplier, atr);
                    attach_bands(&mut out, bands, |band| FeatureKey::Keltner {
                        band,
                        period: *period,
                    });
                }
                IndicatorSpec::Obv => attach(&mut out, FeatureKey::Obv, indicators::obv(bars)),
                IndicatorSpec::Vwap => attach(&mut out, FeatureKey::Vwap, indicators::vwap(bars)),
                IndicatorSpec::Cvd => attach(&mut out, FeatureKey::Cvd, indicators::cvd(bars)),
                IndicatorSpec::Ignored { .. } => {}
            }
        }

        debug!(
            symbol = series.symbol(),
            rows = series.len(),
            columns = out.features().len(),
            "features computed"
        );
        out
    }
}

/// Family order, with ATR ahead of the other volatility indicators.
/// The sort is stable, so configured order holds within a rank.
fn plan_rank(spec: &IndicatorSpec) -> u8 {
    match (spec.family(), spec) {
        (Some(Family::Momentum), _) => 0,
        (_, IndicatorSpec::Atr { .. }) => 1,
        (Some(Family::Volatility), _) => 2,
        _ => 3,
    }
}

fn attach(series: &mut BarSeries, key: FeatureKey, values: Vec<f64>) {
    if series.has_feature(&key) {
        debug!(symbol = series.symbol(), column = %key, "column already present, keeping it");
        return;
    }
    if let Err(e) = series.insert_feature(key, FeatureColumn::from_nan_padded(values)) {
        warn!(symbol = series.symbol(), column = %key, error = %e, "could not attach feature");
    }
}

fn attach_bands(series: &mut BarSeries, bands: ChannelBands, key: impl Fn(Band) -> FeatureKey) {
    attach(series, key(Band::Upper), bands.upper);
    attach(series, key(Band::Middle), bands.middle);
    attach(series, key(Band::Lower), bands.lower);
}
