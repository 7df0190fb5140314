//! Indicator specifications as they appear in configuration.
//!
//! Each configured indicator is a table with a `name` and optional
//! parameters:
//!
//! ```toml
//! [[features.momentum]]
//! name = "MACD"
//! fast_period = 12
//! slow_period = 26
//! signal_period = 9
//! ```
//!
//! Names outside the supported catalog parse to [`IndicatorSpec::Ignored`]
//! and are skipped by the engine with a warning. A parameter of the wrong
//! type (e.g. `period = "ten"`) fails parsing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::domain::FeatureKey;

/// Invalid feature configuration. Fails the whole run before any symbol.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureConfigError {
    #[error("{indicator}: parameter '{param}' must be {expected}")]
    MalformedParam {
        indicator: String,
        param: String,
        expected: &'static str,
    },

    #[error("{indicator}: parameter '{param}' must be at least 1")]
    ZeroPeriod {
        indicator: &'static str,
        param: &'static str,
    },

    #[error("RSI: 'periods' must list at least one period")]
    NoPeriods,

    #[error("MACD: fast period ({fast}) must be shorter than slow period ({slow})")]
    MacdPeriods { fast: usize, slow: usize },

    #[error("BOLLINGER_BANDS: period must be at least 2 for a sample deviation, got {0}")]
    BollingerPeriod(usize),

    #[error("{indicator}: '{param}' must be finite and non-negative, got {value}")]
    InvalidMultiplier {
        indicator: &'static str,
        param: &'static str,
        value: f64,
    },

    #[error("feature column '{0}' is produced by more than one indicator")]
    DuplicateColumn(FeatureKey),
}

/// Indicator family, matching the `[features]` sub-tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Momentum,
    Volatility,
    Volume,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Family::Momentum => "momentum",
            Family::Volatility => "volatility",
            Family::Volume => "volume",
        })
    }
}

/// A configured indicator with typed parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawIndicator", into = "RawIndicator")]
pub enum IndicatorSpec {
    Rsi {
        periods: Vec<usize>,
    },
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Adx {
        period: usize,
    },
    Atr {
        period: usize,
    },
    Bollinger {
        period: usize,
        std_dev: f64,
    },
    Keltner {
        period: usize,
        atr_period: usize,
        multiplier: f64,
    },
    Obv,
    Vwap,
    Cvd,
    /// Unrecognised name, kept so it can be reported and skipped.
    Ignored {
        name: String,
    },
}

impl IndicatorSpec {
    pub fn rsi(period: usize) -> Self {
        IndicatorSpec::Rsi {
            periods: vec![period],
        }
    }

    pub fn macd_default() -> Self {
        IndicatorSpec::Macd {
            fast: 12,
            slow: 26,
            signal: 9,
        }
    }

    /// Configuration name, e.g. `BOLLINGER_BANDS`.
    pub fn name(&self) -> &str {
        match self {
            IndicatorSpec::Rsi { .. } => "RSI",
            IndicatorSpec::Macd { .. } => "MACD",
            IndicatorSpec::Adx { .. } => "ADX",
            IndicatorSpec::Atr { .. } => "ATR",
            IndicatorSpec::Bollinger { .. } => "BOLLINGER_BANDS",
            IndicatorSpec::Keltner { .. } => "KELTNER_CHANNELS",
            IndicatorSpec::Obv => "OBV",
            IndicatorSpec::Vwap => "VWAP",
            IndicatorSpec::Cvd => "CVD",
            IndicatorSpec::Ignored { name } => name,
        }
    }

    /// The family this indicator belongs to; `None` for ignored entries.
    pub fn family(&self) -> Option<Family> {
        match self {
            IndicatorSpec::Rsi { .. } | IndicatorSpec::Macd { .. } | IndicatorSpec::Adx { .. } => {
                Some(Family::Momentum)
            }
            IndicatorSpec::Atr { .. }
            | IndicatorSpec::Bollinger { .. }
            | IndicatorSpec::Keltner { .. } => Some(Family::Volatility),
            IndicatorSpec::Obv | IndicatorSpec::Vwap | IndicatorSpec::Cvd => Some(Family::Volume),
            IndicatorSpec::Ignored { .. } => None,
        }
    }

    /// Check parameter values.
    pub fn validate(&self) -> Result<(), FeatureConfigError> {
        match self {
            IndicatorSpec::Rsi { periods } => {
                if periods.is_empty() {
                    return Err(FeatureConfigError::NoPeriods);
                }
                if periods.contains(&0) {
                    return Err(FeatureConfigError::ZeroPeriod {
                        indicator: "RSI",
                        param: "periods",
                    });
                }
            }
            IndicatorSpec::Macd { fast, slow, signal } => {
                nonzero("MACD", "fast_period", *fast)?;
                nonzero("MACD", "slow_period", *slow)?;
                nonzero("MACD", "signal_period", *signal)?;
                if fast >= slow {
                    return Err(FeatureConfigError::MacdPeriods {
                        fast: *fast,
                        slow: *slow,
                    });
                }
            }
            IndicatorSpec::Adx { period } => nonzero("ADX", "period", *period)?,
            IndicatorSpec::Atr { period } => nonzero("ATR", "period", *period)?,
            IndicatorSpec::Bollinger { period, std_dev } => {
                if *period < 2 {
                    return Err(FeatureConfigError::BollingerPeriod(*period));
                }
                non_negative("BOLLINGER_BANDS", "std_dev", *std_dev)?;
            }
            IndicatorSpec::Keltner {
                period,
                atr_period,
                multiplier,
            } => {
                nonzero("KELTNER_CHANNELS", "period", *period)?;
                nonzero("KELTNER_CHANNELS", "atr_period", *atr_period)?;
                non_negative("KELTNER_CHANNELS", "multiplier", *multiplier)?;
            }
            IndicatorSpec::Obv
            | IndicatorSpec::Vwap
            | IndicatorSpec::Cvd
            | IndicatorSpec::Ignored { .. } => {}
        }
        Ok(())
    }

    /// Columns this indicator emits, in emission order.
    pub fn output_keys(&self) -> Vec<FeatureKey> {
        use crate::domain::{Band, MacdLine};
        match self {
            IndicatorSpec::Rsi { periods } => periods
                .iter()
                .map(|&period| FeatureKey::Rsi { period })
                .collect(),
            IndicatorSpec::Macd { .. } => vec![
                FeatureKey::Macd(MacdLine::Macd),
                FeatureKey::Macd(MacdLine::Signal),
                FeatureKey::Macd(MacdLine::Histogram),
            ],
            IndicatorSpec::Adx { period } => vec![FeatureKey::Adx { period: *period }],
            IndicatorSpec::Atr { period } => vec![FeatureKey::Atr { period: *period }],
            IndicatorSpec::Bollinger { period, .. } => Band::ALL
                .iter()
                .map(|&band| FeatureKey::Bollinger {
                    band,
                    period: *period,
                })
                .collect(),
            IndicatorSpec::Keltner { period, .. } => Band::ALL
                .iter()
                .map(|&band| FeatureKey::Keltner {
                    band,
                    period: *period,
                })
                .collect(),
            IndicatorSpec::Obv => vec![FeatureKey::Obv],
            IndicatorSpec::Vwap => vec![FeatureKey::Vwap],
            IndicatorSpec::Cvd => vec![FeatureKey::Cvd],
            IndicatorSpec::Ignored { .. } => Vec::new(),
        }
    }
}

fn nonzero(
    indicator: &'static str,
    param: &'static str,
    value: usize,
) -> Result<(), FeatureConfigError> {
    if value == 0 {
        Err(FeatureConfigError::ZeroPeriod { indicator, param })
    } else {
        Ok(())
    }
}

fn non_negative(
    indicator: &'static str,
    param: &'static str,
    value: f64,
) -> Result<(), FeatureConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(FeatureConfigError::InvalidMultiplier {
            indicator,
            param,
            value,
        })
    }
}

// ── Wire form ────────────────────────────────────────────────────────

/// `{ name = "...", <params> }` as written in configuration files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawIndicator {
    pub name: String,
    #[serde(flatten)]
    pub params: BTreeMap<String, Value>,
}

impl RawIndicator {
    fn usize_param(&self, key: &str, default: usize) -> Result<usize, FeatureConfigError> {
        match self.params.get(key) {
            None => Ok(default),
            Some(v) => as_usize(v).ok_or_else(|| self.malformed(key, "a non-negative integer")),
        }
    }

    fn f64_param(&self, key: &str, default: f64) -> Result<f64, FeatureConfigError> {
        match self.params.get(key) {
            None => Ok(default),
            Some(v) => v.as_f64().ok_or_else(|| self.malformed(key, "a number")),
        }
    }

    /// `periods = [7, 14]` or a single `periods = 14`.
    fn periods_param(&self) -> Result<Vec<usize>, FeatureConfigError> {
        match self.params.get("periods") {
            None => Ok(vec![14]),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    as_usize(v).ok_or_else(|| self.malformed("periods", "a list of integers"))
                })
                .collect(),
            Some(v) => as_usize(v)
                .map(|p| vec![p])
                .ok_or_else(|| self.malformed("periods", "a list of integers")),
        }
    }

    fn malformed(&self, param: &str, expected: &'static str) -> FeatureConfigError {
        FeatureConfigError::MalformedParam {
            indicator: self.name.clone(),
            param: param.to_string(),
            expected,
        }
    }
}

fn as_usize(v: &Value) -> Option<usize> {
    v.as_u64().and_then(|n| usize::try_from(n).ok())
}

impl TryFrom<RawIndicator> for IndicatorSpec {
    type Error = FeatureConfigError;

    fn try_from(raw: RawIndicator) -> Result<Self, Self::Error> {
        let spec = match raw.name.to_ascii_uppercase().as_str() {
            "RSI" => IndicatorSpec::Rsi {
                periods: raw.periods_param()?,
            },
            "MACD" => IndicatorSpec::Macd {
                fast: raw.usize_param("fast_period", 12)?,
                slow: raw.usize_param("slow_period", 26)?,
                signal: raw.usize_param("signal_period", 9)?,
            },
            "ADX" => IndicatorSpec::Adx {
                period: raw.usize_param("period", 14)?,
            },
            "ATR" => IndicatorSpec::Atr {
                period: raw.usize_param("period", 14)?,
            },
            "BOLLINGER_BANDS" => IndicatorSpec::Bollinger {
                period: raw.usize_param("period", 20)?,
                std_dev: raw.f64_param("std_dev", 2.0)?,
            },
            "KELTNER_CHANNELS" => IndicatorSpec::Keltner {
                period: raw.usize_param("period", 20)?,
                atr_period: raw.usize_param("atr_period", 10)?,
                multiplier: raw.f64_param("multiplier", 2.0)?,
            },
            "OBV" => IndicatorSpec::Obv,
            "VWAP" => IndicatorSpec::Vwap,
            "CVD" => IndicatorSpec::Cvd,
            _ => IndicatorSpec::Ignored { name: raw.name },
        };
        Ok(spec)
    }
}

impl From<IndicatorSpec> for RawIndicator {
    fn from(spec: IndicatorSpec) -> Self {
        let mut params = BTreeMap::new();
        match &spec {
            IndicatorSpec::Rsi { periods } => {
                params.insert("periods".to_string(), Value::from(periods.clone()));
            }
            IndicatorSpec::Macd { fast, slow, signal } => {
                params.insert("fast_period".to_string(), Value::from(*fast));
                params.insert("slow_period".to_string(), Value::from(*slow));
                params.insert("signal_period".to_string(), Value::from(*signal));
            }
            IndicatorSpec::Adx { period } | IndicatorSpec::Atr { period } => {
                params.insert("period".to_string(), Value::from(*period));
            }
            IndicatorSpec::Bollinger { period, std_dev } => {
                params.insert("period".to_string(), Value::from(*period));
                params.insert("std_dev".to_string(), Value::from(*std_dev));
            }
            IndicatorSpec::Keltner {
                period,
                atr_period,
                multiplier,
            } => {
                params.insert("period".to_string(), Value::from(*period));
                params.insert("atr_period".to_string(), Value::from(*atr_period));
                params.insert("multiplier".to_string(), Value::from(*multiplier));
            }
            IndicatorSpec::Obv
            | IndicatorSpec::Vwap
            | IndicatorSpec::Cvd
            | IndicatorSpec::Ignored { .. } => {}
        }
        RawIndicator {
            name: spec.name().to_string(),
            params,
        }
    }
}

/// Indicators grouped by family, as configured under `[features]`.
///
/// A family table left out of a `[features]` section is empty; only a
/// missing `[features]` section falls back to [`FeatureSet::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    #[serde(default)]
    pub momentum: Vec<IndicatorSpec>,
    #[serde(default)]
    pub volatility: Vec<IndicatorSpec>,
    #[serde(default)]
    pub volume: Vec<IndicatorSpec>,
}

impl FeatureSet {
    /// A set that derives nothing.
    pub fn empty() -> Self {
        Self {
            momentum: Vec::new(),
            volatility: Vec::new(),
            volume: Vec::new(),
        }
    }

    /// `(family, spec)` pairs in family order.
    pub fn iter(&self) -> impl Iterator<Item = (Family, &IndicatorSpec)> {
        self.momentum
            .iter()
            .map(|s| (Family::Momentum, s))
            .chain(self.volatility.iter().map(|s| (Family::Volatility, s)))
            .chain(self.volume.iter().map(|s| (Family::Volume, s)))
    }

    pub fn is_empty(&self) -> bool {
        self.momentum.is_empty() && self.volatility.is_empty() && self.volume.is_empty()
    }
}

impl Default for FeatureSet {
    /// The full catalog with default parameters.
    fn default() -> Self {
        Self {
            momentum: vec![
                IndicatorSpec::rsi(14),
                IndicatorSpec::macd_default(),
                IndicatorSpec::Adx { period: 14 },
            ],
            volatility: vec![
                IndicatorSpec::Atr { period: 14 },
                IndicatorSpec::Bollinger {
                    period: 20,
                    std_dev: 2.0,
                },
                IndicatorSpec::Keltner {
                    period: 20,
                    atr_period: 10,
                    multiplier: 2.0,
                },
            ],
            volume: vec![IndicatorSpec::Obv, IndicatorSpec::Vwap, IndicatorSpec::Cvd],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names_with_defaults() {
        let spec: IndicatorSpec = serde_json::from_str(r#"{"name": "MACD"}"#).unwrap();
        assert_eq!(spec, IndicatorSpec::macd_default());

        let spec: IndicatorSpec =
            serde_json::from_str(r#"{"name": "KELTNER_CHANNELS", "period": 10}"#).unwrap();
        assert_eq!(
            spec,
            IndicatorSpec::Keltner {
                period: 10,
                atr_period: 10,
                multiplier: 2.0
            }
        );
    }

    #[test]
    fn rsi_accepts_list_or_single_period() {
        let spec: IndicatorSpec =
            serde_json::from_str(r#"{"name": "RSI", "periods": [7, 14]}"#).unwrap();
        assert_eq!(
            spec,
            IndicatorSpec::Rsi {
                periods: vec![7, 14]
            }
        );
        let spec: IndicatorSpec = serde_json::from_str(r#"{"name": "rsi", "periods": 9}"#).unwrap();
        assert_eq!(spec, IndicatorSpec::rsi(9));
    }

    #[test]
    fn unknown_name_is_ignored_not_rejected() {
        let spec: IndicatorSpec =
            serde_json::from_str(r#"{"name": "STOCHASTIC", "period": 14}"#).unwrap();
        assert_eq!(
            spec,
            IndicatorSpec::Ignored {
                name: "STOCHASTIC".into()
            }
        );
        assert_eq!(spec.family(), None);
    }

    #[test]
    fn malformed_param_fails_parse() {
        let err = serde_json::from_str::<IndicatorSpec>(r#"{"name": "ATR", "period": "ten"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("period"), "{err}");
        assert!(serde_json::from_str::<IndicatorSpec>(r#"{"name": "ADX", "period": -3}"#).is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert_eq!(
            IndicatorSpec::Macd {
                fast: 26,
                slow: 12,
                signal: 9
            }
            .validate(),
            Err(FeatureConfigError::MacdPeriods { fast: 26, slow: 12 })
        );
        assert!(IndicatorSpec::Atr { period: 0 }.validate().is_err());
        assert_eq!(
            IndicatorSpec::Bollinger {
                period: 1,
                std_dev: 2.0
            }
            .validate(),
            Err(FeatureConfigError::BollingerPeriod(1))
        );
        assert!(IndicatorSpec::Keltner {
            period: 20,
            atr_period: 10,
            multiplier: f64::NAN
        }
        .validate()
        .is_err());
        assert_eq!(
            IndicatorSpec::Rsi { periods: vec![] }.validate(),
            Err(FeatureConfigError::NoPeriods)
        );
    }

    #[test]
    fn serialize_roundtrips_through_wire_form() {
        for (_, spec) in FeatureSet::default().iter() {
            let json = serde_json::to_string(spec).unwrap();
            let back: IndicatorSpec = serde_json::from_str(&json).unwrap();
            assert_eq!(&back, spec);
        }
    }

    #[test]
    fn feature_set_from_toml() {
        let text = r#"
            [[momentum]]
            name = "RSI"
            periods = [14, 28]

            [[volatility]]
            name = "BOLLINGER_BANDS"
            period = 10
            std_dev = 1.5

            [[volume]]
            name = "OBV"
        "#;
        let set: FeatureSet = toml::from_str(text).unwrap();
        assert_eq!(set.momentum.len(), 1);
        assert_eq!(
            set.volatility[0],
            IndicatorSpec::Bollinger {
                period: 10,
                std_dev: 1.5
            }
        );
        assert_eq!(set.volume, vec![IndicatorSpec::Obv]);
    }

    #[test]
    fn output_keys_per_spec() {
        assert_eq!(IndicatorSpec::Macd { fast: 1, slow: 2, signal: 3 }.output_keys().len(), 3);
        assert_eq!(
            IndicatorSpec::Rsi {
                periods: vec![7, 14]
            }
            .output_keys(),
            vec![FeatureKey::Rsi { period: 7 }, FeatureKey::Rsi { period: 14 }]
        );
        assert!(IndicatorSpec::Ignored { name: "X".into() }.output_keys().is_empty());
    }
}
