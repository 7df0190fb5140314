//! Typed feature column keys.
//!
//! Every derived column is identified by a [`FeatureKey`]: the indicator kind
//! plus the parameters that distinguish its output. Column names exist only
//! at the storage boundary and round-trip through [`FeatureKey::column_name`]
//! and [`FeatureKey::from_column_name`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three output bands of a channel indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Upper,
    Middle,
    Lower,
}

impl Band {
    pub const ALL: [Band; 3] = [Band::Upper, Band::Middle, Band::Lower];

    fn as_str(&self) -> &'static str {
        match self {
            Band::Upper => "upper",
            Band::Middle => "middle",
            Band::Lower => "lower",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Band::ALL.iter().copied().find(|b| b.as_str() == s)
    }
}

/// The three MACD output lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MacdLine {
    Macd,
    Signal,
    Histogram,
}

/// Key of a derived feature column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FeatureKey {
    Rsi { period: usize },
    Macd(MacdLine),
    Adx { period: usize },
    Atr { period: usize },
    Bollinger { band: Band, period: usize },
    Keltner { band: Band, period: usize },
    Obv,
    Vwap,
    Cvd,
}

impl FeatureKey {
    pub fn column_name(&self) -> String {
        match self {
            FeatureKey::Rsi { period } => format!("rsi_{period}"),
            FeatureKey::Macd(MacdLine::Macd) => "macd".to_string(),
            FeatureKey::Macd(MacdLine::Signal) => "macd_signal".to_string(),
            FeatureKey::Macd(MacdLine::Histogram) => "macd_hist".to_string(),
            FeatureKey::Adx { period } => format!("adx_{period}"),
            FeatureKey::Atr { period } => format!("atr_{period}"),
            FeatureKey::Bollinger { band, period } => format!("bb_{}_{period}", band.as_str()),
            FeatureKey::Keltner { band, period } => format!("kc_{}_{period}", band.as_str()),
            FeatureKey::Obv => "obv".to_string(),
            FeatureKey::Vwap => "vwap".to_string(),
            FeatureKey::Cvd => "cvd".to_string(),
        }
    }

    /// Parse a stored column name back into its key.
    pub fn from_column_name(name: &str) -> Option<Self> {
        match name {
            "macd" => return Some(FeatureKey::Macd(MacdLine::Macd)),
            "macd_signal" => return Some(FeatureKey::Macd(MacdLine::Signal)),
            "macd_hist" => return Some(FeatureKey::Macd(MacdLine::Histogram)),
            "obv" => return Some(FeatureKey::Obv),
            "vwap" => return Some(FeatureKey::Vwap),
            "cvd" => return Some(FeatureKey::Cvd),
            _ => {}
        }

        let (prefix, period) = name.rsplit_once('_')?;
        let period = parse_period(period)?;
        match prefix {
            "rsi" => Some(FeatureKey::Rsi { period }),
            "adx" => Some(FeatureKey::Adx { period }),
            "atr" => Some(FeatureKey::Atr { period }),
            _ => {
                let (family, band) = prefix.split_once('_')?;
                let band = Band::parse(band)?;
                match family {
                    "bb" => Some(FeatureKey::Bollinger { band, period }),
                    "kc" => Some(FeatureKey::Keltner { band, period }),
                    _ => None,
                }
            }
        }
    }
}

/// Canonical decimal only, so that names round-trip exactly.
fn parse_period(s: &str) -> Option<usize> {
    if s.is_empty() || (s.len() > 1 && s.starts_with('0')) || !s.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    s.parse().ok()
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.column_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a feature column name")]
pub struct UnknownColumnName(pub String);

impl TryFrom<String> for FeatureKey {
    type Error = UnknownColumnName;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        FeatureKey::from_column_name(&s).ok_or(UnknownColumnName(s))
    }
}

impl From<FeatureKey> for String {
    fn from(key: FeatureKey) -> Self {
        key.column_name()
    }
}

/// Any column of an enriched series, as named by the quality gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    Open,
    High,
    Low,
    Close,
    Volume,
    Feature(FeatureKey),
}

impl Column {
    /// The five raw columns every series carries.
    pub const OHLCV: [Column; 5] = [
        Column::Open,
        Column::High,
        Column::Low,
        Column::Close,
        Column::Volume,
    ];

    pub fn name(&self) -> String {
        match self {
            Column::Open => "open".to_string(),
            Column::High => "high".to_string(),
            Column::Low => "low".to_string(),
            Column::Close => "close".to_string(),
            Column::Volume => "volume".to_string(),
            Column::Feature(key) => key.column_name(),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl From<FeatureKey> for Column {
    fn from(key: FeatureKey) -> Self {
        Column::Feature(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_sample_keys() -> Vec<FeatureKey> {
        let mut keys = vec![
            FeatureKey::Rsi { period: 14 },
            FeatureKey::Macd(MacdLine::Macd),
            FeatureKey::Macd(MacdLine::Signal),
            FeatureKey::Macd(MacdLine::Histogram),
            FeatureKey::Adx { period: 14 },
            FeatureKey::Atr { period: 10 },
            FeatureKey::Obv,
            FeatureKey::Vwap,
            FeatureKey::Cvd,
        ];
        for band in Band::ALL {
            keys.push(FeatureKey::Bollinger { band, period: 20 });
            keys.push(FeatureKey::Keltner { band, period: 20 });
        }
        keys
    }

    #[test]
    fn column_names_match_storage_convention() {
        assert_eq!(FeatureKey::Rsi { period: 14 }.column_name(), "rsi_14");
        assert_eq!(FeatureKey::Macd(MacdLine::Histogram).column_name(), "macd_hist");
        assert_eq!(
            FeatureKey::Bollinger {
                band: Band::Upper,
                period: 20
            }
            .column_name(),
            "bb_upper_20"
        );
        assert_eq!(
            FeatureKey::Keltner {
                band: Band::Lower,
                period: 10
            }
            .column_name(),
            "kc_lower_10"
        );
    }

    #[test]
    fn every_key_roundtrips_through_its_name() {
        for key in all_sample_keys() {
            let name = key.column_name();
            assert_eq!(FeatureKey::from_column_name(&name), Some(key), "{name}");
        }
    }

    #[test]
    fn rejects_non_feature_names() {
        for name in ["close", "rsi", "rsi_", "rsi_014", "rsi_x", "bb_outer_20", "zz_upper_20"] {
            assert_eq!(FeatureKey::from_column_name(name), None, "{name}");
        }
    }

    #[test]
    fn column_names_include_raw_fields() {
        let names: Vec<String> = Column::OHLCV.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["open", "high", "low", "close", "volume"]);
        assert_eq!(Column::from(FeatureKey::Obv).name(), "obv");
    }
}
