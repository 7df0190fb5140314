//! Domain types: bars, intervals, series, feature keys.

pub mod bar;
pub mod feature_key;
pub mod interval;
pub mod series;

pub use bar::Bar;
pub use feature_key::{Band, Column, FeatureKey, MacdLine, UnknownColumnName};
pub use interval::{Interval, ParseIntervalError};
pub use series::{BarSeries, FeatureColumn, SeriesError};

/// Symbol type alias
pub type Symbol = String;
