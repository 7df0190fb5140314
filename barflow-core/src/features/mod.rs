//! Feature derivation: configuration specs and the engine that applies them.

pub mod engine;
pub mod spec;

pub use engine::FeatureEngine;
pub use spec::{Family, FeatureConfigError, FeatureSet, IndicatorSpec, RawIndicator};
