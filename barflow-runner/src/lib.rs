//! barflow runner: configuration and pipeline orchestration.
//!
//! This crate builds on `barflow-core` to provide:
//! - TOML pipeline configuration with defaults for every field
//! - The per-symbol fetch / gate / enrich / gate / persist sequence
//! - Per-symbol outcomes folded into a run status

pub mod config;
pub mod outcome;
pub mod pipeline;

pub use config::{
    CollectionConfig, ConfigError, DateBound, ExecutionConfig, PipelineConfig, SourceConfig,
    SourceKind, StoreConfig,
};
pub use outcome::{FailureKind, RunOutcome, RunStatus, Stage, SymbolOutcome, SymbolStatus};
pub use pipeline::{Gate, Pipeline, PipelineError, RunRequest, Window, DEFAULT_LATEST_DAYS};
