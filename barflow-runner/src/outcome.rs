//! Per-symbol and per-run results.
//!
//! A run never fails as a whole because one symbol did: each symbol ends in a
//! [`SymbolStatus`], and the [`RunOutcome`] folds them into a [`RunStatus`].

use std::fmt;

use serde::{Deserialize, Serialize};

use barflow_core::domain::Symbol;

/// Where in the per-symbol sequence a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    RawValidation,
    FeatureComputation,
    EnrichedValidation,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Fetch => "fetch",
            Stage::RawValidation => "raw_validation",
            Stage::FeatureComputation => "feature_computation",
            Stage::EnrichedValidation => "enriched_validation",
            Stage::Persist => "persist",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Worth retrying on a later run.
    TransientFetch,
    Fetch,
    Validation,
    Storage,
    Configuration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SymbolStatus {
    Succeeded {
        rows_written: usize,
        feature_columns: usize,
        /// BLAKE3 of the enriched series as persisted.
        content_hash: String,
    },
    /// The source had no rows for the window.
    Skipped { reason: String },
    Failed {
        stage: Stage,
        kind: FailureKind,
        cause: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolOutcome {
    pub symbol: Symbol,
    #[serde(flatten)]
    pub status: SymbolStatus,
    pub rows_fetched: usize,
    pub elapsed_ms: u64,
}

impl SymbolOutcome {
    pub fn is_succeeded(&self) -> bool {
        matches!(self.status, SymbolStatus::Succeeded { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, SymbolStatus::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, SymbolStatus::Skipped { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every symbol with data was persisted.
    Succeeded,
    /// Some symbols persisted, some failed.
    Partial,
    /// Nothing persisted and at least one symbol failed.
    Failed,
    /// No symbol had data.
    NoData,
}

impl RunStatus {
    fn from_outcomes(symbols: &[SymbolOutcome]) -> Self {
        let succeeded = symbols.iter().filter(|s| s.is_succeeded()).count();
        let failed = symbols.iter().filter(|s| s.is_failed()).count();
        match (succeeded, failed) {
            (0, 0) => RunStatus::NoData,
            (_, 0) => RunStatus::Succeeded,
            (0, _) => RunStatus::Failed,
            _ => RunStatus::Partial,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
            RunStatus::NoData => "no data",
        })
    }
}

/// Result of one `collect_and_process` or `update` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub measurement: String,
    pub symbols: Vec<SymbolOutcome>,
    pub elapsed_ms: u64,
}

impl RunOutcome {
    pub fn new(measurement: String, symbols: Vec<SymbolOutcome>, elapsed_ms: u64) -> Self {
        Self {
            status: RunStatus::from_outcomes(&symbols),
            measurement,
            symbols,
            elapsed_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn attempted(&self) -> usize {
        self.symbols.len()
    }

    pub fn succeeded(&self) -> usize {
        self.symbols.iter().filter(|s| s.is_succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.symbols.iter().filter(|s| s.is_failed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.symbols.iter().filter(|s| s.is_skipped()).count()
    }

    pub fn rows_written(&self) -> usize {
        self.symbols
            .iter()
            .map(|s| match s.status {
                SymbolStatus::Succeeded { rows_written, .. } => rows_written,
                _ => 0,
            })
            .sum()
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolOutcome> {
        self.symbols.iter().find(|s| s.symbol == symbol)
    }
}
