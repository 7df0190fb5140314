//! Pipeline orchestrator: fetch, gate, enrich, gate again, persist.
//!
//! Each symbol is processed independently. Errors inside one symbol's
//! sequence become a [`SymbolOutcome`] and never abort the rest of the run;
//! only configuration problems fail [`Pipeline::new`].

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use barflow_core::data::{
    symbol_tags, BarSource, BarStore, DataError, ParquetStore, StoreError,
};
use barflow_core::domain::{BarSeries, Interval, Symbol};
use barflow_core::features::FeatureEngine;
use barflow_core::quality::{QualityGate, QualityIssue};

use crate::config::{ConfigError, PipelineConfig};
use crate::outcome::{FailureKind, RunOutcome, Stage, SymbolOutcome, SymbolStatus};

/// Default window for [`Pipeline::get_latest_data`].
pub const DEFAULT_LATEST_DAYS: u32 = 30;

/// Which quality gate rejected a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Raw,
    Enriched,
}

impl std::fmt::Display for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Gate::Raw => "raw",
            Gate::Enriched => "enriched",
        })
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] DataError),

    #[error("{gate} data rejected: {issue}")]
    Validation { gate: Gate, issue: QualityIssue },

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Fetch(e) if e.is_transient() => FailureKind::TransientFetch,
            PipelineError::Fetch(_) => FailureKind::Fetch,
            PipelineError::Validation { .. } => FailureKind::Validation,
            PipelineError::Storage(_) => FailureKind::Storage,
            PipelineError::Configuration(_) => FailureKind::Configuration,
        }
    }
}

/// Overrides for one run. Unset fields come from `[collection]`.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub symbols: Option<Vec<Symbol>>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub interval: Option<Interval>,
}

/// Resolved time range and interval for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub interval: Interval,
}

pub struct Pipeline {
    config: PipelineConfig,
    source: Arc<dyn BarSource>,
    store: Arc<dyn BarStore>,
    engine: FeatureEngine,
    gate: QualityGate,
    pool: Option<rayon::ThreadPool>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn BarSource>,
        store: Arc<dyn BarStore>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let engine = FeatureEngine::new(&config.features).map_err(ConfigError::from)?;
        let gate = QualityGate::new(config.quality.clone());

        let pool = if config.pipeline.parallelism > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.pipeline.parallelism)
                .build()
                .map_err(|e| ConfigError::Invalid(format!("failed to build thread pool: {e}")))?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            config,
            source,
            store,
            engine,
            gate,
            pool,
        })
    }

    /// Source and Parquet store as named by the configuration.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        let source = config.source.build()?;
        let store: Arc<dyn BarStore> = Arc::new(ParquetStore::new(&config.store.root));
        Self::new(config, source, store)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn BarStore> {
        &self.store
    }

    pub fn engine(&self) -> &FeatureEngine {
        &self.engine
    }

    /// Run every requested symbol through the full sequence.
    pub fn collect_and_process(&self, request: &RunRequest) -> RunOutcome {
        let now = Utc::now();
        let collection = &self.config.collection;
        let window = Window {
            start: request
                .start
                .unwrap_or_else(|| collection.start_date.resolve_start(now)),
            end: request
                .end
                .unwrap_or_else(|| collection.end_date.resolve_end(now)),
            interval: request.interval.unwrap_or(collection.interval),
        };
        let symbols = request
            .symbols
            .clone()
            .unwrap_or_else(|| collection.symbols.clone());
        self.run(&symbols, window)
    }

    /// Re-run `[now - lookback_days, now]`, recomputing everything.
    pub fn update(&self, symbols: Option<&[Symbol]>, lookback_days: Option<u32>) -> RunOutcome {
        let days = lookback_days.unwrap_or(self.config.collection.lookback_days);
        let (start, end) = match lookback_window(days) {
            Ok(range) => range,
            Err(e) => {
                warn!(lookback_days = days, error = %e, "update rejected");
                let cause = PipelineError::from(e).to_string();
                let outcomes = symbols
                    .map(<[Symbol]>::to_vec)
                    .unwrap_or_else(|| self.config.collection.symbols.clone())
                    .iter()
                    .map(|s| failed(s, Stage::Fetch, FailureKind::Configuration, cause.clone()))
                    .collect();
                return RunOutcome::new(self.config.collection.interval.measurement(), outcomes, 0);
            }
        };
        let request = RunRequest {
            symbols: symbols.map(<[Symbol]>::to_vec),
            start: Some(start),
            end: Some(end),
            interval: None,
        };
        info!(lookback_days = days, "update");
        self.collect_and_process(&request)
    }

    /// Stored rows for `symbol` over the last `lookback_days`, or `None`
    /// when nothing is stored.
    pub fn get_latest_data(
        &self,
        symbol: &str,
        lookback_days: Option<u32>,
    ) -> Result<Option<BarSeries>, PipelineError> {
        let days = lookback_days.unwrap_or(DEFAULT_LATEST_DAYS);
        let (start, end) = lookback_window(days)?;
        let measurement = self.config.collection.interval.measurement();
        let series = self
            .store
            .read(&measurement, start, end, &symbol_tags(symbol))?;
        Ok((!series.is_empty()).then_some(series))
    }

    fn run(&self, symbols: &[Symbol], window: Window) -> RunOutcome {
        let started = Instant::now();
        let measurement = window.interval.measurement();

        // One worker per symbol; a repeated symbol would race on its partition.
        let mut unique: Vec<Symbol> = Vec::with_capacity(symbols.len());
        for s in symbols {
            if !unique.contains(s) {
                unique.push(s.clone());
            }
        }

        info!(
            symbols = unique.len(),
            %measurement,
            start = %window.start,
            end = %window.end,
            source = self.source.name(),
            "run started"
        );

        let outcomes: Vec<SymbolOutcome> = if window.start > window.end {
            let cause = format!("start {} is after end {}", window.start, window.end);
            unique
                .iter()
                .map(|s| failed(s, Stage::Fetch, FailureKind::Configuration, cause.clone()))
                .collect()
        } else if let Some(ref pool) = self.pool {
            pool.install(|| {
                unique
                    .par_iter()
                    .map(|symbol| self.process_symbol(symbol, &window))
                    .collect()
            })
        } else {
            let mut out = Vec::with_capacity(unique.len());
            for symbol in &unique {
                if !self.source.is_available() {
                    warn!(%symbol, source = self.source.name(), "source unavailable, skipping remaining symbols");
                    out.push(failed(
                        symbol,
                        Stage::Fetch,
                        FailureKind::TransientFetch,
                        DataError::CircuitBreakerTripped.to_string(),
                    ));
                    continue;
                }
                out.push(self.process_symbol(symbol, &window));
            }
            out
        };

        let run = RunOutcome::new(measurement, outcomes, elapsed_ms(started));
        info!(
            status = %run.status,
            succeeded = run.succeeded(),
            failed = run.failed(),
            skipped = run.skipped(),
            rows = run.rows_written(),
            elapsed_ms = run.elapsed_ms,
            "run finished"
        );
        run
    }

    /// Drive one symbol through every stage and report how far it got.
    pub fn process_symbol(&self, symbol: &str, window: &Window) -> SymbolOutcome {
        let started = Instant::now();
        let mut rows_fetched = 0;
        let status = match self.stages(symbol, window, &mut rows_fetched) {
            Ok(status) => status,
            Err((stage, err)) => {
                warn!(%symbol, %stage, error = %err, "symbol failed");
                SymbolStatus::Failed {
                    stage,
                    kind: err.kind(),
                    cause: err.to_string(),
                }
            }
        };
        SymbolOutcome {
            symbol: symbol.to_string(),
            status,
            rows_fetched,
            elapsed_ms: elapsed_ms(started),
        }
    }

    fn stages(
        &self,
        symbol: &str,
        window: &Window,
        rows_fetched: &mut usize,
    ) -> Result<SymbolStatus, (Stage, PipelineError)> {
        debug!(%symbol, stage = %Stage::Fetch, "fetching");
        let raw = self
            .source
            .fetch(symbol, window.start, window.end, window.interval)
            .map_err(|e| (Stage::Fetch, PipelineError::Fetch(e)))?;
        *rows_fetched = raw.len();
        if raw.is_empty() {
            info!(%symbol, "no rows in window");
            return Ok(SymbolStatus::Skipped {
                reason: format!("no rows between {} and {}", window.start, window.end),
            });
        }

        debug!(%symbol, stage = %Stage::RawValidation, rows = raw.len(), "validating");
        self.gate.gate_raw(&raw, window.interval).map_err(|issue| {
            (
                Stage::RawValidation,
                PipelineError::Validation {
                    gate: Gate::Raw,
                    issue,
                },
            )
        })?;

        debug!(%symbol, stage = %Stage::FeatureComputation, "computing features");
        let enriched = self.engine.compute(&raw);

        debug!(%symbol, stage = %Stage::EnrichedValidation, columns = enriched.features().len(), "validating");
        self.gate
            .gate_enriched(&enriched, self.engine.output_keys())
            .map_err(|issue| {
                (
                    Stage::EnrichedValidation,
                    PipelineError::Validation {
                        gate: Gate::Enriched,
                        issue,
                    },
                )
            })?;

        debug!(%symbol, stage = %Stage::Persist, "writing");
        let measurement = window.interval.measurement();
        let rows_written = self
            .store
            .write(&measurement, &enriched, &symbol_tags(symbol))
            .map_err(|e| (Stage::Persist, PipelineError::Storage(e)))?;

        let content_hash = enriched.content_hash();
        info!(%symbol, rows = rows_written, hash = %content_hash, "persisted");
        Ok(SymbolStatus::Succeeded {
            rows_written,
            feature_columns: enriched.features().len(),
            content_hash,
        })
    }
}

fn failed(symbol: &str, stage: Stage, kind: FailureKind, cause: String) -> SymbolOutcome {
    SymbolOutcome {
        symbol: symbol.to_string(),
        status: SymbolStatus::Failed { stage, kind, cause },
        rows_fetched: 0,
        elapsed_ms: 0,
    }
}

/// `[now - days, now]`; a start before the calendar's range is a
/// configuration error.
fn lookback_window(days: u32) -> Result<(DateTime<Utc>, DateTime<Utc>), ConfigError> {
    let end = Utc::now();
    end.checked_sub_signed(Duration::days(i64::from(days)))
        .map(|start| (start, end))
        .ok_or_else(|| ConfigError::Invalid(format!("lookback of {days} days is out of range")))
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
