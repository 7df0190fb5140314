//! barflow CLI: run the bar pipeline and manage the store.
//!
//! Commands:
//! - `run`: fetch, validate, enrich and persist the configured symbols
//! - `update`: re-run the last N days
//! - `latest`: print recently stored rows for one symbol
//! - `init-config`: write a default configuration file
//! - `store list` / `store delete`: inspect or prune stored partitions

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use barflow_core::data::{symbol_tags, write_csv, BarStore, ParquetStore};
use barflow_core::domain::{BarSeries, Interval};
use barflow_runner::{
    Pipeline, PipelineConfig, RunOutcome, RunRequest, RunStatus, SourceKind, SymbolStatus,
};

#[derive(Parser)]
#[command(
    name = "barflow",
    about = "barflow: OHLCV collection, validation and feature pipeline"
)]
struct Cli {
    /// Path to the TOML configuration. Defaults apply when the file is absent.
    #[arg(long, global = true, default_value = "barflow.toml")]
    config: PathBuf,

    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    /// Print results as JSON.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, validate, enrich and store bars for the configured symbols.
    Run {
        /// Symbols to process. Defaults to `collection.symbols`.
        symbols: Vec<String>,

        /// Start date (YYYY-MM-DD). Defaults to `collection.start_date`.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD), inclusive. Defaults to `collection.end_date`.
        #[arg(long)]
        end: Option<String>,

        /// Bar interval, e.g. 1d or 1h. Defaults to `collection.interval`.
        #[arg(long)]
        interval: Option<String>,

        /// Override the configured source: yahoo, csv or synthetic.
        #[arg(long)]
        source: Option<String>,
    },
    /// Re-run the pipeline over the last N days.
    Update {
        symbols: Vec<String>,

        /// Lookback in days. Defaults to `collection.lookback_days`.
        #[arg(long)]
        days: Option<u32>,

        /// Override the configured source: yahoo, csv or synthetic.
        #[arg(long)]
        source: Option<String>,
    },
    /// Print stored rows for a symbol.
    Latest {
        symbol: String,

        /// Lookback in days.
        #[arg(long, default_value_t = barflow_runner::DEFAULT_LATEST_DAYS)]
        days: u32,

        /// Print every row as CSV instead of a summary.
        #[arg(long, default_value_t = false)]
        csv: bool,
    },
    /// Write the default configuration.
    InitConfig {
        /// Destination. Defaults to --config.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Store management commands.
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },
}

#[derive(Subcommand)]
enum StoreAction {
    /// List stored partitions.
    List {
        /// Only this measurement, e.g. market_data_1d.
        #[arg(long)]
        measurement: Option<String>,
    },
    /// Delete a symbol's rows within a date range.
    Delete {
        symbol: String,

        /// Start date (YYYY-MM-DD). Defaults to the beginning of time.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD), inclusive. Defaults to now.
        #[arg(long)]
        end: Option<String>,

        /// Interval of the measurement. Defaults to `collection.interval`.
        #[arg(long)]
        interval: Option<String>,

        /// Actually delete (without this flag, only previews what would be removed).
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            symbols,
            start,
            end,
            interval,
            source,
        } => {
            let config = load_config(&cli.config, source.as_deref())?;
            let request = RunRequest {
                symbols: (!symbols.is_empty()).then_some(symbols),
                start: start.as_deref().map(parse_start).transpose()?,
                end: end.as_deref().map(parse_end).transpose()?,
                interval: interval.as_deref().map(parse_interval).transpose()?,
            };
            let pipeline = Pipeline::from_config(config)?;
            let outcome = pipeline.collect_and_process(&request);
            report(&outcome, cli.json)?;
            std::process::exit(exit_code(&outcome));
        }
        Commands::Update {
            symbols,
            days,
            source,
        } => {
            let config = load_config(&cli.config, source.as_deref())?;
            let pipeline = Pipeline::from_config(config)?;
            let symbols = (!symbols.is_empty()).then_some(symbols);
            let outcome = pipeline.update(symbols.as_deref(), days);
            report(&outcome, cli.json)?;
            std::process::exit(exit_code(&outcome));
        }
        Commands::Latest { symbol, days, csv } => {
            let config = load_config(&cli.config, None)?;
            let pipeline = Pipeline::from_config(config)?;
            match pipeline.get_latest_data(&symbol, Some(days))? {
                None => {
                    println!("No stored data for {symbol} in the last {days} days.");
                    std::process::exit(1);
                }
                Some(series) if csv => print!("{}", write_csv(&series)?),
                Some(series) => print_series_summary(&series, cli.json)?,
            }
            Ok(())
        }
        Commands::InitConfig { output, force } => {
            let path = output.unwrap_or(cli.config);
            init_config(&path, force)
        }
        Commands::Store { action } => {
            let config = load_config(&cli.config, None)?;
            let store = ParquetStore::new(&config.store.root);
            match action {
                StoreAction::List { measurement } => {
                    store_list(&store, measurement.as_deref(), cli.json)
                }
                StoreAction::Delete {
                    symbol,
                    start,
                    end,
                    interval,
                    confirm,
                } => {
                    let interval = match interval.as_deref() {
                        Some(s) => parse_interval(s)?,
                        None => config.collection.interval,
                    };
                    let start = match start.as_deref() {
                        Some(s) => parse_start(s)?,
                        None => DateTime::<Utc>::MIN_UTC,
                    };
                    let end = match end.as_deref() {
                        Some(s) => parse_end(s)?,
                        None => Utc::now(),
                    };
                    store_delete(&store, &symbol, interval, start, end, confirm)
                }
            }
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &Path, source: Option<&str>) -> Result<PipelineConfig> {
    let mut config = if path.exists() {
        PipelineConfig::from_file(path)?
    } else {
        warn!(path = %path.display(), "configuration file not found, using defaults");
        PipelineConfig::default()
    };
    if let Some(kind) = source {
        config.source.kind = match kind {
            "yahoo" => SourceKind::Yahoo,
            "csv" => SourceKind::Csv,
            "synthetic" => SourceKind::Synthetic,
            _ => bail!("unknown source '{kind}'. Valid: yahoo, csv, synthetic"),
        };
    }
    Ok(config)
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
}

fn parse_start(s: &str) -> Result<DateTime<Utc>> {
    let date = parse_date(s)?;
    Ok(date.and_hms_opt(0, 0, 0).context("invalid time")?.and_utc())
}

fn parse_end(s: &str) -> Result<DateTime<Utc>> {
    let date = parse_date(s)?;
    Ok(date.and_hms_opt(23, 59, 59).context("invalid time")?.and_utc())
}

fn parse_interval(s: &str) -> Result<Interval> {
    s.parse::<Interval>()
        .with_context(|| format!("invalid interval '{s}'"))
}

/// 0 when every symbol with data was stored, 2 on partial success, 1 otherwise.
fn exit_code(outcome: &RunOutcome) -> i32 {
    match outcome.status {
        RunStatus::Succeeded => 0,
        RunStatus::Partial => 2,
        RunStatus::Failed | RunStatus::NoData => 1,
    }
}

fn report(outcome: &RunOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    println!();
    println!("=== {} ===", outcome.measurement);
    println!("{:<10} {:<10} {:>8} {:>8}  Detail", "Symbol", "Status", "Fetched", "Written");
    println!("{}", "-".repeat(72));
    for s in &outcome.symbols {
        let (status, written, detail) = match &s.status {
            SymbolStatus::Succeeded {
                rows_written,
                feature_columns,
                content_hash,
            } => (
                "ok",
                rows_written.to_string(),
                format!("{feature_columns} features, hash {}", short_hash(content_hash)),
            ),
            SymbolStatus::Skipped { reason } => ("skipped", "-".to_string(), reason.clone()),
            SymbolStatus::Failed { stage, cause, .. } => {
                ("failed", "-".to_string(), format!("[{stage}] {cause}"))
            }
        };
        println!(
            "{:<10} {:<10} {:>8} {:>8}  {detail}",
            s.symbol, status, s.rows_fetched, written
        );
    }
    println!();
    println!(
        "Status: {} ({} ok, {} failed, {} skipped, {} rows) in {} ms",
        outcome.status,
        outcome.succeeded(),
        outcome.failed(),
        outcome.skipped(),
        outcome.rows_written(),
        outcome.elapsed_ms
    );
    Ok(())
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

fn print_series_summary(series: &BarSeries, json: bool) -> Result<()> {
    let columns: Vec<String> = series.features().keys().map(|k| k.column_name()).collect();
    let last = series.bars().last();

    if json {
        let value = serde_json::json!({
            "symbol": series.symbol(),
            "interval": series.interval().as_str(),
            "rows": series.len(),
            "start": series.first_timestamp(),
            "end": series.last_timestamp(),
            "columns": columns,
            "content_hash": series.content_hash(),
            "last_close": last.map(|b| b.close),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Symbol:    {}", series.symbol());
    println!("Interval:  {}", series.interval());
    println!("Rows:      {}", series.len());
    if let (Some(start), Some(end)) = (series.first_timestamp(), series.last_timestamp()) {
        println!("Range:     {} .. {}", start.format("%Y-%m-%d %H:%M"), end.format("%Y-%m-%d %H:%M"));
    }
    if let Some(bar) = last {
        println!(
            "Last bar:  O {:.2}  H {:.2}  L {:.2}  C {:.2}  V {:.0}",
            bar.open, bar.high, bar.low, bar.close, bar.volume
        );
    }
    println!("Features:  {}", columns.join(", "));
    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (pass --force to overwrite)", path.display());
    }
    let text = PipelineConfig::default().to_toml()?;
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn store_list(store: &ParquetStore, measurement: Option<&str>, json: bool) -> Result<()> {
    let measurements = match measurement {
        Some(m) => vec![m.to_string()],
        None => store.list_measurements()?,
    };
    let mut partitions = Vec::new();
    for m in &measurements {
        partitions.extend(store.partitions(m)?);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&partitions)?);
        return Ok(());
    }
    if partitions.is_empty() {
        println!("Store is empty: {}", store.root().display());
        return Ok(());
    }

    println!("Store: {}", store.root().display());
    println!();
    println!(
        "{:<18} {:<10} {:<23} {:>8} {:>8}  Written",
        "Measurement", "Symbol", "Date Range", "Rows", "Columns"
    );
    println!("{}", "-".repeat(90));
    for p in &partitions {
        let symbol = p.tags.get(barflow_core::data::SYMBOL_TAG).map(String::as_str).unwrap_or("-");
        let range = format!("{} .. {}", p.start.format("%Y-%m-%d"), p.end.format("%Y-%m-%d"));
        println!(
            "{:<18} {:<10} {:<23} {:>8} {:>8}  {}",
            p.measurement,
            symbol,
            range,
            p.rows,
            p.columns.len(),
            p.written_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

fn store_delete(
    store: &ParquetStore,
    symbol: &str,
    interval: Interval,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    confirm: bool,
) -> Result<()> {
    let measurement = interval.measurement();
    let tags = symbol_tags(symbol);
    let matching = store.read(&measurement, start, end, &tags)?;

    if matching.is_empty() {
        println!("No rows for {symbol} in {measurement} between {start} and {end}.");
        return Ok(());
    }

    println!("{} row(s) for {symbol} in {measurement} between {start} and {end}.", matching.len());
    if !confirm {
        println!();
        println!("Dry run: pass --confirm to actually delete.");
        return Ok(());
    }

    let removed = store.delete(&measurement, start, end, &tags)?;
    info!(%symbol, %measurement, rows = removed, "deleted");
    println!("Removed {removed} row(s).");
    Ok(())
}
