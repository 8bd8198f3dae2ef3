//! reportrun - concurrent report-generation runs
//!
//! The `reportrun` command fans a research query out to several report
//! generators at once and prints the canonical `(artifact_path, model)`
//! entries of the runs that succeeded.
//!
//! ## Commands
//!
//! - `run`: dispatch a batch, optionally retrying until a target count
//! - `normalize`: canonicalise a JSON file of raw run results
//! - `models`: list configured model identifiers

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{info, warn, Level};

use reportrun_core::backend::multi_agent::{MAX_SECTIONS_KEY, PUBLISH_FORMATS_KEY};
use reportrun_core::metrics::METRICS;
use reportrun_core::reporting::{read_raw_results, render_entries_md};
use reportrun_core::{
    normalize, normalize_raw, write_entries_json, CanonicalEntry, EntriesArtifact,
    OrchestratorConfig, Overrides, ReportKind, RetryDriver, RunScheduler, TargetRequest,
};

#[derive(Parser)]
#[command(name = "reportrun")]
#[command(version = reportrun_core::VERSION)]
#[command(
    about = "Run report generators concurrently and collect their artifacts",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file
    #[arg(long, global = true, env = "REPORTRUN_CONFIG", default_value = "reportrun.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch concurrent runs for a query
    Run {
        /// Research query
        #[arg(short, long)]
        query: String,

        /// Number of runs to dispatch in one batch
        #[arg(short = 'n', long, default_value = "1")]
        runs: usize,

        /// Report kind (research_report or multi_agent)
        #[arg(short, long, default_value = "research_report")]
        kind: ReportKind,

        /// Sections to research (multi_agent)
        #[arg(long)]
        max_sections: Option<u32>,

        /// Output formats to publish, comma separated (multi_agent)
        #[arg(long, value_delimiter = ',')]
        publish: Vec<String>,

        /// Keep dispatching the shortfall until this many entries exist
        #[arg(long, conflicts_with = "runs")]
        target: Option<usize>,

        /// Maximum dispatch rounds when --target is set
        #[arg(long, requires = "target")]
        max_attempts: Option<u32>,

        /// Write an entries artifact to this path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write a markdown summary to this path
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Canonicalise a JSON array of raw run results
    Normalize {
        /// Input file
        file: PathBuf,
    },

    /// List configured model identifiers
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    reportrun_core::telemetry::init_tracing(cli.json, level);

    let config = OrchestratorConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

    let result = match cli.command {
        Commands::Run {
            query,
            runs,
            kind,
            max_sections,
            publish,
            target,
            max_attempts,
            output,
            summary,
        } => {
            let sinks = Sinks {
                output: output.as_deref(),
                summary: summary.as_deref(),
            };
            let overrides = build_overrides(max_sections, &publish);
            match target {
                Some(desired) => {
                    let max_attempts = max_attempts.unwrap_or(config.retry.max_attempts);
                    let request = TargetRequest::new(&query, desired, kind, max_attempts)
                        .with_overrides(overrides);
                    cmd_run_target(&config, &request, sinks).await
                }
                None => cmd_run(&config, &query, runs, kind, &overrides, sinks).await,
            }
        }
        Commands::Normalize { file } => cmd_normalize(&file),
        Commands::Models => cmd_models(&config),
    };

    METRICS.flush();
    result
}

fn build_overrides(max_sections: Option<u32>, publish: &[String]) -> Overrides {
    let mut overrides = Overrides::new();
    if let Some(sections) = max_sections {
        overrides.insert(MAX_SECTIONS_KEY, sections);
    }
    if !publish.is_empty() {
        let formats: serde_json::Map<String, serde_json::Value> = publish
            .iter()
            .map(|format| format.trim())
            .filter(|format| !format.is_empty())
            .map(|format| (format.to_string(), serde_json::Value::Bool(true)))
            .collect();
        overrides.insert(PUBLISH_FORMATS_KEY, serde_json::Value::Object(formats));
    }
    overrides
}

/// Where a finished run writes its artifacts.
#[derive(Clone, Copy)]
struct Sinks<'a> {
    output: Option<&'a Path>,
    summary: Option<&'a Path>,
}

fn build_scheduler(config: &OrchestratorConfig) -> Result<RunScheduler> {
    config
        .build_scheduler()
        .context("Failed to configure report backends")
}

/// Dispatch one batch; Ctrl-C cancels runs still in flight.
async fn cmd_run(
    config: &OrchestratorConfig,
    query: &str,
    runs: usize,
    kind: ReportKind,
    overrides: &Overrides,
    sinks: Sinks<'_>,
) -> Result<()> {
    let scheduler = build_scheduler(config)?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; cancelling runs in flight");
            let _ = cancel_tx.send(true);
        }
    });

    let batch = scheduler
        .dispatch_with_cancel(query, runs, kind, overrides, cancel_rx)
        .await;
    interrupt.abort();
    let batch = batch.context("Dispatch failed")?;

    for (descriptor, outcome) in batch.iter() {
        if let Some(error) = outcome.error_summary() {
            info!(index = descriptor.index(), error = %error, "run failed");
        }
    }

    let entries = normalize(&batch);
    emit_entries(query, kind, runs, entries, sinks)
}

/// Retry the shortfall until `request.desired_count` entries exist.
async fn cmd_run_target(
    config: &OrchestratorConfig,
    request: &TargetRequest,
    sinks: Sinks<'_>,
) -> Result<()> {
    let scheduler = build_scheduler(config)?;
    let driver = RetryDriver::new(&scheduler).with_retry_delay(config.retry_delay());

    let outcome = driver
        .run_detailed(request)
        .await
        .context("Retry driver failed")?;

    for (round, summary) in outcome.rounds.iter().enumerate() {
        info!(
            round = round + 1,
            requested = summary.requested,
            succeeded = summary.succeeded,
            "round finished"
        );
    }

    emit_entries(
        &request.query,
        request.report_kind,
        request.desired_count,
        outcome.entries,
        sinks,
    )
}

fn emit_entries(
    query: &str,
    kind: ReportKind,
    requested: usize,
    entries: Vec<CanonicalEntry>,
    sinks: Sinks<'_>,
) -> Result<()> {
    let artifact = EntriesArtifact::new(query, kind, requested, entries);

    if !artifact.is_complete() {
        warn!(
            collected = artifact.entries.len(),
            requested, "fewer entries than requested"
        );
    }

    println!("{}", serde_json::to_string_pretty(&artifact.entries)?);

    if let Some(path) = sinks.output {
        write_entries_json(path, &artifact)?;
        info!(path = %path.display(), "wrote entries artifact");
    }
    if let Some(path) = sinks.summary {
        std::fs::write(path, render_entries_md(&artifact))
            .with_context(|| format!("write {:?}", path))?;
        info!(path = %path.display(), "wrote summary");
    }
    Ok(())
}

fn cmd_normalize(file: &Path) -> Result<()> {
    let raw = read_raw_results(file)?;
    let total = raw.len();
    let entries = normalize_raw(raw);
    info!(total, kept = entries.len(), "normalised results");
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

fn cmd_models(config: &OrchestratorConfig) -> Result<()> {
    let models = config.model_ids();
    if models.is_empty() {
        println!("No models configured.");
        return Ok(());
    }
    for model in models {
        println!("{}", model);
    }
    Ok(())
}
