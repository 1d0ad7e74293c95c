//! Tracemeter CLI
//!
//! Command-line interface for cost analysis, trace export and monitoring.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tracemeter::aggregation::aggregate_stream;
use tracemeter::alerting::{AlertEvaluator, NotificationSender};
use tracemeter::fetch::{HttpTransport, MetricsFetcher};
use tracemeter::models::{Summary, TimeRange, TraceRecord};
use tracemeter::report::{self, export, CostReport, Dashboard};
use tracemeter::Config;

/// Tracemeter - Usage, cost and alerting reports for LLM applications
#[derive(Parser)]
#[command(name = "tracemeter")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "TRACEMETER_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (for commands that support it)
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Break down costs by model, user and tag
    Costs {
        /// Number of days to analyze
        #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u32).range(1..=36_500))]
        days: u32,
    },

    /// Export traces to a JSON file
    Export {
        /// Number of days to export
        #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u32).range(1..=36_500))]
        days: u32,

        /// Output file
        #[arg(short, long, default_value = "traces.json")]
        output: PathBuf,

        /// Write compact JSON instead of pretty-printed
        #[arg(long)]
        compact: bool,
    },

    /// Show the dashboard and evaluate alert thresholds
    Monitor {
        /// Number of days to evaluate
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=36_500))]
        days: u32,

        /// Send triggered alerts to the configured channels
        #[arg(long)]
        notify: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    tracemeter::logging::init(&config.logging, cli.verbose);

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    // Execute command
    let result = match cli.command {
        Commands::Costs { days } => run_costs(&config, days, cli.format, &cancel).await,
        Commands::Export {
            days,
            output,
            compact,
        } => run_export(&config, days, &output, compact, cli.format, &cancel).await,
        Commands::Monitor { days, notify } => {
            run_monitor(&config, days, notify, cli.format, &cancel).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("Interrupted, stopping after the current page");
        cancel.cancel();
    }
}

fn build_fetcher(config: &Config) -> anyhow::Result<MetricsFetcher<HttpTransport>> {
    let transport = HttpTransport::new(&config.api)?;
    info!(host = %transport.base_url(), "Using platform API");
    Ok(MetricsFetcher::new(Arc::new(transport), config.api.page_size))
}

async fn fetch_summary(
    config: &Config,
    days: u32,
    cancel: &CancellationToken,
) -> anyhow::Result<Summary> {
    let fetcher = build_fetcher(config)?;
    let range = TimeRange::last_days(days, Utc::now())?;

    let outcome = aggregate_stream(fetcher.fetch_metrics(range, cancel.clone())).await;
    let summary = outcome.into_result().context("fetching metrics")?;

    if cancel.is_cancelled() {
        warn!(
            records = summary.records,
            "Fetch interrupted, report covers partial data"
        );
    }

    Ok(summary)
}

async fn run_costs(
    config: &Config,
    days: u32,
    format: OutputFormat,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    info!(days, "Analyzing costs");
    let summary = fetch_summary(config, days, cancel).await?;

    match format {
        OutputFormat::Text => print!("{}", CostReport { summary: &summary, days }),
        OutputFormat::Json => println!("{}", report::render_json(&summary, &[], true)?),
    }

    Ok(())
}

async fn run_export(
    config: &Config,
    days: u32,
    output: &Path,
    compact: bool,
    format: OutputFormat,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    info!(days, output = %output.display(), "Exporting traces");
    let fetcher = build_fetcher(config)?;
    let range = TimeRange::last_days(days, Utc::now())?;

    let records: Vec<TraceRecord> = fetcher
        .fetch_traces(range, cancel.clone())
        .try_collect()
        .await
        .context("fetching traces")?;

    if cancel.is_cancelled() {
        warn!(
            records = records.len(),
            "Fetch interrupted, export contains partial data"
        );
    }

    export::write_traces(output, &records, !compact)?;

    match format {
        OutputFormat::Text => {
            println!("Exported {} traces to {}", records.len(), output.display());
        }
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "exported": records.len(), "output": output })
        ),
    }

    Ok(())
}

async fn run_monitor(
    config: &Config,
    days: u32,
    notify: bool,
    format: OutputFormat,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    info!(days, notify, "Evaluating metrics");
    let summary = fetch_summary(config, days, cancel).await?;

    let evaluator = AlertEvaluator::new(config.alerting.active_thresholds());
    let alerts = evaluator.evaluate(&summary);

    match format {
        OutputFormat::Text => print!(
            "{}",
            Dashboard {
                summary: &summary,
                alerts: &alerts,
            }
        ),
        OutputFormat::Json => println!("{}", report::render_json(&summary, &alerts, true)?),
    }

    if !notify || alerts.is_empty() {
        return Ok(());
    }

    if config.alerting.channels.is_empty() {
        warn!("--notify given but no notification channels are configured");
        return Ok(());
    }

    let sender = NotificationSender::new(
        config.alerting.channels.clone(),
        config.alerting.notification_timeout,
    )?;
    let line = report::summary_line(&summary, &alerts);
    let results = sender.send_all(&alerts, &line).await;

    let delivered = results.iter().filter(|r| r.success).count();
    info!(delivered, channels = results.len(), "Notifications sent");
    if delivered < results.len() {
        eprintln!(
            "Warning: {} of {} notifications failed",
            results.len() - delivered,
            results.len()
        );
    }

    Ok(())
}
