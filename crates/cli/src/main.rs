//! claimcheck command line
//!
//! One-shot and batch front end for the fact-checking pipeline. Results go
//! to stdout (JSON or a markdown table); logs go to stderr.

mod batch;
mod cli;
mod output;

use anyhow::{bail, Context, Result};
use clap::Parser;
use claimcheck_common::{AppConfig, FactChecker};
use cli::{CheckArgs, Cli, Command, OutputFormat};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path).with_context(|| format!("loading config from {}", path))?,
        None => AppConfig::load().context("loading configuration")?,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let checker = FactChecker::from_config(&config).context("assembling pipeline")?;

    match cli.command {
        Command::Check(args) => check(&checker, args, cli.format).await,
        Command::Search(args) => {
            let evidence = checker.search(&args.query).await;
            println!("{}", serde_json::to_string_pretty(&evidence)?);
            Ok(())
        }
    }
}

async fn check(checker: &FactChecker, args: CheckArgs, format: OutputFormat) -> Result<()> {
    if let Some(path) = &args.json {
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let items: Vec<Value> =
            serde_json::from_str(&raw).with_context(|| format!("{} is not a JSON array", path.display()))?;

        let result = batch::run_batch(checker, &items, args.limit).await;
        tracing::info!(
            total = result.summary.total,
            successful = result.summary.successful,
            seconds = result.timing.total_seconds,
            "Batch finished"
        );
        return emit(&result, || output::batch_table(&result), format, args.output.as_deref());
    }

    let text = match (&args.text, &args.file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?,
        (None, None) => bail!("one of --text, --file or --json is required"),
    };
    if text.trim().is_empty() {
        bail!("nothing to check: input text is empty");
    }

    let report = checker.check(&text).await?;
    emit(&report, || output::report_markdown(&text, &report), format, args.output.as_deref())
}

/// Print in the chosen format; `output` always receives JSON
fn emit<T: Serialize>(
    value: &T,
    markdown: impl FnOnce() -> String,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    if let Some(path) = output {
        std::fs::write(path, &json).with_context(|| format!("writing {}", path.display()))?;
    }
    match format {
        OutputFormat::Json => println!("{}", json),
        OutputFormat::Markdown => println!("{}", markdown()),
    }
    Ok(())
}
