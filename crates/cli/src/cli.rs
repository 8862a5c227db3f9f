//! CLI command definitions and argument parsing.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// claimcheck - decompose text into claims and check each against web evidence.
#[derive(Debug, Parser)]
#[command(name = "claimcheck")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(short, long, value_enum, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Configuration file path (defaults to config/ layering and APP__ variables)
    #[arg(short, long, global = true, env = "CLAIMCHECK_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    Json,
    /// Markdown summary table
    Markdown,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fact-check a text, a text file, or a JSON batch
    Check(CheckArgs),

    /// Run one search query and print the evidence it yields
    Search(SearchArgs),
}

/// Arguments for the check command.
#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Text to check
    #[arg(short, long, conflicts_with_all = ["file", "json"])]
    pub text: Option<String>,

    /// Plain-text file to check
    #[arg(long, conflicts_with = "json")]
    pub file: Option<PathBuf>,

    /// JSON array of items to check in batch
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Only check the first N batch items
    #[arg(long, requires = "json")]
    pub limit: Option<usize>,

    /// Also write the JSON result to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the search command.
#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Query text
    pub query: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_batch_check() {
        let cli = Cli::parse_from([
            "claimcheck", "check", "--json", "items.json", "--limit", "5", "--format", "markdown",
        ]);
        assert_eq!(cli.format, OutputFormat::Markdown);
        match cli.command {
            Command::Check(args) => {
                assert_eq!(args.json, Some(PathBuf::from("items.json")));
                assert_eq!(args.limit, Some(5));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_text_and_json_conflict() {
        let parsed = Cli::try_parse_from(["claimcheck", "check", "--text", "a", "--json", "b.json"]);
        assert!(parsed.is_err());
    }
}
