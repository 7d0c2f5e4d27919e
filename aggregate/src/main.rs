//! Batch aggregation of migration reports.

mod summary;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::summary::{render_table, summarize};

#[derive(Parser)]
#[command(
    name = "aggregate",
    version,
    about = "Aggregate migration reports across experiment results"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a results root for `report.yaml` files and print a per-pair
    /// summary table.
    Summarize {
        /// Directory containing experiment results.
        #[arg(long)]
        results: PathBuf,
        /// Also write the summary as JSON to this path.
        #[arg(long)]
        json: Option<PathBuf>,
    },
}

fn main() {
    migrator::logging::init();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Summarize { results, json } => cmd_summarize(&results, json.as_deref()),
    }
}

fn cmd_summarize(results: &Path, json: Option<&Path>) -> Result<()> {
    let summary = summarize(results)?;

    for warning in &summary.warnings {
        eprintln!("warning: {warning}");
    }
    print!("{}", render_table(&summary));

    if let Some(path) = json {
        let mut contents =
            serde_json::to_string_pretty(&summary).context("serialize summary")?;
        contents.push('\n');
        fs::write(path, contents).with_context(|| format!("write {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_summarize() {
        let cli = Cli::parse_from(["aggregate", "summarize", "--results", "/tmp/results"]);
        let Command::Summarize { results, json } = cli.command;
        assert_eq!(results, PathBuf::from("/tmp/results"));
        assert!(json.is_none());
    }

    #[test]
    fn summarize_requires_results() {
        assert!(Cli::try_parse_from(["aggregate", "summarize"]).is_err());
    }
}
