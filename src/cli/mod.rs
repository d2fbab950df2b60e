//! Command-line surface: argument parsing and command execution.

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use crate::error::BioQueryError;
use crate::render::{csv, json};
use crate::router::ProgressObserver;
use crate::workflow;

pub mod health;

#[derive(Debug, Parser)]
#[command(
    name = "bioquery",
    version,
    about = "Biomedical research assistant over ClinicalTrials.gov and Open Targets"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a free-text biomedical query end to end
    Query {
        /// Query text, e.g. "phase 2 breast cancer trials in Boston"
        text: String,

        /// Output format for the query outcome
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Check connectivity to the upstream APIs and the local model server
    Health {
        /// Emit the report as JSON instead of markdown
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Csv,
}

/// Logs progress stages as they are reached. Visible with
/// `RUST_LOG=bioquery_cli=info`.
struct LogProgress;

impl ProgressObserver for LogProgress {
    fn notify(&mut self, percent: u8, stage: &str) -> anyhow::Result<()> {
        info!(percent, "{stage}");
        Ok(())
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<String> {
    match cli.command {
        Commands::Query { text, format } => {
            let text = text.trim();
            if text.is_empty() {
                return Err(
                    BioQueryError::InvalidArgument("query text is required".to_string()).into(),
                );
            }

            let mut progress = LogProgress;
            let outcome = workflow::run_query(text, Some(&mut progress)).await;

            match format {
                OutputFormat::Json => Ok(json::to_pretty(&outcome)?),
                OutputFormat::Csv => match outcome.error {
                    Some(error) => Err(anyhow::anyhow!(error)),
                    None => Ok(csv::records_to_csv(&outcome.results)),
                },
            }
        }
        Commands::Health { json: as_json } => {
            let report = health::check().await?;
            if as_json {
                Ok(json::to_pretty(&report)?)
            } else {
                Ok(report.to_markdown())
            }
        }
    }
}
