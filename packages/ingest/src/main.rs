#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the snow-removal parking-post sync.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use snow_posts_cli_utils::{IndicatifProgress, Stage};
use snow_posts_ingest::config::IngestConfig;
use snow_posts_ingest::{run_fill_missing, run_sync};

#[derive(Parser)]
#[command(name = "snow_posts", about = "Snow-removal parking-post sync")]
struct Cli {
    /// Configuration file merged over the built-in defaults (falls back to
    /// the `SNOW_POSTS_CONFIG` env var)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch all posts, resolve new ones, and publish the CSV
    Sync {
        /// Output CSV (overrides `output_csv` from the configuration)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Fill in empty or `MISSING_RUE` street labels of an existing CSV
    FillMissing {
        /// CSV to repair in place (defaults to `output_csv` from the
        /// configuration)
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = snow_posts_cli_utils::init_logger();
    let cli = Cli::parse();
    let mut config = IngestConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Sync { output } => {
            if let Some(output) = output {
                config.output_csv = output;
            }
            let progress = IndicatifProgress::posts_bar(&multi, Stage::Sync, "Syncing posts");
            let summary = run_sync(&config, &progress).await?;
            println!(
                "Wrote {} postes to {}",
                summary.total,
                config.output_csv.display()
            );
        }
        Commands::FillMissing { input } => {
            let path = input.unwrap_or_else(|| config.output_csv.clone());
            let progress = IndicatifProgress::posts_bar(&multi, Stage::Repair, "Repairing labels");
            let summary = run_fill_missing(&config, &path, &progress).await?;
            println!(
                "Updated {} rows; skipped existing {}.",
                summary.updated, summary.skipped
            );
        }
    }

    Ok(())
}
