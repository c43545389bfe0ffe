//! CLI entry point for the harvester tool.

use anyhow::{Context, Result};
use clap::Parser;
use harvester_core::HarvestConfig;
use tracing::{debug, info};

mod app;
mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?cli, "CLI arguments parsed");
    info!("Harvester starting");

    let config = HarvestConfig::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;

    match &cli.command {
        Command::Crawl(args) => {
            let report = app::crawl::run_crawl(args, config).await?;
            info!(%report, path = %args.output.display(), "Crawl finished");
        }
        Command::Extract(args) => {
            let show_progress = args.progress && !cli.quiet;
            let summary = app::extract::run_extract(args, config, show_progress).await?;
            info!(%summary, "Extraction finished");
        }
        Command::Download(args) => {
            let summary = app::download::run_download(args, &config).await?;
            info!(%summary, "Download finished");
        }
    }

    Ok(())
}
