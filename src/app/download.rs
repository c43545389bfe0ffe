//! `harvester download`: fetch one document per extracted row.

use anyhow::{Context, Result};
use harvester_core::download::Downloader;
use harvester_core::pipeline::FixedInterval;
use harvester_core::sink::read_records;
use harvester_core::{DownloadSummary, HarvestConfig};
use tracing::info;

use crate::cli::DownloadArgs;

pub(crate) async fn run_download(
    args: &DownloadArgs,
    config: &HarvestConfig,
) -> Result<DownloadSummary> {
    let records = read_records(&args.input, &config.output)
        .with_context(|| format!("failed to read results from {}", args.input.display()))?;
    info!(records = records.len(), "loaded extracted rows");

    let delay_ms = args.delay_ms.unwrap_or(config.pool.delay_ms);
    let downloader = Downloader::new(
        &config.download,
        &config.output,
        FixedInterval::from_millis(delay_ms),
    )?;

    let summary = downloader
        .run(&records, &args.output_dir)
        .await
        .with_context(|| format!("download into {} failed", args.output_dir.display()))?;
    Ok(summary)
}
