//! `harvester crawl`: walk the listing and write the job CSV for `extract`.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use harvester_core::crawl::{ListingCrawler, merge_jobs, write_jobs};
use harvester_core::pipeline::FixedInterval;
use harvester_core::queue::Job;
use harvester_core::session::SessionGuard;
use harvester_core::{HarvestConfig, load_jobs};
use tracing::{info, warn};

use crate::app::extract::build_factory;
use crate::cli::CrawlArgs;

/// Counts reported when a crawl finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CrawlReport {
    pub(crate) pages: usize,
    pub(crate) collected: usize,
    pub(crate) added: usize,
    pub(crate) total: usize,
}

impl fmt::Display for CrawlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pages, {} rows collected, {} new, {} in job list",
            self.pages, self.collected, self.added, self.total
        )
    }
}

/// Folds the crawl flags into `config` and re-validates it.
pub(crate) fn apply_overrides(args: &CrawlArgs, config: &mut HarvestConfig) -> Result<()> {
    if let Some(url) = &args.url {
        config.crawl.start_url.clone_from(url);
    }
    if let Some(max_pages) = args.max_pages {
        config.crawl.max_pages = usize::from(max_pages);
    }
    config
        .validate()
        .context("configuration invalid after applying command-line flags")
}

/// Loads the rows the new job list starts from.
fn prior_jobs(args: &CrawlArgs, config: &HarvestConfig) -> Result<Vec<Job>> {
    let source: Option<&Path> = match &args.merge {
        Some(path) => Some(path.as_path()),
        None if args.output.exists() => Some(args.output.as_path()),
        None => None,
    };
    let Some(source) = source else {
        return Ok(Vec::new());
    };
    let jobs = load_jobs(source, &config.input)
        .with_context(|| format!("failed to load prior jobs from {}", source.display()))?;
    info!(path = %source.display(), jobs = jobs.len(), "merging with prior job list");
    Ok(jobs)
}

pub(crate) async fn run_crawl(args: &CrawlArgs, mut config: HarvestConfig) -> Result<CrawlReport> {
    apply_overrides(args, &mut config)?;
    let prior = prior_jobs(args, &config)?;

    let crawler = ListingCrawler::new(&config.crawl)?;
    let factory = build_factory(args.backend, &config.page)?;
    let pacer = FixedInterval::from_millis(args.delay_ms.unwrap_or(config.pool.delay_ms));

    let mut session = SessionGuard::open(factory.as_ref())
        .await
        .context("failed to open a rendering session")?;
    let result = crawler
        .crawl(&mut session, &config.crawl.start_url, &pacer)
        .await;
    if let Err(e) = session.close().await {
        warn!(error = %e, "session did not close cleanly");
    }
    let summary = result.with_context(|| format!("crawl of {} failed", config.crawl.start_url))?;

    let prior_len = prior.len();
    let collected = summary.jobs.len();
    let merged = merge_jobs(prior, summary.jobs);
    write_jobs(&args.output, &config.input, &merged)?;

    Ok(CrawlReport {
        pages: summary.pages,
        collected,
        added: merged.len() - prior_len,
        total: merged.len(),
    })
}
