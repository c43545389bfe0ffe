//! Listing crawl: walks a paginated listing table and collects the jobs the
//! extract step consumes.
//!
//! One session renders the first listing page, optionally clicks a filter
//! control, then follows the "next page" control until it is missing or
//! disabled. Every table row yields one [`Job`]: the identifier is the text
//! of the name cell, the target is the first link in the link cell resolved
//! against the page URL.
//!
//! A next control carrying a real `href` is followed with a plain page load,
//! which every backend supports. A control without one (a script handler) is
//! clicked, which needs the Chromium backend.
//!
//! The job list is written as `identifier,target` CSV with a UTF-8 BOM, the
//! same layout [`load_jobs`](crate::parser::load_jobs) reads.
//!
//! # Example
//!
//! ```no_run
//! use harvester_core::crawl::{ListingCrawler, ListingProfile, write_jobs};
//! use harvester_core::parser::InputColumns;
//! use harvester_core::pipeline::FixedInterval;
//! use harvester_core::session::{HttpSessionFactory, PageProfile, SessionGuard};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let profile = ListingProfile::default();
//! let crawler = ListingCrawler::new(&profile)?;
//! let factory = HttpSessionFactory::new(&PageProfile::default())?;
//! let mut session = SessionGuard::open(&factory).await?;
//! let summary = crawler
//!     .crawl(&mut session, &profile.start_url, &FixedInterval::from_millis(1000))
//!     .await?;
//! session.close().await?;
//! write_jobs(Path::new("jobs.csv"), &InputColumns::default(), &summary.jobs)?;
//! # Ok(())
//! # }
//! ```

mod error;

pub use error::CrawlError;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::parser::InputColumns;
use crate::pipeline::Pacer;
use crate::queue::Job;
use crate::session::{Navigation, RenderedPage, SessionGuard};

/// First page of the IPO project listing.
pub const DEFAULT_START_URL: &str = "http://listing.szse.cn/projectdynamic/ipo/index.html";

/// Rows of the project table.
pub const DEFAULT_ROW_SELECTOR: &str = "tbody.projectdynamic-tbody-con tr";

/// Cells within a row.
pub const DEFAULT_CELL_SELECTOR: &str = "td";

/// Zero-based cell holding the company name and its detail link.
pub const DEFAULT_NAME_COLUMN: usize = 1;

/// Pagination control that moves to the next page.
pub const DEFAULT_NEXT_SELECTOR: &str = r#"li.next[data-show="next"]"#;

/// Class the next control carries on the last page.
pub const DEFAULT_DISABLED_CLASS: &str = "disabled";

/// Default bound on pages walked in one crawl.
pub const DEFAULT_MAX_PAGES: usize = 500;

/// Upper limit for `max_pages`.
pub const MAX_PAGES_LIMIT: usize = 10_000;

/// UTF-8 byte-order mark written at the start of job lists.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Where the listing lives and how its table and pagination look (`[crawl]`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListingProfile {
    /// First listing page.
    pub start_url: String,
    /// CSS selector of one table row.
    pub row_selector: String,
    /// CSS selector of the cells within a row.
    pub cell_selector: String,
    /// Zero-based cell whose text is the identifier.
    pub name_column: usize,
    /// Zero-based cell whose first link is the target.
    pub link_column: usize,
    /// CSS selector of the next-page control.
    pub next_selector: String,
    /// Class marking the next control as disabled.
    pub disabled_class: String,
    /// Control clicked once after the first page loads (a stage filter, say).
    pub filter_selector: Option<String>,
    /// Stop after this many pages.
    pub max_pages: usize,
}

impl Default for ListingProfile {
    fn default() -> Self {
        Self {
            start_url: DEFAULT_START_URL.to_string(),
            row_selector: DEFAULT_ROW_SELECTOR.to_string(),
            cell_selector: DEFAULT_CELL_SELECTOR.to_string(),
            name_column: DEFAULT_NAME_COLUMN,
            link_column: DEFAULT_NAME_COLUMN,
            next_selector: DEFAULT_NEXT_SELECTOR.to_string(),
            disabled_class: DEFAULT_DISABLED_CLASS.to_string(),
            filter_selector: None,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

/// Outcome of one crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    /// Listing pages collected.
    pub pages: usize,
    /// Jobs in page order.
    pub jobs: Vec<Job>,
    /// Rows without a name or link.
    pub skipped_rows: usize,
}

/// Compiled selectors for one [`ListingProfile`].
#[derive(Debug, Clone)]
pub struct ListingCrawler {
    rows: Selector,
    cells: Selector,
    link: Selector,
    next: Selector,
    next_selector: String,
    filter_selector: Option<String>,
    disabled_class: String,
    name_column: usize,
    link_column: usize,
    max_pages: usize,
}

fn compile(selector: &str) -> Result<Selector, CrawlError> {
    Selector::parse(selector).map_err(|e| CrawlError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

fn cell_text(cell: &ElementRef<'_>) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Returns `href` when it names a page rather than a script handler.
fn page_href(href: &str) -> Option<&str> {
    let href = href.trim();
    let scripted = href.is_empty()
        || href.starts_with('#')
        || href.to_ascii_lowercase().starts_with("javascript:");
    (!scripted).then_some(href)
}

impl ListingCrawler {
    /// Compiles the profile's selectors.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::InvalidSelector`] for selectors that are not valid CSS.
    pub fn new(profile: &ListingProfile) -> Result<Self, CrawlError> {
        if let Some(filter) = &profile.filter_selector {
            compile(filter)?;
        }
        Ok(Self {
            rows: compile(&profile.row_selector)?,
            cells: compile(&profile.cell_selector)?,
            link: compile("a[href]")?,
            next: compile(&profile.next_selector)?,
            next_selector: profile.next_selector.clone(),
            filter_selector: profile.filter_selector.clone(),
            disabled_class: profile.disabled_class.clone(),
            name_column: profile.name_column,
            link_column: profile.link_column,
            max_pages: profile.max_pages,
        })
    }

    /// Reads the jobs on one page; returns them with the number of rows skipped.
    #[must_use]
    pub fn parse_rows(&self, page: &RenderedPage) -> (Vec<Job>, usize) {
        let document = Html::parse_document(&page.html);
        let mut jobs = Vec::new();
        let mut skipped = 0;

        for row in document.select(&self.rows) {
            let cells: Vec<ElementRef<'_>> = row.select(&self.cells).collect();
            let identifier = cells
                .get(self.name_column)
                .map(cell_text)
                .filter(|name| !name.is_empty());
            let target = cells
                .get(self.link_column)
                .and_then(|cell| cell.select(&self.link).next())
                .and_then(|anchor| anchor.value().attr("href"))
                .and_then(page_href)
                .map(|href| {
                    page.url
                        .join(href)
                        .map_or_else(|_| href.to_string(), String::from)
                });

            match (identifier, target) {
                (Some(identifier), Some(target)) => jobs.push(Job::new(identifier, target)),
                _ => {
                    debug!(cells = cells.len(), "row without name or link; skipping");
                    skipped += 1;
                }
            }
        }
        (jobs, skipped)
    }

    /// Works out how to reach the page after `page`.
    ///
    /// Returns `None` on the last page: the control is absent or disabled.
    #[must_use]
    pub fn next_step(&self, page: &RenderedPage) -> Option<Navigation> {
        let document = Html::parse_document(&page.html);
        let control = document.select(&self.next).next()?;

        let disabled = control
            .value()
            .classes()
            .any(|class| class == self.disabled_class)
            || control.value().attr("disabled").is_some();
        if disabled {
            return None;
        }

        let href = control
            .value()
            .attr("href")
            .or_else(|| {
                control
                    .select(&self.link)
                    .next()
                    .and_then(|anchor| anchor.value().attr("href"))
            })
            .and_then(page_href);

        Some(match href.and_then(|href| page.url.join(href).ok()) {
            Some(url) => Navigation::Goto(url.into()),
            None => Navigation::Click(self.next_selector.clone()),
        })
    }

    /// Walks the listing from `start_url` and collects every row.
    ///
    /// `pacer` runs between pages. The walk stops on the last page, at
    /// `max_pages`, or when a next link points back to a page already seen.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Session`] if a page cannot be rendered, including
    /// a click-only next control on a backend that cannot click.
    #[instrument(skip(self, session, pacer))]
    pub async fn crawl(
        &self,
        session: &mut SessionGuard,
        start_url: &str,
        pacer: &dyn Pacer,
    ) -> Result<CrawlSummary, CrawlError> {
        let mut summary = CrawlSummary::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut navigation = Navigation::Goto(start_url.to_string());
        let mut filter = self.filter_selector.clone();

        loop {
            let page = session.render(&navigation, &self.rows).await?;
            visited.insert(page.url.to_string());

            if let Some(selector) = filter.take() {
                debug!(%selector, "applying listing filter");
                navigation = Navigation::Click(selector);
                continue;
            }

            let (jobs, skipped) = self.parse_rows(&page);
            summary.pages += 1;
            summary.skipped_rows += skipped;
            info!(
                page = summary.pages,
                rows = jobs.len(),
                url = %page.url,
                "collected listing page"
            );
            summary.jobs.extend(jobs);

            let Some(next) = self.next_step(&page) else {
                debug!("no further pages");
                break;
            };
            if summary.pages >= self.max_pages {
                warn!(max_pages = self.max_pages, "page limit reached; stopping crawl");
                break;
            }
            if let Navigation::Goto(url) = &next
                && visited.contains(url)
            {
                warn!(%url, "next page was already collected; stopping crawl");
                break;
            }

            navigation = next;
            pacer.pause().await;
        }

        info!(
            pages = summary.pages,
            jobs = summary.jobs.len(),
            skipped_rows = summary.skipped_rows,
            "crawl complete"
        );
        Ok(summary)
    }
}

/// Appends the `fresh` jobs that `prior` does not already hold.
///
/// `prior` is kept as is, duplicates included; within `fresh` only the first
/// occurrence of each (identifier, target) pair is kept.
#[must_use]
pub fn merge_jobs(prior: Vec<Job>, fresh: Vec<Job>) -> Vec<Job> {
    let mut seen: HashSet<Job> = prior.iter().cloned().collect();
    let mut merged = prior;
    for job in fresh {
        if seen.insert(job.clone()) {
            merged.push(job);
        }
    }
    merged
}

/// Writes `jobs` as an `identifier,target` CSV with a UTF-8 BOM.
///
/// The list goes to a `.part` sibling first and is renamed into place, so
/// `path` never holds a half-written list.
///
/// # Errors
///
/// Returns [`CrawlError::Write`] if the file cannot be written.
#[instrument(skip_all, fields(path = %path.display(), jobs = jobs.len()))]
pub fn write_jobs(path: &Path, columns: &InputColumns, jobs: &[Job]) -> Result<(), CrawlError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(UTF8_BOM.to_vec());
    writer
        .write_record([&columns.identifier_column, &columns.target_column])
        .map_err(|e| CrawlError::write(path, e.into()))?;
    for job in jobs {
        writer
            .write_record([&job.identifier, &job.target])
            .map_err(|e| CrawlError::write(path, e.into()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| CrawlError::write(path, std::io::Error::other(e.to_string())))?;

    let partial = partial_path(path);
    std::fs::write(&partial, &bytes).map_err(|e| CrawlError::write(&partial, e))?;
    if let Err(e) = std::fs::rename(&partial, path) {
        let _ = std::fs::remove_file(&partial);
        return Err(CrawlError::write(path, e));
    }
    debug!("wrote job list");
    Ok(())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}
