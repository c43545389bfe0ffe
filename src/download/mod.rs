//! Secondary batch step: fetch one document per resolved record.
//!
//! For every record in a result store the [`Downloader`]:
//!
//! 1. Picks one slot by a fixed priority over slot labels (registration
//!    draft, then meeting draft, then filing draft by default)
//! 2. Turns the stored reference into an absolute URL
//! 3. Streams it to `<output-dir>/<identifier>-<slot label>.pdf`
//!
//! Records with every slot missing and documents already on disk are
//! skipped. A failed fetch is logged and counted; the batch carries on.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use harvester_core::download::{DownloadConfig, Downloader};
//! use harvester_core::pipeline::FixedInterval;
//! use harvester_core::sink::{OutputSchema, read_records};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = OutputSchema::default();
//! let records = read_records(Path::new("results.csv"), &schema)?;
//! let downloader = Downloader::new(&DownloadConfig::default(), &schema, FixedInterval::disabled())?;
//! let summary = downloader.run(&records, Path::new("./pdfs")).await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod filename;

pub use client::{CONNECT_TIMEOUT_SECS, HttpClient, READ_TIMEOUT_SECS};
pub use error::DownloadError;
pub use filename::DOCUMENT_EXTENSION;

use std::fmt;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::pipeline::{FixedInterval, Pacer};
use crate::resolver::{CategoryPriority, RawCandidate, SLOT_COUNT};
use crate::sink::{OutputSchema, ResolvedRecord};

/// Default slot priority: registration draft, meeting draft, filing draft.
pub const DEFAULT_PRIORITY: [&str; SLOT_COUNT] = ["注册稿", "上会稿", "申报稿"];

/// Default scheme for scheme-relative (`//host/path`) references.
pub const DEFAULT_SCHEME: &str = "https";

/// Download step settings (`[download]` in the config file).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloadConfig {
    /// Slot labels, highest priority first.
    pub priority: Vec<String>,
    /// Scheme applied to scheme-relative references.
    pub default_scheme: String,
    /// Base for path-relative references; they are rejected when unset.
    pub base_url: Option<String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            priority: DEFAULT_PRIORITY.iter().map(|s| (*s).to_string()).collect(),
            default_scheme: DEFAULT_SCHEME.to_string(),
            base_url: None,
        }
    }
}

/// The document chosen for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChoice {
    /// Label of the chosen slot.
    pub label: String,
    /// Stored reference of the chosen slot.
    pub reference: String,
}

/// Counts from a download batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownloadSummary {
    /// Documents fetched this run.
    pub downloaded: usize,
    /// Records with nothing to fetch or whose document already existed.
    pub skipped: usize,
    /// Fetches that failed.
    pub failed: usize,
}

impl fmt::Display for DownloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} downloaded, {} skipped, {} failed",
            self.downloaded, self.skipped, self.failed
        )
    }
}

/// Fetches one document per record.
#[derive(Debug)]
pub struct Downloader {
    client: HttpClient,
    priority: CategoryPriority,
    slot_labels: [String; SLOT_COUNT],
    default_scheme: String,
    base_url: Option<Url>,
    pacer: FixedInterval,
}

impl Downloader {
    /// Creates a downloader for records written with `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] if `config.base_url` does not
    /// parse, [`DownloadError::Client`] if the HTTP client cannot be built.
    pub fn new(
        config: &DownloadConfig,
        schema: &OutputSchema,
        pacer: FixedInterval,
    ) -> Result<Self, DownloadError> {
        let base_url = config
            .base_url
            .as_deref()
            .map(|base| Url::parse(base).map_err(|_| DownloadError::invalid_url(base)))
            .transpose()?;

        Ok(Self {
            client: HttpClient::new()?,
            priority: CategoryPriority::new(config.priority.clone()),
            slot_labels: std::array::from_fn(|index| {
                schema.slot_label(index).unwrap_or_default().to_string()
            }),
            default_scheme: config.default_scheme.clone(),
            base_url,
            pacer,
        })
    }

    /// Picks the slot to fetch for `record`, or `None` if every candidate
    /// slot is missing.
    #[must_use]
    pub fn choose(&self, record: &ResolvedRecord) -> Option<DocumentChoice> {
        let candidates: Vec<RawCandidate> = record
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.reference()
                    .map(|reference| RawCandidate::new(index, &self.slot_labels[index], reference))
            })
            .collect();

        self.priority
            .select(&candidates)
            .map(|candidate| DocumentChoice {
                label: candidate.label.clone(),
                reference: candidate.reference.clone(),
            })
    }

    /// Turns a stored reference into an absolute URL.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] for path-relative references
    /// when no base URL is configured, or for unparseable references.
    pub fn resolve_url(&self, reference: &str) -> Result<Url, DownloadError> {
        let reference = reference.trim();
        if let Ok(url) = Url::parse(reference) {
            return Ok(url);
        }
        if reference.starts_with("//") {
            return Url::parse(&format!("{}:{reference}", self.default_scheme))
                .map_err(|_| DownloadError::invalid_url(reference));
        }
        self.base_url
            .as_ref()
            .and_then(|base| base.join(reference).ok())
            .ok_or_else(|| DownloadError::invalid_url(reference))
    }

    /// Fetches the chosen document of every record into `output_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] only if `output_dir` cannot be created.
    /// Per-file failures are logged and counted in the summary.
    #[instrument(skip_all, fields(records = records.len(), output_dir = %output_dir.display()))]
    pub async fn run(
        &self,
        records: &[ResolvedRecord],
        output_dir: &Path,
    ) -> Result<DownloadSummary, DownloadError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| DownloadError::io(output_dir, e))?;

        let mut summary = DownloadSummary::default();
        info!("starting download batch");

        for record in records {
            let Some(choice) = self.choose(record) else {
                debug!(identifier = %record.identifier, "no document to fetch; skipping");
                summary.skipped += 1;
                continue;
            };

            let target = filename::document_path(output_dir, &record.identifier, &choice.label);
            if tokio::fs::try_exists(&target).await.unwrap_or(false) {
                debug!(path = %target.display(), "already downloaded; skipping");
                summary.skipped += 1;
                continue;
            }

            match self.fetch(&choice, &target).await {
                Ok(bytes) => {
                    info!(identifier = %record.identifier, label = %choice.label, bytes, "downloaded");
                    summary.downloaded += 1;
                }
                Err(e) => {
                    warn!(identifier = %record.identifier, label = %choice.label, error = %e, "download failed");
                    summary.failed += 1;
                }
            }
            self.pacer.pause().await;
        }

        info!(
            downloaded = summary.downloaded,
            skipped = summary.skipped,
            failed = summary.failed,
            "download batch complete"
        );
        Ok(summary)
    }

    async fn fetch(&self, choice: &DocumentChoice, target: &Path) -> Result<u64, DownloadError> {
        let url = self.resolve_url(&choice.reference)?;
        self.client.download_to_path(&url, target).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::queue::Job;
    use crate::resolver::SlotValue;

    fn downloader(base_url: Option<&str>) -> Downloader {
        let config = DownloadConfig {
            base_url: base_url.map(str::to_string),
            ..DownloadConfig::default()
        };
        Downloader::new(&config, &OutputSchema::default(), FixedInterval::disabled()).unwrap()
    }

    fn record(slots: [SlotValue; SLOT_COUNT]) -> ResolvedRecord {
        ResolvedRecord::new(&Job::new("Acme", "https://listing/1"), slots)
    }

    #[test]
    fn test_choose_prefers_registration_draft() {
        let choice = downloader(None)
            .choose(&record([
                SlotValue::found("f.pdf"),
                SlotValue::found("m.pdf"),
                SlotValue::found("r.pdf"),
            ]))
            .unwrap();
        assert_eq!(choice.label, "注册稿");
        assert_eq!(choice.reference, "r.pdf");
    }

    #[test]
    fn test_choose_falls_back_to_filing_draft() {
        let choice = downloader(None)
            .choose(&record([
                SlotValue::found("f.pdf"),
                SlotValue::Missing,
                SlotValue::Missing,
            ]))
            .unwrap();
        assert_eq!(choice.label, "申报稿");
    }

    #[test]
    fn test_choose_all_missing_is_none() {
        let all_missing = ResolvedRecord::all_missing(&Job::new("A", "u"));
        assert!(downloader(None).choose(&all_missing).is_none());
    }

    #[test]
    fn test_resolve_url_scheme_relative() {
        let url = downloader(None)
            .resolve_url("//static.example.com/a.pdf")
            .unwrap();
        assert_eq!(url.as_str(), "https://static.example.com/a.pdf");
    }

    #[test]
    fn test_resolve_url_absolute_passes_through() {
        let url = downloader(None)
            .resolve_url("http://example.com/a.pdf")
            .unwrap();
        assert_eq!(url.as_str(), "http://example.com/a.pdf");
    }

    #[test]
    fn test_resolve_url_relative_needs_base() {
        assert!(matches!(
            downloader(None).resolve_url("files/a.pdf"),
            Err(DownloadError::InvalidUrl { .. })
        ));
        let url = downloader(Some("https://example.com/root/"))
            .resolve_url("files/a.pdf")
            .unwrap();
        assert_eq!(url.as_str(), "https://example.com/root/files/a.pdf");
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let config = DownloadConfig {
            base_url: Some("not a url".to_string()),
            ..DownloadConfig::default()
        };
        let result = Downloader::new(&config, &OutputSchema::default(), FixedInterval::disabled());
        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }
}
