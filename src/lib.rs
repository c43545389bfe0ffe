//! Harvester Core Library
//!
//! Concurrent, resumable extraction of filing document links from listing
//! pages, plus a batch step that downloads the chosen documents.
//!
//! # Architecture
//!
//! Data flows `parser -> queue -> pipeline -> session -> resolver -> sink`:
//! - [`parser`] - Task source: loads jobs from a CSV file (UTF-8 or GBK)
//! - [`queue`] - Shared job queue with exclusive claim
//! - [`session`] - Extraction sessions: navigate, wait for the marker, collect slot candidates
//! - [`resolver`] - Pure per-slot candidate resolution (latest date, category priority)
//! - [`sink`] - Durable append-only result store with resume index
//! - [`pipeline`] - Worker pool, pacing and run driver
//! - [`download`] - Secondary step fetching one document per record
//! - [`crawl`] - Listing crawl producing the job list for extraction
//! - [`config`] - TOML configuration with defaults and validation

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod crawl;
pub mod download;
pub mod parser;
pub mod pipeline;
pub mod queue;
pub mod resolver;
pub mod session;
pub mod sink;

// Re-export commonly used types
pub use config::{ConfigError, HarvestConfig};
pub use crawl::{CrawlError, CrawlSummary, ListingCrawler, ListingProfile};
pub use download::{DownloadError, DownloadSummary, Downloader};
pub use parser::{InputColumns, InputError, load_jobs};
pub use pipeline::{FixedInterval, Pacer, Pipeline, PipelineError, RunStats, RunSummary, WorkerPool};
pub use queue::{Job, JobQueue};
pub use resolver::{
    CategoryPriority, LatestDate, RawCandidate, Resolver, ResolverStrategy, SlotValue,
};
pub use session::{
    HttpSessionFactory, Navigation, PageProfile, RenderedPage, Session, SessionError,
    SessionFactory,
};
pub use sink::{CompletionIndex, OutputSchema, ResolvedRecord, ResultSink, SinkError};
