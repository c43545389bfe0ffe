//! Run configuration: site profile, output schema and pool settings.
//!
//! Everything has a default, so a missing config file is a valid setup for
//! the listing pages this tool was built for. A TOML file adjusts it:
//!
//! ```toml
//! [input]
//! identifier_column = "company"
//! target_column = "url"
//!
//! [page]
//! marker_selector = "td.text-nowrap"
//! marker_text = "Prospectus"
//! navigation_timeout_secs = 45
//!
//! [output]
//! header = ["company", "url", "filing", "meeting", "registration"]
//! missing_sentinel = "-"
//!
//! [resolver]
//! strategy = "latest-date"
//!
//! [pool]
//! workers = 8
//! delay_ms = 500
//!
//! [download]
//! priority = ["registration", "meeting", "filing"]
//!
//! [crawl]
//! start_url = "https://listing.example.com/ipo/index.html"
//! row_selector = "table.projects tbody tr"
//! next_selector = "a.next-page"
//! max_pages = 50
//! ```
//!
//! Lookup order: `--config <FILE>`, then
//! `$XDG_CONFIG_HOME/harvester/config.toml`, then
//! `$HOME/.config/harvester/config.toml`, then built-in defaults.

use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::crawl::{ListingProfile, MAX_PAGES_LIMIT};
use crate::download::{DEFAULT_PRIORITY, DownloadConfig};
use crate::parser::InputColumns;
use crate::pipeline::{DEFAULT_DELAY_MS, DEFAULT_WORKERS, MAX_DELAY_MS, MAX_WORKERS, MIN_WORKERS};
use crate::resolver::{Resolver, ResolverStrategy};
use crate::session::PageProfile;
use crate::sink::{COLUMN_COUNT, OutputSchema};

/// Allowed navigation timeout range, in seconds.
const NAVIGATION_TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 1..=600;

/// Allowed marker poll interval range, in milliseconds.
const POLL_INTERVAL_RANGE: std::ops::RangeInclusive<u64> = 10..=60_000;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Config path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Config path.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range or inconsistent with another.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// Dotted field name.
        field: &'static str,
        /// What is wrong.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Resolver selection (`[resolver]`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Strategy used for every slot.
    pub strategy: ResolverStrategy,
    /// Category order for `category-priority`, highest first.
    pub categories: Vec<String>,
}

impl ResolverConfig {
    /// Builds the configured resolver.
    #[must_use]
    pub fn build(&self) -> Box<dyn Resolver> {
        self.strategy.build(&self.categories)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            strategy: ResolverStrategy::default(),
            categories: DEFAULT_PRIORITY.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

/// Worker pool settings (`[pool]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Delay after each job on one worker, in milliseconds; `0` disables.
    pub delay_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            delay_ms: DEFAULT_DELAY_MS,
        }
    }
}

/// Complete run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarvestConfig {
    /// Input column names.
    pub input: InputColumns,
    /// How to find slots on a listing page.
    pub page: PageProfile,
    /// Result store header and sentinel.
    pub output: OutputSchema,
    /// Slot resolution strategy.
    pub resolver: ResolverConfig,
    /// Worker pool settings.
    pub pool: PoolConfig,
    /// Download step settings.
    pub download: DownloadConfig,
    /// Listing crawl settings.
    pub crawl: ListingProfile,
}

impl HarvestConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates the config file at `path`.
    ///
    /// # Errors
    ///
    /// See [`HarvestConfig::from_toml_str`]; [`ConfigError::Io`] if the file
    /// cannot be read.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text, path)?;
        info!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Loads `explicit` if given, else the default config file if it exists,
    /// else the built-in defaults.
    ///
    /// # Errors
    ///
    /// See [`HarvestConfig::load`].
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match resolve_default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                debug!("no config file; using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Checks ranges and cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_input()?;
        self.validate_page()?;
        self.validate_output()?;
        self.validate_resolver()?;
        self.validate_pool()?;
        self.validate_download()?;
        self.validate_crawl()
    }

    fn validate_input(&self) -> Result<(), ConfigError> {
        if self.input.identifier_column.trim().is_empty() {
            return Err(ConfigError::invalid("input.identifier_column", "must not be empty"));
        }
        if self.input.target_column.trim().is_empty() {
            return Err(ConfigError::invalid("input.target_column", "must not be empty"));
        }
        if self.input.identifier_column == self.input.target_column {
            return Err(ConfigError::invalid(
                "input.target_column",
                "must differ from input.identifier_column",
            ));
        }
        Ok(())
    }

    fn validate_page(&self) -> Result<(), ConfigError> {
        if self.page.marker_selector.trim().is_empty() {
            return Err(ConfigError::invalid("page.marker_selector", "must not be empty"));
        }
        let timeout = self.page.navigation_timeout_secs;
        if !NAVIGATION_TIMEOUT_RANGE.contains(&timeout) {
            return Err(ConfigError::invalid(
                "page.navigation_timeout_secs",
                format!("{timeout}. Expected range: 1..=600"),
            ));
        }
        let poll = self.page.poll_interval_ms;
        if !POLL_INTERVAL_RANGE.contains(&poll) {
            return Err(ConfigError::invalid(
                "page.poll_interval_ms",
                format!("{poll}. Expected range: 10..=60000"),
            ));
        }
        Ok(())
    }

    fn validate_output(&self) -> Result<(), ConfigError> {
        let header = &self.output.header;
        if header.len() != COLUMN_COUNT {
            return Err(ConfigError::invalid(
                "output.header",
                format!("expected {COLUMN_COUNT} labels, got {}", header.len()),
            ));
        }
        if header.iter().any(|label| label.trim().is_empty()) {
            return Err(ConfigError::invalid("output.header", "labels must not be empty"));
        }
        let distinct: HashSet<&str> = header.iter().map(String::as_str).collect();
        if distinct.len() != header.len() {
            return Err(ConfigError::invalid("output.header", "labels must be distinct"));
        }
        if self.output.missing_sentinel.is_empty() {
            return Err(ConfigError::invalid("output.missing_sentinel", "must not be empty"));
        }
        Ok(())
    }

    fn validate_resolver(&self) -> Result<(), ConfigError> {
        if self.resolver.strategy == ResolverStrategy::CategoryPriority
            && self.resolver.categories.is_empty()
        {
            return Err(ConfigError::invalid(
                "resolver.categories",
                "category-priority needs at least one category",
            ));
        }
        Ok(())
    }

    fn validate_pool(&self) -> Result<(), ConfigError> {
        let workers = self.pool.workers;
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&workers) {
            return Err(ConfigError::invalid(
                "pool.workers",
                format!("{workers}. Expected range: {MIN_WORKERS}..={MAX_WORKERS}"),
            ));
        }
        let delay = self.pool.delay_ms;
        if delay > MAX_DELAY_MS {
            return Err(ConfigError::invalid(
                "pool.delay_ms",
                format!("{delay}. Expected range: 0..={MAX_DELAY_MS}"),
            ));
        }
        Ok(())
    }

    fn validate_download(&self) -> Result<(), ConfigError> {
        if self.download.priority.is_empty() {
            return Err(ConfigError::invalid("download.priority", "must not be empty"));
        }
        if let Some(unknown) = self
            .download
            .priority
            .iter()
            .find(|label| self.output.slot_index(label).is_none())
        {
            return Err(ConfigError::invalid(
                "download.priority",
                format!("'{unknown}' is not one of the output slot labels"),
            ));
        }
        if self.download.default_scheme.trim().is_empty() {
            return Err(ConfigError::invalid("download.default_scheme", "must not be empty"));
        }
        Ok(())
    }

    fn validate_crawl(&self) -> Result<(), ConfigError> {
        let crawl = &self.crawl;
        if crawl.start_url.trim().is_empty() {
            return Err(ConfigError::invalid("crawl.start_url", "must not be empty"));
        }
        for (field, selector) in [
            ("crawl.row_selector", &crawl.row_selector),
            ("crawl.cell_selector", &crawl.cell_selector),
            ("crawl.next_selector", &crawl.next_selector),
        ] {
            if selector.trim().is_empty() {
                return Err(ConfigError::invalid(field, "must not be empty"));
            }
        }
        if !(1..=MAX_PAGES_LIMIT).contains(&crawl.max_pages) {
            return Err(ConfigError::invalid(
                "crawl.max_pages",
                format!("{}. Expected range: 1..={MAX_PAGES_LIMIT}", crawl.max_pages),
            ));
        }
        Ok(())
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/harvester/config.toml`
/// 2. `$HOME/.config/harvester/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("harvester")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("harvester")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}
