//! Error types for the listing crawl.

use std::path::PathBuf;

use thiserror::Error;

use crate::session::SessionError;

/// Errors that stop a crawl.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// A configured selector is not valid CSS.
    #[error("invalid crawl selector '{selector}': {reason}\n  Suggestion: Fix the [crawl] section of the config file")]
    InvalidSelector {
        /// The rejected selector.
        selector: String,
        /// Parser message.
        reason: String,
    },

    /// A listing page could not be rendered.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The job list could not be written.
    #[error("failed to write job list {path}: {source}")]
    Write {
        /// Output path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl CrawlError {
    /// Creates a write error.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}
