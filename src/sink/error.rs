//! Error types for the result sink.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by [`ResultSink`](super::ResultSink).
///
/// Every variant is fatal for a run: once persistence cannot be guaranteed
/// the pipeline stops instead of losing completed work.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The store could not be opened or read.
    #[error("failed to access result store {path}: {source}")]
    Io {
        /// Store path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Another process holds the store's write lock.
    #[error(
        "result store {path} is locked by another process\n  Suggestion: Wait for the other run to finish or choose a different output"
    )]
    Locked {
        /// Store path.
        path: PathBuf,
    },

    /// An existing store has an incompatible schema or unreadable rows.
    #[error("result store {path} is incompatible: {reason}")]
    Corrupt {
        /// Store path.
        path: PathBuf,
        /// What is wrong.
        reason: String,
    },

    /// A record could not be durably written.
    #[error("failed to write record to {path}: {source}")]
    Write {
        /// Store path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl SinkError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a corrupt-store error.
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a write error.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}
