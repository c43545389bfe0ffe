//! Error types for the extraction pipeline.

use thiserror::Error;

use crate::sink::SinkError;

/// Minimum allowed worker count.
pub const MIN_WORKERS: usize = 1;

/// Maximum allowed worker count.
pub const MAX_WORKERS: usize = 32;

/// Default worker count.
pub const DEFAULT_WORKERS: usize = 4;

/// Errors that terminate an extraction run.
///
/// Per-job failures never show up here; workers turn them into recorded
/// all-missing rows.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid worker count.
    #[error("invalid worker count {value}: must be between {MIN_WORKERS} and {MAX_WORKERS}")]
    InvalidPoolSize {
        /// The rejected value.
        value: usize,
    },

    /// Every worker failed to open a session while jobs were still queued.
    #[error(
        "no extraction session could be opened; {remaining} jobs left unprocessed\n  Suggestion: Check that the rendering backend can start on this machine, then rerun to resume"
    )]
    NoSessions {
        /// Jobs still in the queue.
        remaining: usize,
    },

    /// Persistence failed; the run stopped to avoid losing completed work.
    #[error(transparent)]
    Sink(#[from] SinkError),
}
