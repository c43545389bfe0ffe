//! Error types for extraction sessions.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by [`Session`](super::Session) and
/// [`SessionFactory`](super::SessionFactory) implementations.
///
/// `Init` is fatal for the worker that hit it. Everything else is a per-job
/// error: the worker records an all-missing result and moves on.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The rendering engine could not start.
    #[error("failed to start rendering session: {reason}")]
    Init {
        /// What went wrong.
        reason: String,
    },

    /// The marker element did not appear within the navigation timeout.
    #[error("timed out after {}s waiting for page content at {target}", timeout.as_secs())]
    NavigationTimeout {
        /// Target that timed out.
        target: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// Navigation failed outright (bad locator, network or HTTP error).
    #[error("navigation to {target} failed: {reason}")]
    Navigation {
        /// Target that failed.
        target: String,
        /// What went wrong.
        reason: String,
    },

    /// The page loaded but candidates could not be read from it.
    #[error("extraction from {target} failed: {reason}")]
    Extraction {
        /// Target being extracted.
        target: String,
        /// What went wrong.
        reason: String,
    },

    /// The backend did not shut down cleanly.
    #[error("failed to release rendering session: {reason}")]
    Shutdown {
        /// What went wrong.
        reason: String,
    },

    /// The session was used after it was closed.
    #[error("session already closed")]
    Closed,
}

impl SessionError {
    /// Creates an init error.
    pub fn init(reason: impl Into<String>) -> Self {
        Self::Init {
            reason: reason.into(),
        }
    }

    /// Creates a navigation timeout error.
    pub fn timeout(target: impl Into<String>, timeout: Duration) -> Self {
        Self::NavigationTimeout {
            target: target.into(),
            timeout,
        }
    }

    /// Creates a navigation error.
    pub fn navigation(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Navigation {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Creates an extraction error.
    pub fn extraction(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Extraction {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors that end the worker rather than the job.
    #[must_use]
    pub fn is_fatal_for_worker(&self) -> bool {
        matches!(self, Self::Init { .. } | Self::Closed)
    }
}
