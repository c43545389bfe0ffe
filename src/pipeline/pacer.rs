//! Inter-job pacing.
//!
//! Workers call [`Pacer::pause`] after every job they navigate for, success
//! or recorded failure. The pacer is the only place the request rate is
//! decided, so a fixed delay can be swapped for an adaptive one without
//! touching the worker loop.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use harvester_core::pipeline::{FixedInterval, Pacer};
//!
//! # async fn example() {
//! let pacer = FixedInterval::new(Duration::from_millis(10));
//! pacer.pause().await;
//!
//! let off = FixedInterval::disabled();
//! assert!(off.is_disabled());
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument, trace};

/// Default delay between jobs on one worker, in milliseconds.
pub const DEFAULT_DELAY_MS: u64 = 1000;

/// Maximum configurable delay, in milliseconds.
pub const MAX_DELAY_MS: u64 = 60_000;

/// Decides how long a worker waits before claiming its next job.
#[async_trait]
pub trait Pacer: Send + Sync + std::fmt::Debug {
    /// Suspends the calling worker until it may proceed.
    async fn pause(&self);
}

/// Waits the same interval after every job.
///
/// Each worker waits independently; other workers keep running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedInterval {
    interval: Duration,
}

impl FixedInterval {
    /// Creates a pacer waiting `interval` after each job.
    #[must_use]
    #[instrument(skip_all, fields(delay_ms = interval.as_millis()))]
    pub fn new(interval: Duration) -> Self {
        debug!("creating fixed-interval pacer");
        Self { interval }
    }

    /// Creates a pacer that never waits (`--delay-ms 0`).
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            interval: Duration::ZERO,
        }
    }

    /// Builds a pacer from a millisecond count, `0` meaning disabled.
    #[must_use]
    pub fn from_millis(delay_ms: u64) -> Self {
        if delay_ms == 0 {
            Self::disabled()
        } else {
            Self::new(Duration::from_millis(delay_ms))
        }
    }

    /// Returns whether pacing is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.interval.is_zero()
    }

    /// Returns the configured interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for FixedInterval {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_DELAY_MS))
    }
}

#[async_trait]
impl Pacer for FixedInterval {
    async fn pause(&self) {
        if self.is_disabled() {
            return;
        }
        trace!(delay_ms = self.interval.as_millis(), "pacing before next job");
        tokio::time::sleep(self.interval).await;
    }
}
