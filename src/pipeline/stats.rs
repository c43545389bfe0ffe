//! Run counters and per-worker state.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Lifecycle of one worker while it processes a job.
///
/// `Idle -> Claimed -> Extracting -> Resolving -> Persisting -> Idle`, or
/// `-> Failed -> Persisting` when extraction fails and an all-missing record
/// is written instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    /// Waiting to claim a job.
    #[default]
    Idle,
    /// Holds a job, not yet navigating.
    Claimed,
    /// Navigating and waiting for the marker.
    Extracting,
    /// Choosing one reference per slot.
    Resolving,
    /// Appending the record.
    Persisting,
    /// Extraction failed for the current job.
    Failed,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Claimed => "claimed",
            Self::Extracting => "extracting",
            Self::Resolving => "resolving",
            Self::Persisting => "persisting",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Live counters shared by all workers of a run.
///
/// Uses atomic counters so workers update it without locking and a progress
/// display can read it while the run is in flight.
#[derive(Debug, Default)]
pub struct RunStats {
    resolved: AtomicUsize,
    missing: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    session_failures: AtomicUsize,
}

impl RunStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs persisted with at least one found slot.
    #[must_use]
    pub fn resolved(&self) -> usize {
        self.resolved.load(Ordering::SeqCst)
    }

    /// Jobs extracted successfully but with every slot missing.
    #[must_use]
    pub fn missing(&self) -> usize {
        self.missing.load(Ordering::SeqCst)
    }

    /// Jobs whose extraction failed (persisted as all-missing).
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Jobs skipped because the sink already had them.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Workers that could not open a session.
    #[must_use]
    pub fn session_failures(&self) -> usize {
        self.session_failures.load(Ordering::SeqCst)
    }

    /// Jobs handled so far, skipped ones included.
    #[must_use]
    pub fn done(&self) -> usize {
        self.resolved() + self.missing() + self.failed() + self.skipped()
    }

    pub(crate) fn increment_resolved(&self) {
        self.resolved.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_missing(&self) {
        self.missing.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_session_failures(&self) {
        self.session_failures.fetch_add(1, Ordering::SeqCst);
    }

    /// Takes a point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> RunSummary {
        RunSummary {
            resolved: self.resolved(),
            missing: self.missing(),
            failed: self.failed(),
            skipped: self.skipped(),
        }
    }
}

/// Final counts of an extraction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Jobs persisted with at least one found slot.
    pub resolved: usize,
    /// Jobs persisted with every slot missing after a clean extraction.
    pub missing: usize,
    /// Jobs persisted as all-missing because extraction failed.
    pub failed: usize,
    /// Jobs skipped as already completed.
    pub skipped: usize,
}

impl RunSummary {
    /// Jobs whose extraction succeeded and whose record was persisted.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.resolved + self.missing
    }

    /// Jobs that produced a new record this run.
    #[must_use]
    pub fn persisted(&self) -> usize {
        self.completed() + self.failed
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} resolved, {} missing, {} failed, {} skipped",
            self.resolved, self.missing, self.failed, self.skipped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_increments() {
        let stats = RunStats::new();
        stats.increment_resolved();
        stats.increment_resolved();
        stats.increment_missing();
        stats.increment_failed();
        stats.increment_skipped();

        let summary = stats.snapshot();
        assert_eq!(summary.resolved, 2);
        assert_eq!(summary.completed(), 3);
        assert_eq!(summary.persisted(), 4);
        assert_eq!(stats.done(), 5);
    }

    #[test]
    fn test_summary_display() {
        let summary = RunSummary {
            resolved: 3,
            missing: 1,
            failed: 0,
            skipped: 2,
        };
        assert_eq!(
            summary.to_string(),
            "3 resolved, 1 missing, 0 failed, 2 skipped"
        );
    }

    #[test]
    fn test_worker_state_display() {
        assert_eq!(WorkerState::default().to_string(), "idle");
        assert_eq!(WorkerState::Persisting.to_string(), "persisting");
    }
}
