//! Shared job queue for the worker pool.
//!
//! The queue is filled once from the task source before any worker starts
//! and only drains afterwards. Claiming is mutually exclusive: every job is
//! handed to exactly one worker.
//!
//! # Example
//!
//! ```
//! use harvester_core::queue::{Job, JobQueue};
//!
//! # async fn example() {
//! let queue = JobQueue::new(vec![Job::new("A", "u1"), Job::new("B", "u2")]);
//! assert_eq!(queue.claim().await, Some(Job::new("A", "u1")));
//! assert_eq!(queue.remaining().await, 1);
//! # }
//! ```

mod item;

pub use item::Job;

use std::collections::VecDeque;

use tokio::sync::Mutex;
use tracing::instrument;

/// FIFO queue of jobs with atomic claim.
///
/// Wrap in `Arc` to share across worker tasks.
#[derive(Debug, Default)]
pub struct JobQueue {
    pending: Mutex<VecDeque<Job>>,
    total: usize,
}

impl JobQueue {
    /// Creates a queue holding `jobs` in input order.
    #[must_use]
    pub fn new(jobs: impl IntoIterator<Item = Job>) -> Self {
        let pending: VecDeque<Job> = jobs.into_iter().collect();
        let total = pending.len();
        Self {
            pending: Mutex::new(pending),
            total,
        }
    }

    /// Claims the next unclaimed job, or `None` once the queue is exhausted.
    #[instrument(level = "trace", skip(self))]
    pub async fn claim(&self) -> Option<Job> {
        self.pending.lock().await.pop_front()
    }

    /// Returns the number of jobs not yet claimed.
    pub async fn remaining(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Returns the number of jobs the queue was created with.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_claim_preserves_input_order() {
        let queue = JobQueue::new(vec![
            Job::new("A", "u1"),
            Job::new("B", "u2"),
            Job::new("C", "u3"),
        ]);
        assert_eq!(queue.total(), 3);
        assert_eq!(queue.claim().await.unwrap().identifier, "A");
        assert_eq!(queue.claim().await.unwrap().identifier, "B");
        assert_eq!(queue.claim().await.unwrap().identifier, "C");
        assert_eq!(queue.claim().await, None);
        assert_eq!(queue.remaining().await, 0);
        assert_eq!(queue.total(), 3);
    }

    #[tokio::test]
    async fn test_empty_queue_claims_none() {
        let queue = JobQueue::default();
        assert_eq!(queue.claim().await, None);
        assert_eq!(queue.total(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_claims_hand_out_each_job_once() {
        let jobs: Vec<Job> = (0..200)
            .map(|i| Job::new(format!("id-{i}"), format!("u{i}")))
            .collect();
        let queue = Arc::new(JobQueue::new(jobs));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                let mut claimed = Vec::new();
                while let Some(job) = queue.claim().await {
                    claimed.push(job.identifier);
                    tokio::task::yield_now().await;
                }
                claimed
            }));
        }

        let mut seen = HashSet::new();
        let mut count = 0;
        for handle in handles {
            for identifier in handle.await.unwrap() {
                count += 1;
                assert!(seen.insert(identifier), "job claimed twice");
            }
        }
        assert_eq!(count, 200);
    }
}
