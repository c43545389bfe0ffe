//! Extraction pipeline: task source to worker pool to result sink.
//!
//! [`Pipeline`] wires the pieces together for one run:
//!
//! 1. Builds the [`CompletionIndex`](crate::sink::CompletionIndex) from the
//!    sink so already-persisted identifiers are skipped
//! 2. Loads the jobs into a [`JobQueue`]
//! 3. Runs the [`WorkerPool`] until the queue is drained
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use harvester_core::pipeline::{FixedInterval, Pipeline, RunStats, WorkerPool};
//! use harvester_core::queue::Job;
//! use harvester_core::resolver::LatestDate;
//! use harvester_core::session::{HttpSessionFactory, PageProfile};
//! use harvester_core::sink::{OutputSchema, ResultSink};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = WorkerPool::new(4, Arc::new(LatestDate), Arc::new(FixedInterval::default()))?;
//! let factory = Arc::new(HttpSessionFactory::new(&PageProfile::default())?);
//! let pipeline = Pipeline::new(pool, factory);
//!
//! let sink = Arc::new(ResultSink::open(Path::new("out.csv"), OutputSchema::default())?);
//! let jobs = vec![Job::new("Acme", "https://example.com/a")];
//! let summary = pipeline.run(jobs, sink, Arc::new(RunStats::new())).await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

mod error;
mod pacer;
mod pool;
mod stats;

pub use error::{DEFAULT_WORKERS, MAX_WORKERS, MIN_WORKERS, PipelineError};
pub use pacer::{DEFAULT_DELAY_MS, FixedInterval, MAX_DELAY_MS, Pacer};
pub use pool::WorkerPool;
pub use stats::{RunStats, RunSummary, WorkerState};

use std::sync::Arc;

use tracing::{info, instrument};

use crate::queue::{Job, JobQueue};
use crate::session::SessionFactory;
use crate::sink::ResultSink;

/// One configured extraction pipeline.
pub struct Pipeline {
    pool: WorkerPool,
    factory: Arc<dyn SessionFactory>,
}

impl Pipeline {
    /// Creates a pipeline running `pool` with sessions from `factory`.
    #[must_use]
    pub fn new(pool: WorkerPool, factory: Arc<dyn SessionFactory>) -> Self {
        Self { pool, factory }
    }

    /// Returns the worker pool.
    #[must_use]
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Runs `jobs` to completion against `sink`.
    ///
    /// Jobs whose identifier the sink already holds are skipped, so rerunning
    /// the same input only processes what is left.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Sink`] if the sink cannot be written and [`PipelineError::NoSessions`] if no worker could start.
    #[instrument(skip_all, fields(store = %sink.path().display()))]
    pub async fn run(
        &self,
        jobs: Vec<Job>,
        sink: Arc<ResultSink>,
        stats: Arc<RunStats>,
    ) -> Result<RunSummary, PipelineError> {
        let index = sink.completion_index();
        let queue = Arc::new(JobQueue::new(jobs));

        info!(
            jobs = queue.total(),
            already_completed = index.len(),
            workers = self.pool.workers(),
            "starting extraction run"
        );

        let summary = self
            .pool
            .run(queue, Arc::clone(&self.factory), sink, index, stats)
            .await?;

        info!(
            resolved = summary.resolved,
            missing = summary.missing,
            failed = summary.failed,
            skipped = summary.skipped,
            "extraction run complete"
        );
        Ok(summary)
    }
}
