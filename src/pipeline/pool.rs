//! Fixed-size worker pool.
//!
//! # Concurrency model
//!
//! - Each worker runs in its own Tokio task and owns exactly one session for
//!   its whole lifetime
//! - Workers claim jobs from the shared [`JobQueue`]; a claim hands each job
//!   to exactly one worker
//! - Records go through the shared [`ResultSink`], which serializes appends
//! - A failed job only costs its own worker that job; the pool keeps going
//!
//! # Shutdown
//!
//! Workers exit when the queue is empty. A sink failure raises a halt flag:
//! workers finish the job they hold, stop claiming, and the run returns the
//! sink error. Sessions are closed on every exit path.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{Instrument, debug, error, info, info_span, instrument, trace, warn};

use super::error::{MAX_WORKERS, MIN_WORKERS, PipelineError};
use super::pacer::Pacer;
use super::stats::{RunStats, RunSummary, WorkerState};
use crate::queue::{Job, JobQueue};
use crate::resolver::Resolver;
use crate::session::{SessionFactory, SessionGuard};
use crate::sink::{CompletionIndex, ResolvedRecord, ResultSink, SinkError};

/// Runs jobs through N concurrent workers.
#[derive(Debug)]
pub struct WorkerPool {
    workers: usize,
    resolver: Arc<dyn Resolver>,
    pacer: Arc<dyn Pacer>,
}

/// Everything a worker shares with its siblings.
#[derive(Clone)]
struct WorkerContext {
    queue: Arc<JobQueue>,
    factory: Arc<dyn SessionFactory>,
    sink: Arc<ResultSink>,
    index: Arc<CompletionIndex>,
    stats: Arc<RunStats>,
    resolver: Arc<dyn Resolver>,
    pacer: Arc<dyn Pacer>,
    halt: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Creates a pool of `workers` workers.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidPoolSize`] if `workers` is outside
    /// 1..=32.
    #[instrument(level = "debug", skip(resolver, pacer))]
    pub fn new(
        workers: usize,
        resolver: Arc<dyn Resolver>,
        pacer: Arc<dyn Pacer>,
    ) -> Result<Self, PipelineError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&workers) {
            return Err(PipelineError::InvalidPoolSize { value: workers });
        }

        debug!(
            workers,
            resolver = resolver.name(),
            ?pacer,
            "creating worker pool"
        );

        Ok(Self {
            workers,
            resolver,
            pacer,
        })
    }

    /// Returns the configured worker count.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Drains `queue`, persisting one record per processed job.
    ///
    /// Jobs whose identifier is already in `index` are skipped without
    /// navigation. `stats` is updated live so callers can display progress.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Sink`] if a record could not be persisted
    /// - [`PipelineError::NoSessions`] if every worker failed to open a
    ///   session while jobs remained
    ///
    /// Individual extraction failures do NOT make this method fail; they are
    /// recorded as all-missing rows and counted in the summary.
    #[instrument(skip_all, fields(workers = self.workers, jobs = queue.total(), backend = factory.name()))]
    pub async fn run(
        &self,
        queue: Arc<JobQueue>,
        factory: Arc<dyn SessionFactory>,
        sink: Arc<ResultSink>,
        index: Arc<CompletionIndex>,
        stats: Arc<RunStats>,
    ) -> Result<RunSummary, PipelineError> {
        info!(resolver = self.resolver.name(), "starting worker pool");

        let context = WorkerContext {
            queue: Arc::clone(&queue),
            factory,
            sink,
            index,
            stats: Arc::clone(&stats),
            resolver: Arc::clone(&self.resolver),
            pacer: Arc::clone(&self.pacer),
            halt: Arc::new(AtomicBool::new(false)),
        };

        let handles: Vec<_> = (0..self.workers)
            .map(|worker| {
                let context = context.clone();
                tokio::spawn(run_worker(context).instrument(info_span!("worker", worker)))
            })
            .collect();

        let mut first_error: Option<SinkError> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => warn!(error = %e, "worker task panicked"),
            }
        }

        if let Some(e) = first_error {
            return Err(PipelineError::Sink(e));
        }

        let remaining = queue.remaining().await;
        if remaining > 0 {
            error!(
                remaining,
                session_failures = stats.session_failures(),
                "all workers exited with jobs left"
            );
            return Err(PipelineError::NoSessions { remaining });
        }

        let summary = stats.snapshot();
        info!(
            resolved = summary.resolved,
            missing = summary.missing,
            failed = summary.failed,
            skipped = summary.skipped,
            "worker pool drained"
        );
        Ok(summary)
    }
}

/// One worker: open a session, process jobs until the queue is empty, close.
async fn run_worker(context: WorkerContext) -> Result<(), SinkError> {
    let mut session = match SessionGuard::open(context.factory.as_ref()).await {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "failed to open session; worker exiting");
            context.stats.increment_session_failures();
            return Ok(());
        }
    };

    let result = process_jobs(&context, &mut session).await;

    if let Err(e) = session.close().await {
        warn!(error = %e, "session did not close cleanly");
    }
    debug!("worker finished");
    result
}

async fn process_jobs(
    context: &WorkerContext,
    session: &mut SessionGuard,
) -> Result<(), SinkError> {
    let mut state = WorkerState::Idle;

    loop {
        if context.halt.load(Ordering::SeqCst) {
            debug!("halt requested; not claiming further jobs");
            return Ok(());
        }
        let Some(job) = context.queue.claim().await else {
            return Ok(());
        };
        transition(&mut state, WorkerState::Claimed);

        if context.index.contains_identifier(&job.identifier) {
            debug!(identifier = %job.identifier, "already in result store; skipping");
            context.stats.increment_skipped();
            transition(&mut state, WorkerState::Idle);
            continue;
        }

        let session_lost = process_job(context, session, &job, &mut state).await?;
        transition(&mut state, WorkerState::Idle);

        if session_lost {
            warn!("session is no longer usable; worker exiting");
            return Ok(());
        }
        context.pacer.pause().await;
    }
}

/// Extracts, resolves and persists one job.
///
/// Returns `true` when the session can no longer serve jobs.
async fn process_job(
    context: &WorkerContext,
    session: &mut SessionGuard,
    job: &Job,
    state: &mut WorkerState,
) -> Result<bool, SinkError> {
    transition(state, WorkerState::Extracting);
    let (record, failure) = match session.extract(&job.target).await {
        Ok(candidates) => {
            transition(state, WorkerState::Resolving);
            let slots = context.resolver.resolve_slots(&candidates);
            (ResolvedRecord::new(job, slots), None)
        }
        Err(e) => {
            transition(state, WorkerState::Failed);
            warn!(
                identifier = %job.identifier,
                target = %job.target,
                error = %e,
                "extraction failed; recording all slots missing"
            );
            (ResolvedRecord::all_missing(job), Some(e))
        }
    };

    transition(state, WorkerState::Persisting);
    if let Err(e) = context.sink.append(&record).await {
        context.halt.store(true, Ordering::SeqCst);
        error!(identifier = %job.identifier, error = %e, "failed to persist record; halting run");
        return Err(e);
    }

    match &failure {
        Some(_) => context.stats.increment_failed(),
        None if record.is_all_missing() => {
            info!(identifier = %job.identifier, "saved; no slot resolved");
            context.stats.increment_missing();
        }
        None => {
            let found = record.slots.iter().filter(|slot| !slot.is_missing()).count();
            info!(identifier = %job.identifier, found, "saved");
            context.stats.increment_resolved();
        }
    }

    Ok(failure.is_some_and(|e| e.is_fatal_for_worker()))
}

fn transition(state: &mut WorkerState, next: WorkerState) {
    trace!(from = %state, to = %next, "worker state");
    *state = next;
}
