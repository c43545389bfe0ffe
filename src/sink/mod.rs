//! Result sink: append-only, crash-resilient CSV store of resolved records.
//!
//! # Durability
//!
//! - Each [`ResultSink::append`] serializes the row into one buffer, writes
//!   it under a mutex with a single `write_all`, then `sync_data`s before
//!   returning. A record whose append returned survives a crash.
//! - A crash in the middle of an append can leave a partial last record. On
//!   [`ResultSink::open`] everything after the last complete record is
//!   truncated away, and readers ignore it, so torn rows are never visible.
//!   A record is complete at the first newline outside a quoted field, so a
//!   torn quoted value spanning lines is discarded as a whole.
//! - An exclusive advisory lock (`fs2`) is held while the sink is open, so
//!   two processes never append to the same store.
//!
//! # Resume
//!
//! [`ResultSink::open`] parses the store once, through the locked handle, and
//! keeps the set of jobs already recorded; [`ResultSink::completion_index`]
//! hands it out.
//!
//! # Example
//!
//! ```no_run
//! use harvester_core::queue::Job;
//! use harvester_core::sink::{OutputSchema, ResolvedRecord, ResultSink};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sink = ResultSink::open(Path::new("results.csv"), OutputSchema::default())?;
//! let index = sink.completion_index();
//! let job = Job::new("Acme", "https://example.com/a");
//! if !index.contains(&job) {
//!     sink.append(&ResolvedRecord::all_missing(&job)).await?;
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod record;

pub use error::SinkError;
pub use record::{COLUMN_COUNT, DEFAULT_HEADER, DEFAULT_MISSING_SENTINEL, OutputSchema, ResolvedRecord};

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use fs2::FileExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::queue::Job;

/// UTF-8 byte-order mark written at the start of new stores.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Set of jobs already present in the sink.
///
/// Built once at startup and read-only for the rest of the run.
#[derive(Debug, Clone, Default)]
pub struct CompletionIndex {
    jobs: HashSet<(String, String)>,
    identifiers: HashSet<String>,
}

impl CompletionIndex {
    /// Builds an index from stored records.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ResolvedRecord>) -> Self {
        let mut index = Self::default();
        for record in records {
            index.identifiers.insert(record.identifier.clone());
            index
                .jobs
                .insert((record.identifier.clone(), record.target.clone()));
        }
        index
    }

    /// Returns `true` if a record for this exact job exists.
    #[must_use]
    pub fn contains(&self, job: &Job) -> bool {
        self.jobs
            .contains(&(job.identifier.clone(), job.target.clone()))
    }

    /// Returns `true` if any record carries `identifier`.
    #[must_use]
    pub fn contains_identifier(&self, identifier: &str) -> bool {
        self.identifiers.contains(identifier)
    }

    /// Returns the number of distinct jobs recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns `true` if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Append-only durable store of resolved records.
///
/// Wrap in `Arc` to share across workers; appends are internally serialized.
#[derive(Debug)]
pub struct ResultSink {
    path: PathBuf,
    schema: OutputSchema,
    file: Mutex<File>,
    index: Arc<CompletionIndex>,
    appended: AtomicUsize,
}

impl ResultSink {
    /// Opens the store at `path`, creating it with a header if absent.
    ///
    /// An existing store is opened for append with every prior record kept.
    /// A torn trailing row left by a crash is truncated. The remaining records
    /// are parsed into the completion index from the bytes read here, so the
    /// store is never reopened while locked.
    ///
    /// # Errors
    ///
    /// - [`SinkError::Locked`] if another process has the store open
    /// - [`SinkError::Corrupt`] if the existing header does not match `schema`
    ///   or a stored row is malformed
    /// - [`SinkError::Io`] on filesystem failures
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path, schema: OutputSchema) -> Result<Self, SinkError> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .map_err(|e| SinkError::io(path, e))?;

        file.try_lock_exclusive().map_err(|e| {
            if e.kind() == fs2::lock_contended_error().kind() {
                SinkError::Locked {
                    path: path.to_path_buf(),
                }
            } else {
                SinkError::io(path, e)
            }
        })?;

        let mut existing = Vec::new();
        file.read_to_end(&mut existing)
            .map_err(|e| SinkError::io(path, e))?;

        let header_line = serialize_row(&schema.header).map_err(|e| SinkError::io(path, e))?;
        let body = strip_bom(&existing);
        let complete = complete_prefix(&existing);

        if complete.len() < existing.len() {
            let (keep, discard) = if strip_bom(complete).is_empty() && header_line.starts_with(body)
            {
                // Crash while writing the header: start over.
                (0, existing.len())
            } else if strip_bom(complete).is_empty() {
                return Err(SinkError::corrupt(path, "header line is incomplete"));
            } else {
                (complete.len(), existing.len() - complete.len())
            };
            warn!(bytes = discard, "discarding torn trailing record");
            file.set_len(keep as u64)
                .map_err(|e| SinkError::io(path, e))?;
            existing.truncate(keep);
        }

        let index = if existing.is_empty() {
            let mut header = UTF8_BOM.to_vec();
            header.extend_from_slice(&header_line);
            file.write_all(&header)
                .and_then(|()| file.sync_all())
                .map_err(|e| SinkError::write(path, e))?;
            info!("created result store");
            CompletionIndex::default()
        } else {
            let records = parse_records(path, &existing, &schema)?;
            let index = CompletionIndex::from_records(&records);
            info!(
                records = records.len(),
                jobs = index.len(),
                "opened existing result store for append"
            );
            index
        };

        Ok(Self {
            path: path.to_path_buf(),
            schema,
            file: Mutex::new(File::from_std(file)),
            index: Arc::new(index),
            appended: AtomicUsize::new(0),
        })
    }

    /// Returns the store path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the store schema.
    #[must_use]
    pub fn schema(&self) -> &OutputSchema {
        &self.schema
    }

    /// Returns how many records this handle appended.
    #[must_use]
    pub fn appended(&self) -> usize {
        self.appended.load(Ordering::SeqCst)
    }

    /// Appends one record and syncs it to disk before returning.
    ///
    /// Concurrent callers are serialized; rows never interleave.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Write`] if the row cannot be written or synced.
    #[instrument(level = "debug", skip(self, record), fields(identifier = %record.identifier))]
    pub async fn append(&self, record: &ResolvedRecord) -> Result<(), SinkError> {
        let row = serialize_row(&record.to_fields(&self.schema.missing_sentinel))
            .map_err(|e| SinkError::write(&self.path, e))?;

        let mut file = self.file.lock().await;
        file.write_all(&row)
            .await
            .map_err(|e| SinkError::write(&self.path, e))?;
        file.flush()
            .await
            .map_err(|e| SinkError::write(&self.path, e))?;
        file.sync_data()
            .await
            .map_err(|e| SinkError::write(&self.path, e))?;
        drop(file);

        self.appended.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Returns the jobs recorded before this handle was opened.
    ///
    /// Appends made through this handle are not added.
    #[must_use]
    pub fn completion_index(&self) -> Arc<CompletionIndex> {
        Arc::clone(&self.index)
    }
}

/// Reads every complete record from the store at `path` without locking it.
///
/// # Errors
///
/// Returns [`SinkError::Io`] if the file cannot be read and
/// [`SinkError::Corrupt`] if its header or rows do not match `schema`.
pub fn read_records(path: &Path, schema: &OutputSchema) -> Result<Vec<ResolvedRecord>, SinkError> {
    let bytes = std::fs::read(path).map_err(|e| SinkError::io(path, e))?;
    parse_records(path, &bytes, schema)
}

/// Returns the jobs of every record in a prior store whose slots are all missing.
///
/// This is the rerun-with-filter pass: the result is fed back into a fresh
/// run so jobs that failed or found nothing get another attempt.
///
/// # Errors
///
/// See [`read_records`].
pub fn missing_jobs(path: &Path, schema: &OutputSchema) -> Result<Vec<Job>, SinkError> {
    let jobs: Vec<Job> = read_records(path, schema)?
        .iter()
        .filter(|record| record.is_all_missing())
        .map(ResolvedRecord::job)
        .collect();
    debug!(path = %path.display(), jobs = jobs.len(), "collected all-missing records");
    Ok(jobs)
}

fn parse_records(
    path: &Path,
    bytes: &[u8],
    schema: &OutputSchema,
) -> Result<Vec<ResolvedRecord>, SinkError> {
    let complete = complete_prefix(bytes);
    if strip_bom(complete).is_empty() {
        return Ok(Vec::new());
    }
    check_header(path, complete, schema)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(strip_bom(complete));

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result.map_err(|e| SinkError::corrupt(path, e.to_string()))?;
        let fields: [&str; COLUMN_COUNT] = row
            .iter()
            .collect::<Vec<_>>()
            .try_into()
            .map_err(|fields: Vec<&str>| {
                let line = row.position().map_or(0, csv::Position::line);
                SinkError::corrupt(
                    path,
                    format!(
                        "line {line} has {} fields, expected {COLUMN_COUNT}",
                        fields.len()
                    ),
                )
            })?;
        records.push(ResolvedRecord::from_fields(fields, &schema.missing_sentinel));
    }
    Ok(records)
}

fn check_header(path: &Path, bytes: &[u8], schema: &OutputSchema) -> Result<(), SinkError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(strip_bom(bytes));
    let found: Vec<String> = reader
        .headers()
        .map_err(|e| SinkError::corrupt(path, e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if found != schema.header {
        return Err(SinkError::corrupt(
            path,
            format!(
                "header [{}] does not match expected [{}]",
                found.join(","),
                schema.header.join(",")
            ),
        ));
    }
    Ok(())
}

/// Serializes one row, newline-terminated, into a single buffer.
fn serialize_row<S: AsRef<[u8]>>(fields: &[S]) -> std::io::Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(fields)?;
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()))
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}

/// Returns `bytes` up to the end of the last complete record.
///
/// Newlines inside quoted fields do not end a record. An escaped quote (`""`)
/// toggles twice and leaves the state unchanged.
fn complete_prefix(bytes: &[u8]) -> &[u8] {
    let mut in_quotes = false;
    let mut end = 0;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b'\n' if !in_quotes => end = i + 1,
            _ => {}
        }
    }
    &bytes[..end]
}
