//! Task source: loading extraction jobs from the input record set.
//!
//! The input is tabular CSV text with (at least) an identifier column and a
//! target column. Column names come from configuration. Rows become
//! [`Job`]s in input order.
//!
//! Identifiers are NOT de-duplicated: a name listed twice (even with
//! different targets) yields two jobs. This mirrors the behavior of the
//! listing exports this tool consumes.
//!
//! # Example
//!
//! ```
//! use harvester_core::parser::{InputColumns, parse_jobs};
//!
//! let columns = InputColumns::new("name", "url");
//! let jobs = parse_jobs("name,url\nAcme,https://example.com/a\n", &columns).unwrap();
//! assert_eq!(jobs.len(), 1);
//! assert_eq!(jobs[0].identifier, "Acme");
//! ```

mod encoding;
mod error;

pub use encoding::decode_input;
pub use error::InputError;

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::queue::Job;

/// Default identifier column of listing exports.
pub const DEFAULT_IDENTIFIER_COLUMN: &str = "公司名称";

/// Default target column of listing exports.
pub const DEFAULT_TARGET_COLUMN: &str = "链接";

/// Names of the required input columns.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputColumns {
    /// Column holding the entity identifier.
    pub identifier_column: String,
    /// Column holding the target locator.
    pub target_column: String,
}

impl InputColumns {
    /// Creates a column mapping.
    pub fn new(identifier_column: impl Into<String>, target_column: impl Into<String>) -> Self {
        Self {
            identifier_column: identifier_column.into(),
            target_column: target_column.into(),
        }
    }
}

impl Default for InputColumns {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTIFIER_COLUMN, DEFAULT_TARGET_COLUMN)
    }
}

/// Loads jobs from the CSV file at `path`.
///
/// # Errors
///
/// - [`InputError::Io`] if the file cannot be read
/// - [`InputError::Encoding`] if the text is neither UTF-8 nor GBK
/// - [`InputError::MalformedInput`] if a required column is missing or a row is unreadable
#[instrument(skip(columns), fields(path = %path.display()))]
pub fn load_jobs(path: &Path, columns: &InputColumns) -> Result<Vec<Job>, InputError> {
    let bytes = std::fs::read(path).map_err(|e| InputError::io(path, e))?;
    let (text, encoding) = decode_input(&bytes)?;
    debug!(encoding = encoding.name(), "decoded input");

    let jobs = parse_jobs(&text, columns)?;
    info!(jobs = jobs.len(), encoding = encoding.name(), "loaded input");
    Ok(jobs)
}

/// Parses jobs from already-decoded CSV text.
///
/// # Errors
///
/// Returns [`InputError::MalformedInput`] if a required column is missing or
/// a row cannot be read.
pub fn parse_jobs(text: &str, columns: &InputColumns) -> Result<Vec<Job>, InputError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| InputError::bad_row(None, &e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let position = |column: &str| {
        headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| InputError::missing_column(column, &headers))
    };
    let identifier_idx = position(&columns.identifier_column)?;
    let target_idx = position(&columns.target_column)?;

    let mut jobs = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| {
            InputError::bad_row(e.position().map(csv::Position::line), &e.to_string())
        })?;
        let line = record.position().map(csv::Position::line);

        let (Some(identifier), Some(target)) = (record.get(identifier_idx), record.get(target_idx))
        else {
            return Err(InputError::bad_row(line, "row is missing required fields"));
        };
        jobs.push(Job::new(identifier, target));
    }

    Ok(jobs)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn columns() -> InputColumns {
        InputColumns::new("name", "url")
    }

    #[test]
    fn test_parse_preserves_input_order_and_ignores_extra_columns() {
        let text = "seq,name,board,url\n1,B,x,u2\n2,A,y,u1\n";
        let jobs = parse_jobs(text, &columns()).unwrap();
        assert_eq!(jobs, vec![Job::new("B", "u2"), Job::new("A", "u1")]);
    }

    #[test]
    fn test_parse_keeps_duplicate_identifiers() {
        let text = "name,url\nA,u1\nA,u2\nA,u1\n";
        let jobs = parse_jobs(text, &columns()).unwrap();
        assert_eq!(jobs.len(), 3);
        assert!(jobs.iter().all(|job| job.identifier == "A"));
    }

    #[test]
    fn test_parse_missing_column_is_malformed() {
        let result = parse_jobs("name,link\nA,u1\n", &columns());
        assert!(matches!(result, Err(InputError::MalformedInput { .. })));
    }

    #[test]
    fn test_parse_short_row_is_malformed() {
        let result = parse_jobs("name,url\nA\n", &columns());
        assert!(matches!(result, Err(InputError::MalformedInput { .. })));
    }

    #[test]
    fn test_parse_header_only_yields_no_jobs() {
        assert!(parse_jobs("name,url\n", &columns()).unwrap().is_empty());
    }

    #[test]
    fn test_parse_quoted_fields_with_commas() {
        let text = "name,url\n\"Acme, Inc.\",\"http://x/?a=1,2\"\n";
        let jobs = parse_jobs(text, &columns()).unwrap();
        assert_eq!(jobs, vec![Job::new("Acme, Inc.", "http://x/?a=1,2")]);
    }

    #[test]
    fn test_default_columns_match_listing_export() {
        let defaults = InputColumns::default();
        assert_eq!(defaults.identifier_column, "公司名称");
        assert_eq!(defaults.target_column, "链接");
    }

    #[test]
    fn test_load_jobs_reads_gbk_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("input.csv");
        let (encoded, _, _) = encoding_rs::GBK.encode("公司名称,链接\n测试公司,http://x/1\n");
        std::fs::write(&path, &encoded).unwrap();

        let jobs = load_jobs(&path, &InputColumns::default()).unwrap();
        assert_eq!(jobs, vec![Job::new("测试公司", "http://x/1")]);
    }

    #[test]
    fn test_load_jobs_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = load_jobs(&dir.path().join("absent.csv"), &columns());
        assert!(matches!(result, Err(InputError::Io { .. })));
    }
}
