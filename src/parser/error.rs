//! Error types for task source loading.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading the input record set.
///
/// All of these are fatal: the pipeline aborts before any worker starts.
#[derive(Debug, Error)]
pub enum InputError {
    /// The input file could not be read.
    #[error("failed to read input {path}: {source}")]
    Io {
        /// Input path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The text is neither valid UTF-8 nor valid in the legacy fallback encoding.
    #[error(
        "input is not valid {primary} or {fallback} text\n  Suggestion: Re-save the file as UTF-8"
    )]
    Encoding {
        /// Primary encoding attempted.
        primary: &'static str,
        /// Fallback encoding attempted.
        fallback: &'static str,
    },

    /// A required column is absent or a row is unreadable.
    #[error("malformed input: {reason}\n  Suggestion: {suggestion}")]
    MalformedInput {
        /// What is wrong.
        reason: String,
        /// How to fix it.
        suggestion: String,
    },
}

impl InputError {
    /// Creates an IO error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a `MalformedInput` error for a missing header column.
    #[must_use]
    pub fn missing_column(column: &str, found: &[String]) -> Self {
        Self::MalformedInput {
            reason: format!("required column '{column}' not found (header: {})", found.join(",")),
            suggestion: "Check the input header or the configured column names".to_string(),
        }
    }

    /// Creates a `MalformedInput` error for an unreadable CSV row or header.
    #[must_use]
    pub fn bad_row(line: Option<u64>, detail: &str) -> Self {
        let location = line.map_or_else(|| "header".to_string(), |line| format!("line {line}"));
        Self::MalformedInput {
            reason: format!("unreadable record at {location}: {detail}"),
            suggestion: "Check for unbalanced quotes or missing fields".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_column_message_names_column_and_header() {
        let err = InputError::missing_column("链接", &["公司名称".to_string(), "板块".to_string()]);
        let msg = err.to_string();
        assert!(msg.contains("'链接'"));
        assert!(msg.contains("公司名称,板块"));
        assert!(msg.contains("Suggestion:"));
    }

    #[test]
    fn test_bad_row_reports_line_or_header() {
        assert!(InputError::bad_row(Some(7), "x").to_string().contains("line 7"));
        assert!(InputError::bad_row(None, "x").to_string().contains("header"));
    }

    #[test]
    fn test_encoding_message_names_both_encodings() {
        let err = InputError::Encoding {
            primary: "UTF-8",
            fallback: "GBK",
        };
        let msg = err.to_string();
        assert!(msg.contains("UTF-8"));
        assert!(msg.contains("GBK"));
    }
}
