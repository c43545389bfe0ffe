//! Job type: one unit of extraction work.

use std::fmt;

/// One unit of work: an entity identifier plus the listing page to extract.
///
/// Identifiers are entity names and are not guaranteed unique; the same
/// identifier may appear with several targets. Jobs are immutable once
/// enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Job {
    /// Entity name (company name on current listings).
    pub identifier: String,
    /// Locator of the page to extract candidates from.
    pub target: String,
}

impl Job {
    /// Creates a job.
    pub fn new(identifier: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.identifier, self.target)
    }
}
