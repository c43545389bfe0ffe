//! Candidate resolution: choosing one reference per slot.
//!
//! Extraction yields zero or more [`RawCandidate`]s for every slot on a page.
//! A [`Resolver`] collapses each slot's candidates into a single [`SlotValue`],
//! either the chosen reference or [`SlotValue::Missing`].
//!
//! Resolvers are pure: no I/O, no clock, no shared state. That keeps the
//! tie-break rules testable without a rendering engine.
//!
//! # Strategies
//!
//! - [`LatestDate`] - default; picks the candidate with the most recent
//!   `YYYY-MM-DD` label, first-encountered wins on ties
//! - [`CategoryPriority`] - legacy/alternate; picks by a fixed priority order
//!   over named categories (e.g. registration draft > meeting draft > filing draft)
//!
//! # Example
//!
//! ```
//! use harvester_core::resolver::{LatestDate, RawCandidate, Resolver, SlotValue};
//!
//! let candidates = vec![
//!     RawCandidate::new(2, "2023-01-01", "x"),
//!     RawCandidate::new(2, "2023-06-01", "y"),
//! ];
//! assert_eq!(LatestDate.resolve(&candidates), SlotValue::found("y"));
//! assert_eq!(LatestDate.resolve(&[]), SlotValue::Missing);
//! ```

mod category;
mod latest_date;

pub use category::CategoryPriority;
pub use latest_date::{DATE_LABEL_FORMAT, LatestDate};

use std::fmt;

use serde::Deserialize;

/// Number of logical document-stage slots on every listing page.
pub const SLOT_COUNT: usize = 3;

/// A single dated link found in a slot during extraction.
///
/// Candidates are ephemeral: they are produced fresh for every job execution
/// and never persisted. Only their resolution is written to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCandidate {
    /// Logical slot index (`0..SLOT_COUNT`).
    pub slot: usize,
    /// Visible label text of the link (a date on current listing pages).
    pub label: String,
    /// Resolved href of the link.
    pub reference: String,
}

impl RawCandidate {
    /// Creates a candidate for the given slot.
    pub fn new(slot: usize, label: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            slot,
            label: label.into(),
            reference: reference.into(),
        }
    }
}

/// Outcome of resolving one slot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SlotValue {
    /// A reference was chosen.
    Found(String),
    /// No usable candidate existed. Persisted as the configured sentinel.
    #[default]
    Missing,
}

impl SlotValue {
    /// Creates a `Found` value.
    pub fn found(reference: impl Into<String>) -> Self {
        Self::Found(reference.into())
    }

    /// Returns `true` for [`SlotValue::Missing`].
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Returns the chosen reference, if any.
    #[must_use]
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::Found(reference) => Some(reference),
            Self::Missing => None,
        }
    }

    /// Renders the value for storage, using `sentinel` for `Missing`.
    #[must_use]
    pub fn to_field<'a>(&'a self, sentinel: &'a str) -> &'a str {
        self.reference().unwrap_or(sentinel)
    }

    /// Parses a stored field. A field equal to `sentinel` is `Missing`.
    #[must_use]
    pub fn from_field(field: &str, sentinel: &str) -> Self {
        if field == sentinel {
            Self::Missing
        } else {
            Self::Found(field.to_string())
        }
    }
}

/// Per-slot candidate sets for one page, indexed by slot.
pub type SlotCandidates = [Vec<RawCandidate>; SLOT_COUNT];

/// Strategy for collapsing a slot's candidates into one value.
///
/// Implementations must be deterministic: the same candidates in the same
/// order always resolve to the same value.
pub trait Resolver: Send + Sync + fmt::Debug {
    /// Returns the strategy name for logging.
    fn name(&self) -> &'static str;

    /// Chooses at most one reference from `candidates`.
    fn resolve(&self, candidates: &[RawCandidate]) -> SlotValue;

    /// Resolves every slot of a page.
    fn resolve_slots(&self, slots: &SlotCandidates) -> [SlotValue; SLOT_COUNT] {
        std::array::from_fn(|index| self.resolve(&slots[index]))
    }
}

/// Named resolver strategies selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolverStrategy {
    /// [`LatestDate`].
    #[default]
    LatestDate,
    /// [`CategoryPriority`].
    CategoryPriority,
}

impl ResolverStrategy {
    /// Builds the resolver for this strategy.
    ///
    /// `categories` is only consulted by [`ResolverStrategy::CategoryPriority`].
    #[must_use]
    pub fn build(self, categories: &[String]) -> Box<dyn Resolver> {
        match self {
            Self::LatestDate => Box::new(LatestDate),
            Self::CategoryPriority => Box::new(CategoryPriority::new(categories.to_vec())),
        }
    }
}

impl fmt::Display for ResolverStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::LatestDate => "latest-date",
            Self::CategoryPriority => "category-priority",
        };
        write!(f, "{label}")
    }
}
