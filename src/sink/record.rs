//! Resolved record and output schema.

use serde::Deserialize;

use crate::queue::Job;
use crate::resolver::{SLOT_COUNT, SlotValue};

/// Number of columns in a stored row: identifier, target and one per slot.
pub const COLUMN_COUNT: usize = 2 + SLOT_COUNT;

/// Default sentinel persisted for [`SlotValue::Missing`].
pub const DEFAULT_MISSING_SENTINEL: &str = "--";

/// Default header of the result store (listing-export column names).
pub const DEFAULT_HEADER: [&str; COLUMN_COUNT] = ["公司名称", "链接", "申报稿", "上会稿", "注册稿"];

/// Outcome of one job: exactly one reference or `Missing` per slot.
///
/// Append-only: once written to the sink a record is never changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRecord {
    /// Entity identifier from the job.
    pub identifier: String,
    /// Target locator from the job.
    pub target: String,
    /// Resolved value per slot.
    pub slots: [SlotValue; SLOT_COUNT],
}

impl ResolvedRecord {
    /// Creates a record for `job`.
    #[must_use]
    pub fn new(job: &Job, slots: [SlotValue; SLOT_COUNT]) -> Self {
        Self {
            identifier: job.identifier.clone(),
            target: job.target.clone(),
            slots,
        }
    }

    /// Creates the record written when a job fails: every slot `Missing`.
    #[must_use]
    pub fn all_missing(job: &Job) -> Self {
        Self::new(job, Default::default())
    }

    /// Returns `true` if no slot resolved.
    #[must_use]
    pub fn is_all_missing(&self) -> bool {
        self.slots.iter().all(SlotValue::is_missing)
    }

    /// Returns the job this record was produced for.
    #[must_use]
    pub fn job(&self) -> Job {
        Job::new(self.identifier.clone(), self.target.clone())
    }

    /// Renders the record as row fields.
    #[must_use]
    pub fn to_fields<'a>(&'a self, sentinel: &'a str) -> [&'a str; COLUMN_COUNT] {
        [
            self.identifier.as_str(),
            self.target.as_str(),
            self.slots[0].to_field(sentinel),
            self.slots[1].to_field(sentinel),
            self.slots[2].to_field(sentinel),
        ]
    }

    /// Builds a record from row fields.
    #[must_use]
    pub fn from_fields(fields: [&str; COLUMN_COUNT], sentinel: &str) -> Self {
        let [identifier, target, slot0, slot1, slot2] = fields;
        Self {
            identifier: identifier.to_string(),
            target: target.to_string(),
            slots: [
                SlotValue::from_field(slot0, sentinel),
                SlotValue::from_field(slot1, sentinel),
                SlotValue::from_field(slot2, sentinel),
            ],
        }
    }
}

/// Column names and sentinel of the result store.
///
/// The sentinel must stay the same across runs so a later pass can select
/// exactly the `Missing` rows for retry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSchema {
    /// Header labels: identifier, target, then one per slot.
    pub header: Vec<String>,
    /// Value persisted for a missing slot.
    pub missing_sentinel: String,
}

impl OutputSchema {
    /// Returns the label of slot `index`.
    #[must_use]
    pub fn slot_label(&self, index: usize) -> Option<&str> {
        self.header.get(2 + index).map(String::as_str)
    }

    /// Returns the index of the slot labelled `label`.
    #[must_use]
    pub fn slot_index(&self, label: &str) -> Option<usize> {
        (0..SLOT_COUNT).find(|&index| self.slot_label(index) == Some(label))
    }
}

impl Default for OutputSchema {
    fn default() -> Self {
        Self {
            header: DEFAULT_HEADER.iter().map(|h| (*h).to_string()).collect(),
            missing_sentinel: DEFAULT_MISSING_SENTINEL.to_string(),
        }
    }
}
