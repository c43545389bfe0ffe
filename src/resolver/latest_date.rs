//! Latest-date resolver (default strategy).

use chrono::NaiveDate;
use tracing::trace;

use super::{RawCandidate, Resolver, SlotValue};

/// Expected format of candidate date labels.
pub const DATE_LABEL_FORMAT: &str = "%Y-%m-%d";

/// Picks the candidate whose label is the most recent calendar date.
///
/// Labels are trimmed before parsing. Candidates whose label does not parse
/// as [`DATE_LABEL_FORMAT`] are discarded. Among equal maximum dates the
/// first-encountered candidate wins. No parseable candidate resolves to
/// [`SlotValue::Missing`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestDate;

impl LatestDate {
    fn parse_label(label: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(label.trim(), DATE_LABEL_FORMAT).ok()
    }
}

impl Resolver for LatestDate {
    fn name(&self) -> &'static str {
        "latest-date"
    }

    fn resolve(&self, candidates: &[RawCandidate]) -> SlotValue {
        let mut best: Option<(NaiveDate, &RawCandidate)> = None;

        for candidate in candidates {
            let Some(date) = Self::parse_label(&candidate.label) else {
                trace!(label = %candidate.label, "discarding candidate with unparseable date");
                continue;
            };
            // Strictly greater keeps the earlier candidate on ties.
            if best.is_none_or(|(best_date, _)| date > best_date) {
                best = Some((date, candidate));
            }
        }

        best.map_or(SlotValue::Missing, |(_, candidate)| {
            SlotValue::found(candidate.reference.clone())
        })
    }
}
