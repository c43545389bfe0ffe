//! Category-priority resolver (legacy/alternate strategy).
//!
//! Older listing pages label each link with its document category instead of
//! a date. This strategy walks a fixed category order and takes the first
//! category that has a candidate. The download step reuses it to pick one
//! slot per record.

use super::{RawCandidate, Resolver, SlotValue};

/// Picks by a fixed priority order over named categories.
///
/// A candidate belongs to a category when its trimmed label equals the
/// category name. Within one category the first-encountered candidate wins.
/// Candidates outside every category are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPriority {
    categories: Vec<String>,
}

impl CategoryPriority {
    /// Creates a resolver; `categories` is highest priority first.
    #[must_use]
    pub fn new(categories: Vec<String>) -> Self {
        Self { categories }
    }

    /// Returns the configured priority order.
    #[must_use]
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Returns the best candidate by category priority, if any.
    #[must_use]
    pub fn select<'a>(&self, candidates: &'a [RawCandidate]) -> Option<&'a RawCandidate> {
        self.categories.iter().find_map(|category| {
            candidates
                .iter()
                .find(|candidate| candidate.label.trim() == category)
        })
    }
}

impl Resolver for CategoryPriority {
    fn name(&self) -> &'static str {
        "category-priority"
    }

    fn resolve(&self, candidates: &[RawCandidate]) -> SlotValue {
        self.select(candidates)
            .map_or(SlotValue::Missing, |candidate| {
                SlotValue::found(candidate.reference.clone())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drafts() -> CategoryPriority {
        CategoryPriority::new(vec![
            "registration".to_string(),
            "meeting".to_string(),
            "filing".to_string(),
        ])
    }

    #[test]
    fn test_highest_priority_category_wins_over_order() {
        let candidates = [
            RawCandidate::new(0, "filing", "f.pdf"),
            RawCandidate::new(1, "meeting", "m.pdf"),
            RawCandidate::new(2, "registration", "r.pdf"),
        ];
        assert_eq!(drafts().resolve(&candidates), SlotValue::found("r.pdf"));
    }

    #[test]
    fn test_falls_through_to_lower_priority() {
        let candidates = [
            RawCandidate::new(0, "filing", "f.pdf"),
            RawCandidate::new(1, "meeting", "m.pdf"),
        ];
        assert_eq!(drafts().resolve(&candidates), SlotValue::found("m.pdf"));
    }

    #[test]
    fn test_unknown_labels_and_empty_input_are_missing() {
        assert_eq!(drafts().resolve(&[]), SlotValue::Missing);
        let candidates = [RawCandidate::new(0, "2023-01-01", "x.pdf")];
        assert_eq!(drafts().resolve(&candidates), SlotValue::Missing);
    }

    #[test]
    fn test_first_candidate_within_category_wins() {
        let candidates = [
            RawCandidate::new(0, " meeting ", "first.pdf"),
            RawCandidate::new(0, "meeting", "second.pdf"),
        ];
        assert_eq!(drafts().resolve(&candidates), SlotValue::found("first.pdf"));
    }
}
