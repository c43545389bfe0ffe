//! Slot extraction from rendered page HTML.
//!
//! Both session backends end up with the page's HTML; this module turns it
//! into per-slot candidate sets. Locating works like this:
//!
//! 1. Find the marker element: matches the marker CSS selector and (when
//!    configured) contains the marker text. With nested matches the
//!    innermost one is used.
//! 2. Take the next [`SLOT_COUNT`] element siblings of the marker.
//! 3. Collect every `a[href]` under each sibling as a [`RawCandidate`]
//!    (visible text is the label, the href is resolved against the page URL).
//!
//! A missing sibling or a sibling without links yields an empty slot.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{PageProfile, SessionError};
use crate::resolver::{RawCandidate, SLOT_COUNT, SlotCandidates};

/// Compiled selectors for one page profile.
#[derive(Debug, Clone)]
pub struct MarkerLocator {
    marker: Selector,
    marker_text: Option<String>,
    link: Selector,
}

impl MarkerLocator {
    /// Compiles the profile's marker selector.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Init`] if the selector is not valid CSS.
    pub fn new(profile: &PageProfile) -> Result<Self, SessionError> {
        let marker = Selector::parse(&profile.marker_selector).map_err(|e| {
            SessionError::init(format!(
                "invalid marker selector '{}': {e}",
                profile.marker_selector
            ))
        })?;
        let link = Selector::parse("a[href]")
            .map_err(|e| SessionError::init(format!("invalid link selector: {e}")))?;

        Ok(Self {
            marker,
            marker_text: profile
                .marker_text
                .as_ref()
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty()),
            link,
        })
    }

    fn text_matches(&self, element: &ElementRef<'_>) -> bool {
        self.marker_text
            .as_deref()
            .is_none_or(|needle| element.text().collect::<String>().contains(needle))
    }

    /// Finds the marker element, preferring the innermost match.
    fn find_marker<'a>(&self, document: &'a Html) -> Option<ElementRef<'a>> {
        let matches: Vec<ElementRef<'a>> = document
            .select(&self.marker)
            .filter(|element| self.text_matches(element))
            .collect();

        matches
            .iter()
            .find(|candidate| {
                !matches.iter().any(|other| {
                    other.id() != candidate.id()
                        && other.ancestors().any(|ancestor| ancestor.id() == candidate.id())
                })
            })
            .copied()
    }

    /// Extracts per-slot candidates from `html`.
    ///
    /// Returns `None` when the marker is not (yet) present, so callers can
    /// keep waiting for the page to render.
    #[must_use]
    pub fn extract(&self, html: &str, page_url: &Url) -> Option<SlotCandidates> {
        let document = Html::parse_document(html);
        let marker = self.find_marker(&document)?;

        let mut slots: SlotCandidates = Default::default();
        let siblings = marker
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .take(SLOT_COUNT);

        for (slot, sibling) in siblings.enumerate() {
            slots[slot] = sibling
                .select(&self.link)
                .filter_map(|anchor| {
                    let href = anchor.value().attr("href")?.trim();
                    if href.is_empty() {
                        return None;
                    }
                    let reference = page_url
                        .join(href)
                        .map_or_else(|_| href.to_string(), String::from);
                    let label = anchor.text().collect::<String>().trim().to_string();
                    Some(RawCandidate::new(slot, label, reference))
                })
                .collect();
        }

        Some(slots)
    }
}

/// Returns `true` if anything in `html` matches `selector`.
pub(crate) fn has_match(html: &str, selector: &Selector) -> bool {
    Html::parse_document(html).select(selector).next().is_some()
}
