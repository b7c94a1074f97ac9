pub mod detail;
pub mod stubs;

use std::sync::LazyLock;

use regex::Regex;
use scraper::ElementRef;
use thiserror::Error;

/// Sentinel for a missing sub-field on a listing card.
pub const NOT_AVAILABLE: &str = "N/A";
/// Sentinel for a missing labeled attribute on a detail page.
pub const NOT_FOUND: &str = "Not Found";

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

#[derive(Debug, Error)]
pub enum ExtractError {
    /// The detail page has no description block: either the layout changed
    /// or the listing was removed. The sole hard failure of detail extraction.
    #[error("job description block not found in detail page")]
    DescriptionMissing,
}

/// Element text with runs of whitespace collapsed to single spaces.
pub(crate) fn clean_text(el: &ElementRef) -> String {
    let raw: String = el.text().collect();
    WHITESPACE_RE.replace_all(raw.trim(), " ").to_string()
}
