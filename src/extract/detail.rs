use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::warn;

use super::{clean_text, ExtractError, NOT_FOUND};

static DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.show-more-less-html__markup").unwrap());
static HEADER: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h3").unwrap());
static SPAN: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span").unwrap());

const SENIORITY_LABEL: &str = "Seniority level";
const EMPLOYMENT_LABEL: &str = "Employment type";
const FUNCTION_LABEL: &str = "Job function";
const INDUSTRIES_LABEL: &str = "Industries";

/// Structured attributes pulled from one listing's detail page.
#[derive(Debug, Clone)]
pub struct DetailAttributes {
    pub description: String,
    pub seniority_level: String,
    pub employment_type: String,
    pub job_function: String,
    pub industries: String,
}

/// Extract the description and the four labeled criteria from a detail-page
/// snapshot. A missing description block is the only hard failure; a missing
/// criterion degrades to "Not Found" with a warning.
pub fn extract(html: &str) -> Result<DetailAttributes, ExtractError> {
    let doc = Html::parse_document(html);

    let section = doc
        .select(&DESCRIPTION)
        .next()
        .ok_or(ExtractError::DescriptionMissing)?;
    let description = section.text().collect::<String>().trim().to_string();

    Ok(DetailAttributes {
        description,
        seniority_level: labeled_value(&doc, SENIORITY_LABEL),
        employment_type: labeled_value(&doc, EMPLOYMENT_LABEL),
        job_function: labeled_value(&doc, FUNCTION_LABEL),
        industries: labeled_value(&doc, INDUSTRIES_LABEL),
    })
}

/// Find the criteria heading carrying `label` and read the adjacent value.
fn labeled_value(doc: &Html, label: &str) -> String {
    let value = doc
        .select(&HEADER)
        .find(|h| clean_text(h).contains(label))
        .and_then(next_span_text)
        .filter(|v| !v.is_empty());

    match value {
        Some(v) => v,
        None => {
            warn!(label, "criteria value not found on detail page");
            NOT_FOUND.to_string()
        }
    }
}

/// The first span at or under a sibling following the heading, which is where
/// the criteria markup keeps its values.
fn next_span_text(header: ElementRef) -> Option<String> {
    for sibling in header.next_siblings() {
        if let Some(el) = ElementRef::wrap(sibling) {
            if el.value().name() == "span" {
                return Some(clean_text(&el));
            }
            if let Some(span) = el.select(&SPAN).next() {
                return Some(clean_text(&span));
            }
        }
    }
    None
}

// ── Tests ──
