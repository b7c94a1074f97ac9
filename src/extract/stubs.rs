use std::sync::LazyLock;

use scraper::{Html, Selector};

use super::{clean_text, NOT_AVAILABLE};
use crate::db::ListingStub;

static CARD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.base-card").unwrap());
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h3.base-search-card__title").unwrap());
static COMPANY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h4.base-search-card__subtitle").unwrap());
static LOCATION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.job-search-card__location").unwrap());
static POSTED: LazyLock<Selector> = LazyLock::new(|| Selector::parse("time").unwrap());
static LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.base-card__full-link").unwrap());

/// Pull listing stubs out of a results-feed snapshot, in document order.
/// A malformed card never aborts the batch: missing sub-fields become "N/A".
/// Duplicates are allowed here; the caller deduplicates by external_id.
pub fn extract(html: &str, search_keyword: &str, search_location: &str) -> Vec<ListingStub> {
    let doc = Html::parse_document(html);

    doc.select(&CARD)
        .map(|card| {
            let field = |sel: &Selector| {
                card.select(sel)
                    .next()
                    .map(|el| clean_text(&el))
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string())
            };

            let link = card
                .select(&LINK)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(|href| href.trim().to_string())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string());

            let external_id = if link == NOT_AVAILABLE {
                NOT_AVAILABLE.to_string()
            } else {
                external_id_from_link(&link)
            };

            ListingStub {
                external_id,
                link,
                title: field(&TITLE),
                company: field(&COMPANY),
                location: field(&LOCATION),
                posted_time: field(&POSTED),
                search_keyword: search_keyword.to_string(),
                search_location: search_location.to_string(),
            }
        })
        .collect()
}

/// Canonical listing id: the trailing path segment of the link, with query
/// parameters and fragment discarded. Used as the dedup/join key between
/// stubs and details.
pub fn external_id_from_link(link: &str) -> String {
    match url::Url::parse(link) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .unwrap_or(link)
            .to_string(),
        // Not an absolute URL: fall back to plain string surgery.
        Err(_) => {
            let no_query = link.split(['?', '#']).next().unwrap_or(link);
            no_query
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or(no_query)
                .to_string()
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn extracts_all_cards_with_sentinel_for_missing_title() {
        let html = fixture("search_results");
        let stubs = extract(&html, "Data Scientist", "India");
        assert_eq!(stubs.len(), 3);

        assert_eq!(stubs[0].title, "Senior Data Scientist");
        assert_eq!(stubs[0].company, "Acme Analytics");
        assert_eq!(stubs[0].location, "Bengaluru, Karnataka, India");
        assert_eq!(stubs[0].posted_time, "2 days ago");
        assert_eq!(
            stubs[0].external_id,
            "senior-data-scientist-at-acme-analytics-4012345678"
        );

        // card #2 has no title tag: batch still succeeds with a sentinel
        assert_eq!(stubs[1].title, "N/A");
        assert_eq!(stubs[1].company, "Globex");

        assert_eq!(stubs[2].title, "ML Engineer");
        assert_eq!(stubs[2].search_keyword, "Data Scientist");
        assert_eq!(stubs[2].search_location, "India");
    }

    #[test]
    fn card_without_link_gets_sentinels() {
        let html = r#"
            <div class="base-card">
              <h3 class="base-search-card__title">Orphan Job</h3>
            </div>"#;
        let stubs = extract(html, "kw", "loc");
        assert_eq!(stubs.len(), 1);
        assert_eq!(stubs[0].link, "N/A");
        assert_eq!(stubs[0].external_id, "N/A");
        assert_eq!(stubs[0].company, "N/A");
    }

    #[test]
    fn empty_snapshot_yields_no_stubs() {
        assert!(extract("<html><body></body></html>", "kw", "loc").is_empty());
    }

    #[test]
    fn external_id_strips_query_parameters() {
        assert_eq!(
            external_id_from_link(
                "https://in.linkedin.com/jobs/view/data-scientist-at-x-401?position=1&pageNum=0"
            ),
            "data-scientist-at-x-401"
        );
    }

    #[test]
    fn external_id_ignores_trailing_slash() {
        assert_eq!(
            external_id_from_link("https://example.com/jobs/view/abc-123/"),
            "abc-123"
        );
    }

    #[test]
    fn external_id_falls_back_on_relative_links() {
        assert_eq!(external_id_from_link("/jobs/view/abc-123?x=1"), "abc-123");
        assert_eq!(external_id_from_link("abc-123#top"), "abc-123");
    }
}
