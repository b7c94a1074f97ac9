use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::EnrichConfig;
use crate::db::{self, ListingDetail};
use crate::extract::{self, detail::DetailAttributes};

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http status {status} for {url}")]
    Status { status: u16, url: String },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Detail-page fetch seam; mocked in tests to assert fetch counts.
#[async_trait]
pub trait DetailFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DetailFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }
}

pub struct EnrichStats {
    pub total: usize,
    pub enriched: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// One enrichment pass over all persisted stubs. A stub that already has a
/// detail row is skipped without fetching; everything else gets a bounded
/// number of fetch+extract attempts, and a stub that exhausts its retries is
/// recorded and left for a later pass. The pass itself never fails on a
/// single listing.
pub async fn run(
    conn: &Connection,
    fetcher: &dyn DetailFetcher,
    cfg: &EnrichConfig,
    limit: Option<usize>,
) -> Result<EnrichStats> {
    let span = info_span!("enrich_pass");
    async {
        let stubs = db::list_stubs(conn, limit)?;
        info!(count = stubs.len(), "starting enrichment pass");

        let pb = ProgressBar::new(stubs.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
                .progress_chars("=> "),
        );

        let mut stats = EnrichStats {
            total: stubs.len(),
            enriched: 0,
            skipped: 0,
            failed: 0,
        };

        for (link, external_id) in &stubs {
            if db::has_detail(conn, external_id)? {
                stats.skipped += 1;
                pb.inc(1);
                continue;
            }

            match enrich_one(fetcher, cfg, link, external_id).await {
                Ok(attrs) => {
                    db::insert_detail(
                        conn,
                        &ListingDetail {
                            external_id: external_id.clone(),
                            link: link.clone(),
                            description: attrs.description,
                            seniority_level: attrs.seniority_level,
                            employment_type: attrs.employment_type,
                            job_function: attrs.job_function,
                            industries: attrs.industries,
                        },
                    )?;
                    stats.enriched += 1;
                }
                Err(e) => {
                    error!(id = %external_id, error = %e, "enrichment failed, moving on");
                    stats.failed += 1;
                }
            }

            pb.inc(1);
            // fixed pacing between fetched listings, as a rate limit
            tokio::time::sleep(cfg.pace).await;
        }

        pb.finish_and_clear();
        info!(
            enriched = stats.enriched,
            skipped = stats.skipped,
            failed = stats.failed,
            "enrichment pass complete"
        );
        Ok(stats)
    }
    .instrument(span)
    .await
}

/// Transient and structural failures retry uniformly: a render delay on the
/// detail page is indistinguishable from a removed description block.
async fn enrich_one(
    fetcher: &dyn DetailFetcher,
    cfg: &EnrichConfig,
    link: &str,
    external_id: &str,
) -> Result<DetailAttributes> {
    let mut last_error = None;
    for attempt in 1..=cfg.max_retries {
        match try_enrich(fetcher, link).await {
            Ok(attrs) => return Ok(attrs),
            Err(e) => {
                warn!(
                    id = %external_id,
                    attempt,
                    max = cfg.max_retries,
                    error = %e,
                    "enrichment attempt failed"
                );
                last_error = Some(e);
                if attempt < cfg.max_retries {
                    tokio::time::sleep(cfg.retry_wait).await;
                }
            }
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow!("max_retries is 0, nothing attempted")))
}

async fn try_enrich(fetcher: &dyn DetailFetcher, link: &str) -> Result<DetailAttributes> {
    let html = fetcher.fetch(link).await?;
    Ok(extract::detail::extract(&html)?)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct FixedFetcher {
        calls: AtomicUsize,
        body: String,
    }

    impl FixedFetcher {
        fn new(body: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                body: body.to_string(),
            }
        }
    }

    #[async_trait]
    impl DetailFetcher for FixedFetcher {
        async fn fetch(&self, _url: &str) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.clone())
        }
    }

    struct FailingFetcher {
        calls: AtomicUsize,
    }

    impl FailingFetcher {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DetailFetcher for FailingFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Status {
                status: 500,
                url: url.to_string(),
            })
        }
    }

    fn zero_wait() -> EnrichConfig {
        EnrichConfig {
            pace: Duration::ZERO,
            max_retries: 3,
            retry_wait: Duration::ZERO,
        }
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    fn seed_stub(conn: &Connection, id: &str) {
        db::insert_stubs(
            conn,
            &[db::ListingStub {
                external_id: id.to_string(),
                link: format!("https://example.com/jobs/view/{id}"),
                title: "Job".into(),
                company: "Acme".into(),
                location: "Remote".into(),
                posted_time: "1 day ago".into(),
                search_keyword: "kw".into(),
                search_location: "loc".into(),
            }],
        )
        .unwrap();
    }

    fn detail_html() -> String {
        std::fs::read_to_string("tests/fixtures/detail_page.html").unwrap()
    }

    #[tokio::test]
    async fn already_enriched_stub_is_never_fetched() {
        let conn = test_conn();
        seed_stub(&conn, "a1");
        let fetcher = FixedFetcher::new(&detail_html());

        // first pass enriches, second pass must skip without fetching
        run(&conn, &fetcher, &zero_wait(), None).await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        let stats = run(&conn, &fetcher, &zero_wait(), None).await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.enriched, 0);
    }

    #[tokio::test]
    async fn successful_pass_persists_attributes() {
        let conn = test_conn();
        seed_stub(&conn, "a1");
        let fetcher = FixedFetcher::new(&detail_html());

        let stats = run(&conn, &fetcher, &zero_wait(), None).await.unwrap();
        assert_eq!(stats.enriched, 1);
        assert!(db::has_detail(&conn, "a1").unwrap());

        let seniority: String = conn
            .query_row(
                "SELECT seniority_level FROM listing_details WHERE external_id = 'a1'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(seniority, "Mid-Senior level");
    }

    #[tokio::test]
    async fn retries_exhaust_then_pass_continues() {
        let conn = test_conn();
        seed_stub(&conn, "a1");
        seed_stub(&conn, "a2");
        let fetcher = FailingFetcher::new();

        let stats = run(&conn, &fetcher, &zero_wait(), None).await.unwrap();

        // exactly max_retries attempts per stub, both recorded as failed
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 6);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.enriched, 0);
        assert!(!db::has_detail(&conn, "a1").unwrap());
        assert!(!db::has_detail(&conn, "a2").unwrap());
    }

    #[tokio::test]
    async fn missing_description_retries_like_a_transient_failure() {
        let conn = test_conn();
        seed_stub(&conn, "a1");
        let body = std::fs::read_to_string("tests/fixtures/detail_no_description.html").unwrap();
        let fetcher = FixedFetcher::new(&body);

        let stats = run(&conn, &fetcher, &zero_wait(), None).await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(stats.failed, 1);
        assert!(!db::has_detail(&conn, "a1").unwrap());
    }

    #[tokio::test]
    async fn limit_bounds_the_pass() {
        let conn = test_conn();
        seed_stub(&conn, "a1");
        seed_stub(&conn, "a2");
        seed_stub(&conn, "a3");
        let fetcher = FixedFetcher::new(&detail_html());

        let stats = run(&conn, &fetcher, &zero_wait(), Some(2)).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.enriched, 2);
        assert!(!db::has_detail(&conn, "a3").unwrap());
    }
}
