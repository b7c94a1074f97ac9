use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;

pub const SNAPSHOT_DIR: &str = "data/snapshots";

const SEARCH_BASE_URL: &str = "https://www.linkedin.com/jobs/search?";
const DAY_SECS: u64 = 86_400;

/// Immutable configuration for one scroll run over a single search.
#[derive(Debug, Clone)]
pub struct SearchSession {
    /// Unique run id, timestamp-suffixed so concurrent and historical runs
    /// never collide on the snapshot file.
    pub search_id: String,
    pub keywords: String,
    pub location: String,
    /// "posted within the last N seconds" filter on the search URL.
    pub time_window_secs: u64,
    /// Stop once this many unique listings were discovered this run.
    pub max_listings: usize,
    /// Snapshot + extract + persist every this many scroll increments.
    pub save_interval: u64,
    pub snapshot_dir: PathBuf,
}

impl SearchSession {
    pub fn new(keywords: &str, location: &str, time_window_secs: u64) -> Self {
        let stamp = Utc::now().format("%Y-%m-%d_%H-%M-%S");
        Self {
            search_id: format!("{}_{}", keywords.trim().replace(' ', "-"), stamp),
            keywords: keywords.to_string(),
            location: location.to_string(),
            time_window_secs,
            max_listings: 400,
            save_interval: 10,
            snapshot_dir: PathBuf::from(SNAPSHOT_DIR),
        }
    }

    /// Search results URL with keyword, location and recency filter applied.
    pub fn search_url(&self) -> String {
        format!(
            "{}keywords={}&location={}&f_TPR=r{}",
            SEARCH_BASE_URL,
            self.keywords.replace(' ', "+"),
            self.location.replace(' ', "+"),
            self.time_window_secs,
        )
    }

    /// Per-run HTML snapshot file, re-read by the extractor after each save.
    pub fn snapshot_path(&self) -> PathBuf {
        self.snapshot_dir.join(format!("{}.html", self.search_id))
    }
}

/// Randomized pacing bounds for the scroll loop. Steps and pauses are drawn
/// uniformly from these ranges so the scroller never runs at a fixed cadence.
#[derive(Debug, Clone)]
pub struct ScrollPacing {
    /// Scroll cursor advance per increment, in pixels.
    pub scroll_step: RangeInclusive<i64>,
    /// Pause after each scroll increment, in milliseconds.
    pub step_pause_ms: RangeInclusive<u64>,
    /// Pause after clicking the load-more affordance.
    pub load_more_pause_ms: RangeInclusive<u64>,
    /// Long pause before re-checking the page height at the feed bottom.
    pub exhaust_pause_ms: RangeInclusive<u64>,
}

impl Default for ScrollPacing {
    fn default() -> Self {
        Self {
            scroll_step: 200..=400,
            step_pause_ms: 50..=500,
            load_more_pause_ms: 12_000..=14_000,
            exhaust_pause_ms: 12_000..=24_000,
        }
    }
}

/// Session recovery policy. `max_restarts: None` restarts a failed scroll
/// session until one run completes, which is the operational default; set a
/// ceiling to surface a permanently broken page layout instead of looping.
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    pub max_restarts: Option<u32>,
    pub restart_delay: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: None,
            restart_delay: Duration::from_secs(5),
        }
    }
}

/// Enrichment worker knobs.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    /// Delay between successive detail fetches, as a rate limit.
    pub pace: Duration,
    /// Attempts per listing before recording the failure and moving on.
    pub max_retries: u32,
    /// Fixed wait between attempts for the same listing.
    pub retry_wait: Duration,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            pace: Duration::from_secs(1),
            max_retries: 3,
            retry_wait: Duration::from_secs(5),
        }
    }
}

// ── Search plan file ──

/// On-disk search plan: a list of searches run back to back, each getting a
/// fresh timestamped session.
#[derive(Debug, Deserialize)]
pub struct SearchPlan {
    pub searches: Vec<SearchSpec>,
}

#[derive(Debug, Deserialize)]
pub struct SearchSpec {
    pub search_term: String,
    pub location: String,
    pub last_how_many_days: u64,
}

impl SearchPlan {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading search plan {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing search plan {}", path.display()))
    }
}

impl SearchSpec {
    pub fn session(&self) -> SearchSession {
        SearchSession::new(
            &self.search_term,
            &self.location,
            self.last_how_many_days * DAY_SECS,
        )
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_url_encodes_keywords_and_window() {
        let session = SearchSession::new("Data Scientist", "India", 86_400);
        let url = session.search_url();
        assert!(url.starts_with("https://www.linkedin.com/jobs/search?"));
        assert!(url.contains("keywords=Data+Scientist"));
        assert!(url.contains("location=India"));
        assert!(url.ends_with("f_TPR=r86400"));
    }

    #[test]
    fn search_id_carries_keywords_and_timestamp() {
        let session = SearchSession::new("Data Scientist", "India", 86_400);
        assert!(session.search_id.starts_with("Data-Scientist_"));
        // timestamp component: YYYY-MM-DD_HH-MM-SS
        let stamp = &session.search_id["Data-Scientist_".len()..];
        assert_eq!(stamp.len(), "2024-01-01_00-00-00".len());
    }

    #[test]
    fn snapshot_path_is_keyed_by_search_id() {
        let mut session = SearchSession::new("rust", "Berlin", 60);
        session.snapshot_dir = PathBuf::from("/tmp/snaps");
        let path = session.snapshot_path();
        assert_eq!(
            path,
            PathBuf::from(format!("/tmp/snaps/{}.html", session.search_id))
        );
    }

    #[test]
    fn plan_parses_and_builds_sessions() {
        let raw = r#"{
            "searches": [
                {"search_term": "Data Scientist", "location": "India", "last_how_many_days": 30},
                {"search_term": "ML Engineer", "location": "Remote", "last_how_many_days": 1}
            ]
        }"#;
        let plan: SearchPlan = serde_json::from_str(raw).unwrap();
        assert_eq!(plan.searches.len(), 2);
        let session = plan.searches[0].session();
        assert_eq!(session.time_window_secs, 30 * 86_400);
        assert_eq!(session.max_listings, 400);
        assert_eq!(session.save_interval, 10);
    }
}
