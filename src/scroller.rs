use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use rusqlite::Connection;
use tracing::{debug, error, info, info_span, Instrument};

use crate::browser::{Browser, BrowserProvider};
use crate::config::{RestartPolicy, ScrollPacing, SearchSession};
use crate::db::{self, ListingStub};
use crate::extract;

const LOAD_MORE_SELECTOR: &str = "button.infinite-scroller__show-more-button";

/// Scroll driver lifecycle. A session lives through exactly one pass of
/// these states; session recovery starts a fresh session back at Init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriveState {
    Init,
    Navigated,
    Scrolling,
    PausedForLoad,
    Done,
    Terminated,
}

fn advance(state: &mut DriveState, to: DriveState) {
    debug!(from = ?state, ?to, "scroll state");
    *state = to;
}

#[derive(Debug)]
pub struct ScrollStats {
    /// Unique external ids discovered this run.
    pub discovered: usize,
    /// Rows actually written (ids not already persisted by earlier runs).
    pub inserted: usize,
    pub increments: u64,
    pub restarts: u32,
}

/// Run one scroll session to completion, recreating the browser session on
/// any session-fatal error. The in-page scroll offset cannot be restored
/// across sessions, so every restart begins the search from the top; the
/// incremental saves bound what a crash can lose to one save interval.
pub async fn run_with_recovery(
    provider: &dyn BrowserProvider,
    conn: &Connection,
    session: &SearchSession,
    pacing: &ScrollPacing,
    policy: &RestartPolicy,
) -> Result<ScrollStats> {
    let span = info_span!("scroll_run", search_id = %session.search_id);
    async {
        let mut restarts = 0u32;
        loop {
            let mut browser = provider
                .create()
                .await
                .context("creating browser session")?;

            match drive(browser.as_mut(), conn, session, pacing).await {
                Ok(mut stats) => {
                    stats.restarts = restarts;
                    return Ok(stats);
                }
                Err(e) => {
                    error!(error = %e, restarts, "scroll session failed, discarding session");
                    drop(browser);
                    if let Some(max) = policy.max_restarts {
                        if restarts >= max {
                            return Err(e.context(format!(
                                "scroll session failed after {restarts} restarts"
                            )));
                        }
                    }
                    restarts += 1;
                    tokio::time::sleep(policy.restart_delay).await;
                }
            }
        }
    }
    .instrument(span)
    .await
}

/// One full scroll pass: navigate, reveal in randomized increments, harvest
/// every `save_interval` increments, stop at max listings or feed exhaustion.
async fn drive(
    browser: &mut dyn Browser,
    conn: &Connection,
    session: &SearchSession,
    pacing: &ScrollPacing,
) -> Result<ScrollStats> {
    std::fs::create_dir_all(&session.snapshot_dir)
        .with_context(|| format!("creating {}", session.snapshot_dir.display()))?;

    let mut state = DriveState::Init;
    let mut seen: HashSet<String> = HashSet::new();
    let mut inserted = 0usize;
    let mut increments = 0u64;
    let mut cursor: i64 = 0;

    let url = session.search_url();
    info!(%url, "navigating to search feed");
    browser.navigate(&url).await?;
    advance(&mut state, DriveState::Navigated);
    advance(&mut state, DriveState::Scrolling);

    loop {
        // Checked before each increment, so the run ends right after the
        // save that crossed the threshold, never in the middle of a batch.
        if seen.len() >= session.max_listings {
            info!(
                discovered = seen.len(),
                max = session.max_listings,
                "max listings reached"
            );
            advance(&mut state, DriveState::Done);
            break;
        }

        cursor += jitter(&pacing.scroll_step);
        browser.scroll_to(cursor).await?;
        pause(&pacing.step_pause_ms).await;

        if browser.click_if_present(LOAD_MORE_SELECTOR).await? {
            advance(&mut state, DriveState::PausedForLoad);
            info!("clicked load-more, waiting for new results");
            pause(&pacing.load_more_pause_ms).await;
            advance(&mut state, DriveState::Scrolling);
        }

        let height = browser.page_height().await?;
        if cursor >= height {
            // Give slow content one long pause; two reads of the same
            // height mean the feed is exhausted.
            pause(&pacing.exhaust_pause_ms).await;
            if browser.page_height().await? <= height {
                info!(height, "content height stopped growing, feed exhausted");
                advance(&mut state, DriveState::Done);
                break;
            }
        }

        increments += 1;
        if increments % session.save_interval == 0 {
            inserted += harvest(browser, conn, session, &mut seen).await?;
        }
    }

    // Final snapshot catches whatever the last partial interval revealed.
    inserted += harvest(browser, conn, session, &mut seen).await?;
    info!(
        discovered = seen.len(),
        inserted, increments, "scroll run finished"
    );
    advance(&mut state, DriveState::Terminated);

    Ok(ScrollStats {
        discovered: seen.len(),
        inserted,
        increments,
        restarts: 0,
    })
}

/// Snapshot the page to the per-run file, re-read it, extract stubs and
/// persist the ones not seen before. Returns how many rows were written.
async fn harvest(
    browser: &mut dyn Browser,
    conn: &Connection,
    session: &SearchSession,
    seen: &mut HashSet<String>,
) -> Result<usize> {
    let path = session.snapshot_path();
    let html = browser.page_source().await?;
    std::fs::write(&path, &html)
        .with_context(|| format!("writing snapshot {}", path.display()))?;
    // Extraction reads the durable copy, not the in-memory page source.
    let snapshot = std::fs::read_to_string(&path)
        .with_context(|| format!("re-reading snapshot {}", path.display()))?;

    let stubs = extract::stubs::extract(&snapshot, &session.keywords, &session.location);
    let fresh: Vec<ListingStub> = stubs
        .into_iter()
        .filter(|stub| seen.insert(stub.external_id.clone()))
        .collect();

    let written = db::insert_stubs(conn, &fresh)?;
    info!(
        discovered = seen.len(),
        new_this_save = fresh.len(),
        written,
        "harvested snapshot"
    );
    Ok(written)
}

fn jitter(range: &RangeInclusive<i64>) -> i64 {
    rand::thread_rng().gen_range(range.clone())
}

async fn pause(range: &RangeInclusive<u64>) {
    let ms = rand::thread_rng().gen_range(range.clone());
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// ── Tests ──
