use anyhow::Result;
use rusqlite::Connection;

const DB_PATH: &str = "data/jobs.sqlite";

pub fn connect() -> Result<Connection> {
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS listings (
            external_id     TEXT PRIMARY KEY,
            link            TEXT NOT NULL,
            title           TEXT NOT NULL,
            company         TEXT NOT NULL,
            location        TEXT NOT NULL,
            posted_time     TEXT NOT NULL,
            search_keyword  TEXT NOT NULL,
            search_location TEXT NOT NULL,
            discovered_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_listings_keyword ON listings(search_keyword);

        CREATE TABLE IF NOT EXISTS listing_details (
            external_id     TEXT PRIMARY KEY,
            link            TEXT NOT NULL,
            description     TEXT NOT NULL,
            seniority_level TEXT NOT NULL,
            employment_type TEXT NOT NULL,
            job_function    TEXT NOT NULL,
            industries      TEXT NOT NULL,
            enriched_at     TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

// ── Scroll-discovered stubs ──

/// A lightly-detailed listing discovered while scrolling a results feed.
/// Never mutated after insert; `external_id` is the dedup key.
#[derive(Debug, Clone)]
pub struct ListingStub {
    pub external_id: String,
    pub link: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub posted_time: String,
    pub search_keyword: String,
    pub search_location: String,
}

/// Insert stubs, skipping ids already present. Returns how many rows were
/// actually inserted; primary-key conflicts count as skips, not errors.
pub fn insert_stubs(conn: &Connection, stubs: &[ListingStub]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO listings
             (external_id, link, title, company, location, posted_time,
              search_keyword, search_location)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for s in stubs {
            count += stmt.execute(rusqlite::params![
                s.external_id,
                s.link,
                s.title,
                s.company,
                s.location,
                s.posted_time,
                s.search_keyword,
                s.search_location,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// All known stubs as (link, external_id), in insertion order.
pub fn list_stubs(conn: &Connection, limit: Option<usize>) -> Result<Vec<(String, String)>> {
    let sql = match limit {
        Some(n) => format!(
            "SELECT link, external_id FROM listings ORDER BY rowid LIMIT {}",
            n
        ),
        None => "SELECT link, external_id FROM listings ORDER BY rowid".to_string(),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Enriched details ──

/// The enriched record for a stub, fetched from its own detail page.
/// Presence of a row is the authoritative "already enriched" marker.
#[derive(Debug, Clone)]
pub struct ListingDetail {
    pub external_id: String,
    pub link: String,
    pub description: String,
    pub seniority_level: String,
    pub employment_type: String,
    pub job_function: String,
    pub industries: String,
}

/// Insert a detail row once per external_id. Returns false when the id was
/// already enriched (conflict treated as a no-op skip).
pub fn insert_detail(conn: &Connection, detail: &ListingDetail) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO listing_details
         (external_id, link, description, seniority_level, employment_type,
          job_function, industries)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            detail.external_id,
            detail.link,
            detail.description,
            detail.seniority_level,
            detail.employment_type,
            detail.job_function,
            detail.industries,
        ],
    )?;
    Ok(inserted > 0)
}

pub fn has_detail(conn: &Connection, external_id: &str) -> Result<bool> {
    let mut stmt = conn.prepare("SELECT 1 FROM listing_details WHERE external_id = ?1")?;
    Ok(stmt.exists(rusqlite::params![external_id])?)
}

// ── Stats ──

pub struct Stats {
    pub listings: usize,
    pub enriched: usize,
    pub pending: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let listings: usize = conn.query_row("SELECT COUNT(*) FROM listings", [], |r| r.get(0))?;
    let enriched: usize =
        conn.query_row("SELECT COUNT(*) FROM listing_details", [], |r| r.get(0))?;
    Ok(Stats {
        listings,
        enriched,
        pending: listings.saturating_sub(enriched),
    })
}

// ── Tests ──
