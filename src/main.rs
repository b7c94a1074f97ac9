mod browser;
mod config;
mod db;
mod enricher;
mod extract;
mod scroller;

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "job_scraper",
    about = "Scroll-harvests job listings into SQLite and enriches them from detail pages"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema and data directories
    Init,
    /// Scroll the search feeds from a plan file and harvest listing stubs
    Scroll {
        /// Search plan JSON: {"searches": [{"search_term", "location", "last_how_many_days"}]}
        #[arg(long, default_value = "search_plan.json")]
        plan: PathBuf,
        /// Override max listings collected per search
        #[arg(long)]
        max_listings: Option<usize>,
        /// Give up after this many session restarts per search (default: unbounded)
        #[arg(long)]
        max_restarts: Option<u32>,
    },
    /// Fetch detail pages for stubs that have no detail row yet
    Enrich {
        /// Max stubs to consider (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Scroll + enrich in one pipeline
    Run {
        #[arg(long, default_value = "search_plan.json")]
        plan: PathBuf,
        #[arg(long)]
        max_listings: Option<usize>,
        #[arg(long)]
        max_restarts: Option<u32>,
    },
    /// Show collection statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => {
            std::fs::create_dir_all("data")?;
            std::fs::create_dir_all(config::SNAPSHOT_DIR)?;
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            println!("Initialized database schema and data directories.");
            Ok(())
        }
        Commands::Scroll {
            plan,
            max_listings,
            max_restarts,
        } => scroll(&plan, max_listings, max_restarts).await,
        Commands::Enrich { limit } => enrich(limit).await,
        Commands::Run {
            plan,
            max_listings,
            max_restarts,
        } => {
            scroll(&plan, max_listings, max_restarts).await?;
            enrich(None).await
        }
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Listings: {}", s.listings);
            println!("Enriched: {}", s.enriched);
            println!("Pending:  {}", s.pending);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

#[cfg(feature = "browser")]
async fn scroll(
    plan_path: &Path,
    max_listings: Option<usize>,
    max_restarts: Option<u32>,
) -> anyhow::Result<()> {
    let conn = db::connect()?;
    db::init_schema(&conn)?;

    let plan = config::SearchPlan::load(plan_path)?;
    if plan.searches.is_empty() {
        println!("Search plan is empty, nothing to scroll.");
        return Ok(());
    }

    let provider = browser::ChromeProvider::new();
    let pacing = config::ScrollPacing::default();
    let policy = config::RestartPolicy {
        max_restarts,
        ..config::RestartPolicy::default()
    };

    for spec in &plan.searches {
        let mut session = spec.session();
        if let Some(max) = max_listings {
            session.max_listings = max;
        }

        println!(
            "Searching '{}' in '{}' (last {} days)...",
            spec.search_term, spec.location, spec.last_how_many_days
        );
        let stats =
            scroller::run_with_recovery(&provider, &conn, &session, &pacing, &policy).await?;
        println!(
            "  {} unique listings discovered, {} new rows, {} restarts.",
            stats.discovered, stats.inserted, stats.restarts
        );
    }

    Ok(())
}

#[cfg(not(feature = "browser"))]
async fn scroll(
    _plan_path: &Path,
    _max_listings: Option<usize>,
    _max_restarts: Option<u32>,
) -> anyhow::Result<()> {
    anyhow::bail!("built without the 'browser' feature; scrolling needs a local Chrome")
}

async fn enrich(limit: Option<usize>) -> anyhow::Result<()> {
    let conn = db::connect()?;
    db::init_schema(&conn)?;

    let pending = db::get_stats(&conn)?.pending;
    if pending == 0 {
        println!("No listings waiting for enrichment. Run 'scroll' first.");
        return Ok(());
    }

    let fetcher = enricher::HttpFetcher::new()?;
    let stats = enricher::run(&conn, &fetcher, &config::EnrichConfig::default(), limit).await?;
    println!(
        "Enriched {} listings ({} skipped, {} failed) out of {} considered.",
        stats.enriched, stats.skipped, stats.failed, stats.total
    );

    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
