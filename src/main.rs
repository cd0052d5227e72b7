//! Siteharvest main entry point
//!
//! Command-line interface for crawling a site and querying the page store.

use anyhow::Context;
use clap::Parser;
use siteharvest::config::load_config_with_hash;
use siteharvest::crawler::{build_http_client, start_crawl, CrawlOptions, TracingObserver};
use siteharvest::state::PageStatus;
use siteharvest::storage::{PageStore, SqliteStorage};
use siteharvest::url_authority;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Siteharvest: crawl a website and keep its pages in a local store
///
/// Starting from a seed URL, siteharvest discovers same-domain links
/// breadth-first, stores each page's title, description, and raw HTML,
/// and tracks per-page crawl status for later queries.
#[derive(Parser, Debug)]
#[command(name = "siteharvest")]
#[command(version)]
#[command(about = "Crawl a website into a local page store", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Seed URL to crawl from
    #[arg(long, value_name = "URL")]
    url: Option<String>,

    /// Stop after this many successfully processed pages
    #[arg(long, value_name = "N", requires = "url")]
    max_pages: Option<u32>,

    /// Do not follow links deeper than this
    #[arg(long, value_name = "N", requires = "url")]
    max_depth: Option<u32>,

    /// Only follow links under the seed URL's path
    #[arg(long, requires = "url")]
    restrict_to_path: bool,

    /// Show the summary of a previous run and exit
    #[arg(long, value_name = "RUN_ID", conflicts_with_all = ["url", "search", "stats"])]
    status: Option<i64>,

    /// Search completed pages by keyword and exit
    #[arg(long, value_name = "KEYWORD", conflicts_with_all = ["url", "status", "stats"])]
    search: Option<String>,

    /// Limit --search results to one domain
    #[arg(long, value_name = "DOMAIN", requires = "search")]
    domain: Option<String>,

    /// Print the stored HTML of a completed page and exit
    #[arg(long, value_name = "URL", conflicts_with_all = ["url", "status", "search", "stats"])]
    content: Option<String>,

    /// Show whole-store page counts and exit
    #[arg(long, conflicts_with_all = ["url", "status", "search"])]
    stats: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    if let Some(run_id) = cli.status {
        handle_status(&config, run_id)?;
    } else if let Some(keyword) = &cli.search {
        handle_search(&config, keyword, cli.domain.as_deref())?;
    } else if let Some(page_url) = &cli.content {
        handle_content(&config, page_url)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if let Some(seed_url) = &cli.url {
        handle_crawl(&cli, &config, &config_hash, seed_url).await?;
    } else {
        anyhow::bail!("Nothing to do: pass --url, --status, --search, or --stats");
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("siteharvest=info,warn"),
            1 => EnvFilter::new("siteharvest=debug,info"),
            2 => EnvFilter::new("siteharvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Submits the seed page and runs the crawl to completion
async fn handle_crawl(
    cli: &Cli,
    config: &siteharvest::Config,
    config_hash: &str,
    seed_url: &str,
) -> anyhow::Result<()> {
    let parsed = Url::parse(seed_url).with_context(|| format!("Invalid seed URL: {}", seed_url))?;
    let domain = url_authority(&parsed)
        .with_context(|| format!("Seed URL has no host: {}", seed_url))?;

    let base_path = if cli.restrict_to_path {
        Some(parsed.path().to_string())
    } else {
        None
    };

    let store = SqliteStorage::new(Path::new(&config.storage.database_path))?;
    let store = Arc::new(Mutex::new(store));

    // Create the run and the seed page record before the engine starts
    let (run_id, seed_page_id) = {
        let mut store = store.lock().unwrap();
        let run_id = store.create_run(parsed.as_str(), config_hash)?;
        let (seed, created) = store.get_or_create_page(parsed.as_str(), &domain, run_id)?;
        // A seed left terminal by an earlier run starts this one clean
        if !created && seed.status != PageStatus::Pending {
            store.reset_to_pending(seed.id, run_id)?;
        }
        (run_id, seed.id)
    };

    let client = build_http_client(&config.user_agent, &config.crawler)?;
    let options = CrawlOptions {
        max_pages: cli.max_pages,
        max_depth: cli.max_depth,
        restrict_to_path: cli.restrict_to_path,
        base_path,
        politeness_delay: Duration::from_millis(config.crawler.politeness_delay_ms),
    };

    tracing::info!(
        "Starting crawl run {} from {} (max_pages={:?}, max_depth={:?})",
        run_id,
        parsed,
        cli.max_pages,
        cli.max_depth
    );

    let handle = start_crawl(
        Arc::clone(&store),
        client,
        options,
        Arc::new(TracingObserver),
        seed_page_id,
        run_id,
    );

    // Let Ctrl-C stop the run cleanly instead of killing the process
    let cancel = handle.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping crawl after current page");
            cancel.cancel();
        }
    });

    handle
        .task
        .await
        .context("Crawl task panicked")?;

    print_run_summary(&store.lock().unwrap(), run_id)?;
    Ok(())
}

/// Handles the --status mode
fn handle_status(config: &siteharvest::Config, run_id: i64) -> anyhow::Result<()> {
    let store = SqliteStorage::new(Path::new(&config.storage.database_path))?;
    print_run_summary(&store, run_id)?;
    Ok(())
}

fn print_run_summary(store: &SqliteStorage, run_id: i64) -> anyhow::Result<()> {
    let run = store.get_run(run_id)?;
    let summary = store.run_summary(run_id)?;

    println!("=== Crawl Run {} ===\n", run_id);
    println!("Seed:     {}", run.seed_url);
    println!("Status:   {:?}", run.status);
    println!("Started:  {}", run.started_at);
    if let Some(finished) = &run.finished_at {
        println!("Finished: {}", finished);
    }
    println!();
    println!("Pages:    {}", summary.total_pages);

    let mut counts: Vec<_> = summary.status_counts.iter().collect();
    counts.sort_by(|a, b| b.1.cmp(a.1));
    for (status, count) in counts {
        println!("  {}: {}", status, count);
    }

    if summary.is_processing {
        println!("\nStill processing");
    }
    Ok(())
}

/// Handles the --search mode
fn handle_search(
    config: &siteharvest::Config,
    keyword: &str,
    domain: Option<&str>,
) -> anyhow::Result<()> {
    let store = SqliteStorage::new(Path::new(&config.storage.database_path))?;
    let hits = store.search_pages(keyword, domain)?;

    if hits.is_empty() {
        println!("No completed pages match '{}'", keyword);
        return Ok(());
    }

    println!("{} page(s) match '{}':\n", hits.len(), keyword);
    for hit in hits {
        println!("  {} ({})", hit.url, hit.updated_at);
        if !hit.title.is_empty() {
            println!("    {}", hit.title);
        }
        if !hit.summary.is_empty() {
            println!("    {}", hit.summary);
        }
    }
    Ok(())
}

/// Handles the --content mode: raw HTML of one completed page
fn handle_content(config: &siteharvest::Config, page_url: &str) -> anyhow::Result<()> {
    let store = SqliteStorage::new(Path::new(&config.storage.database_path))?;

    let page = store
        .get_page_by_url(page_url)?
        .filter(|p| p.status == PageStatus::Completed)
        .with_context(|| format!("No completed page stored for '{}'", page_url))?;

    println!("{}", page.html_content.unwrap_or_default());
    Ok(())
}

/// Handles the --stats mode: whole-store counts by status
fn handle_stats(config: &siteharvest::Config) -> anyhow::Result<()> {
    let store = SqliteStorage::new(Path::new(&config.storage.database_path))?;

    let total = store.count_total_pages()?;
    println!("=== Page Store Statistics ===\n");
    println!("Database:    {}", config.storage.database_path);
    println!("Total pages: {}", total);

    for status in PageStatus::all_statuses() {
        let count = store.count_pages_by_status(status)?;
        if count > 0 {
            let percentage = if total > 0 {
                (count as f64 / total as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", status, count, percentage);
        }
    }
    Ok(())
}
