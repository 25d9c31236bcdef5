// src/main.rs

//! huizenzoeker: Dutch real-estate listing watcher CLI
//!
//! Periodically scans a set of makelaar websites, records every listing,
//! and notifies subscribers of new, changed, and removed offerings.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use tokio::sync::watch;

use huizenzoeker::config::{load_config, write_default_config};
use huizenzoeker::error::{AppError, Result};
use huizenzoeker::models::{ChangeKind, Config, format_euros};
use huizenzoeker::pipeline::{Orchestrator, log_summary, run_scheduler};
use huizenzoeker::scrapers::KNOWN_SOURCES;
use huizenzoeker::store::{ListingQuery, ListingStore, LocalStore};

#[derive(Parser, Debug)]
#[command(
    name = "huizenzoeker",
    version,
    about = "Watches Dutch real-estate sites and notifies on changes"
)]
struct Cli {
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one scan cycle now and report the summary
    Run,
    /// Scan on the configured interval until interrupted
    Watch,
    /// Validate the configuration file
    Validate,
    /// Write a default configuration file
    InitConfig {
        #[arg(long)]
        force: bool,
    },
    /// Query stored listings
    Listings {
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        min_price: Option<i64>,
        #[arg(long)]
        max_price: Option<i64>,
        #[arg(long)]
        min_area: Option<i64>,
        #[arg(long = "type")]
        property_type: Option<String>,
        /// Include listings already marked removed
        #[arg(long)]
        all: bool,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Show recent change events
    Changes {
        /// Window like "24h", or an RFC 3339 timestamp
        #[arg(long, default_value = "24h")]
        since: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = Path::new(&cli.config).to_path_buf();

    if let Command::InitConfig { force } = &cli.command {
        write_default_config(&config_path, *force)?;
        println!("Wrote default configuration to {}", cli.config);
        return Ok(());
    }

    let config = load_config(&config_path)?;
    init_logging(&config.general.log_level);

    match cli.command {
        Command::InitConfig { .. } => unreachable!("handled before config load"),
        Command::Validate => report_config(&config),
        Command::Run => {
            let (orchestrator, shutdown) = build_orchestrator(config).await?;
            if let Some(summary) = orchestrator.run_cycle(&shutdown).await? {
                log_summary(&summary);
            }
        }
        Command::Watch => {
            let (orchestrator, shutdown) = build_orchestrator(config).await?;
            run_scheduler(orchestrator, shutdown).await?;
        }
        Command::Listings {
            city,
            min_price,
            max_price,
            min_area,
            property_type,
            all,
            limit,
            offset,
        } => {
            let store = open_store(&config).await?;
            let query = ListingQuery {
                city,
                min_price,
                max_price,
                min_area,
                property_type,
                include_removed: all,
                offset,
                limit: Some(limit),
            };
            print_listings(&store, &query).await?;
        }
        Command::Changes { since } => {
            let store = open_store(&config).await?;
            print_changes(&store, parse_since(&since)?).await?;
        }
    }

    Ok(())
}

fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Store unavailability here is fatal, per the startup contract.
async fn open_store(config: &Config) -> Result<LocalStore> {
    LocalStore::open(&config.general.store_dir).await
}

async fn build_orchestrator(config: Config) -> Result<(Arc<Orchestrator>, watch::Receiver<bool>)> {
    let store = Arc::new(open_store(&config).await?);
    let orchestrator = Arc::new(Orchestrator::new(Arc::new(config), store)?);
    Ok((orchestrator, spawn_shutdown_listener()))
}

/// Flip the shared shutdown flag on ctrl-c.
fn spawn_shutdown_listener() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Shutdown requested");
            let _ = tx.send(true);
        }
    });
    rx
}

fn report_config(config: &Config) {
    println!("Configuration OK");
    println!("  scan interval: {} minute(s)", config.general.scan_interval_minutes);
    println!("  store dir:     {}", config.general.store_dir);
    println!(
        "  filter:        {} - {}, min {} m2",
        format_euros(config.filter.min_price),
        config
            .filter
            .max_price
            .map(format_euros)
            .unwrap_or_else(|| "onbeperkt".to_string()),
        config.filter.min_area
    );
    println!(
        "  telegram:      {}",
        if config.telegram.is_configured() {
            "configured"
        } else {
            "not configured"
        }
    );

    for source in config.enabled_sources() {
        if KNOWN_SOURCES.contains(&source.as_str()) {
            println!("  source:        {source}");
        } else {
            println!("  source:        {source} (UNKNOWN - will be skipped)");
        }
    }
}

async fn print_listings(store: &LocalStore, query: &ListingQuery) -> Result<()> {
    let page = store.list_listings(query).await?;
    println!(
        "Showing {} of {} matching listing(s)",
        page.listings.len(),
        page.total
    );

    for listing in &page.listings {
        let price = listing
            .price
            .map(format_euros)
            .unwrap_or_else(|| "prijs op aanvraag".to_string());
        let area = listing
            .area_m2
            .map(|a| format!("{a} m2"))
            .unwrap_or_else(|| "? m2".to_string());
        let marker = match listing.status {
            huizenzoeker::models::ListingStatus::Active => "",
            huizenzoeker::models::ListingStatus::Removed => " [verwijderd]",
        };
        println!(
            "  [{}] {}, {} - {} ({}){}",
            listing.source_id, listing.address, listing.city, price, area, marker
        );
        println!("        {}", listing.url);
    }
    Ok(())
}

async fn print_changes(store: &LocalStore, since: DateTime<Utc>) -> Result<()> {
    let events = store.recent_changes(since).await?;
    println!("{} change(s) since {}", events.len(), since.to_rfc3339());

    for event in &events {
        let listing = event.subject();
        let label = match event.kind {
            ChangeKind::New => "NEW    ",
            ChangeKind::Updated => "UPDATED",
            ChangeKind::Removed => "REMOVED",
        };
        println!(
            "  {} {} [{}] {}, {}",
            event.occurred_at.format("%Y-%m-%d %H:%M"),
            label,
            event.source_id,
            listing.address,
            listing.city
        );
    }
    Ok(())
}

/// Parse a `--since` argument: either a trailing-h hour window or an
/// RFC 3339 timestamp.
fn parse_since(input: &str) -> Result<DateTime<Utc>> {
    let trimmed = input.trim();
    if let Some(hours) = trimmed.strip_suffix('h') {
        let hours: i64 = hours
            .parse()
            .map_err(|_| AppError::validation(format!("invalid --since window: {input}")))?;
        return Ok(Utc::now() - Duration::hours(hours));
    }

    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| AppError::validation(format!("invalid --since value: {input}")))
}
