//! # Archive Harvest CLI (`qah`)
//!
//! ## Usage
//!
//! ```bash
//! qah --config ./config/qah.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `qah init` | Create the index (or drop and recreate it with `--recreate`) |
//! | `qah sync` | Sync the latest page, then walk monthly pages backward |
//! | `qah parse <file>` | Extract records from a saved page without indexing |
//! | `qah search "<term>"` | Query the index |
//! | `qah cache-key <url>` | Print the cache file name for a URL |
//!
//! Logs go to stderr and are filtered with `RUST_LOG`
//! (default `archive_harvest=info`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use archive_harvest::cache::cache_key;
use archive_harvest::config::{self, parse_start, Config};
use archive_harvest::index::open_index;
use archive_harvest::parse::PageParser;
use archive_harvest::progress::ProgressMode;
use archive_harvest::search;
use archive_harvest::sync::{self, SyncOptions};

/// Harvest a monthly HTML question archive into a full-text index.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/qah.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "qah",
    about = "Incremental harvester for a monthly HTML question archive",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/qah.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the index if it does not exist.
    ///
    /// Safe to run repeatedly. With `--recreate` the existing index and all
    /// of its records are dropped first.
    Init {
        #[arg(long)]
        recreate: bool,
    },

    /// Sync the latest page, then walk the monthly pages backward until the
    /// archive answers not-found.
    Sync {
        /// First month of the backward walk: `YYYY-MM` or `adaptive`.
        /// Overrides `crawl.start`.
        #[arg(long)]
        start: Option<String>,

        /// Only sync the latest page.
        #[arg(long)]
        latest_only: bool,

        /// Crawl and parse, but upsert into a throwaway in-memory index.
        #[arg(long)]
        dry_run: bool,

        /// Progress output on stderr: `off`, `human` or `json`.
        /// Defaults to `human` when stderr is a terminal.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Parse a saved archive page and print its records.
    Parse {
        file: PathBuf,

        /// Print records as JSON lines.
        #[arg(long)]
        json: bool,
    },

    /// Search the index.
    Search {
        /// Search term. An empty term lists the newest records.
        term: String,

        #[arg(long, default_value_t = 10)]
        size: usize,

        /// Offset into the result list.
        #[arg(long, default_value_t = 0)]
        from: usize,
    },

    /// Print the cache key (file name) for a URL.
    CacheKey { url: String },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "archive_harvest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Init { recreate } => {
            let cfg = config::load_config(&cli.config)?;
            let index = open_index(&cfg).await?;
            index
                .ensure(recreate)
                .await
                .with_context(|| format!("Failed to initialize {} index", index.name()))?;
            println!("Index '{}' initialized ({}).", cfg.index.name, index.name());
        }
        Commands::Sync {
            start,
            latest_only,
            dry_run,
            progress,
        } => {
            let cfg = config::load_config(&cli.config)?;
            let start = match start {
                Some(s) => parse_start(&s)?,
                None => cfg.crawl.start_cursor()?,
            };
            let progress = ProgressMode::from_flag(progress.as_deref())?;
            let options = SyncOptions { start, latest_only };
            sync::run_sync(&cfg, options, dry_run, progress).await?;
        }
        Commands::Parse { file, json } => {
            // Use config if available, otherwise a minimal default
            let cfg = config::load_config(&cli.config).unwrap_or_else(|_| Config::minimal());
            run_parse(&cfg, &file, json)?;
        }
        Commands::Search { term, size, from } => {
            let cfg = config::load_config(&cli.config)?;
            search::run_search(&cfg, &term, size, from).await?;
        }
        Commands::CacheKey { url } => {
            println!("{}", cache_key(&url));
        }
    }

    Ok(())
}

fn run_parse(cfg: &Config, file: &Path, json: bool) -> Result<()> {
    let html = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read page: {}", file.display()))?;
    let parser = PageParser::new(&cfg.parser, &cfg.archive.base_url)
        .context("Invalid archive.base_url")?;
    let records = parser.parse(&html)?;

    for record in &records {
        if json {
            println!("{}", serde_json::to_string(record)?);
        } else {
            println!(
                "{}  {}  {} bytes",
                record.date.format("%Y-%m-%d %H:%M"),
                record.id,
                record.content_html.len()
            );
        }
    }
    if !json {
        println!("{} records", records.len());
    }
    Ok(())
}
