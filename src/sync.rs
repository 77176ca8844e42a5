//! Crawl orchestration.
//!
//! A run syncs the latest page first, then walks the monthly pages backward
//! one month at a time until the archive answers not-found for a month.
//! Every page goes through fetch → parse → bulk upsert before the next one
//! is requested. Any other error ends the run.

use anyhow::{bail, Context, Result};

use crate::bulk::BulkIndexer;
use crate::cache::{FileCache, NoCache, PageCache};
use crate::config::{ArchiveConfig, Config, StartCursor};
use crate::error::SyncError;
use crate::fetch::{CacheMode, HttpSource, PageFetcher};
use crate::index::memory::MemoryIndex;
use crate::index::{open_index, SearchIndex};
use crate::models::{Cursor, ItemFailure, SyncOutcome, SyncResult, YearMonth};
use crate::notify::{create_notifier, notify};
use crate::parse::{previous_month_link, PageParser};
use crate::progress::{ProgressMode, SyncProgressEvent, SyncProgressReporter};

#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub start: StartCursor,
    /// Stop after the latest page.
    pub latest_only: bool,
}

/// Outcome of syncing one page.
struct PageSync {
    records: u64,
    content: String,
    from_cache: bool,
    failures: Vec<ItemFailure>,
}

pub struct CrawlOrchestrator<'a> {
    archive: &'a ArchiveConfig,
    fetcher: &'a PageFetcher,
    parser: &'a PageParser,
    indexer: BulkIndexer<'a>,
    progress: &'a dyn SyncProgressReporter,
}

impl<'a> CrawlOrchestrator<'a> {
    pub fn new(
        archive: &'a ArchiveConfig,
        fetcher: &'a PageFetcher,
        parser: &'a PageParser,
        index: &'a dyn SearchIndex,
        batch_size: usize,
        progress: &'a dyn SyncProgressReporter,
    ) -> Self {
        Self {
            archive,
            fetcher,
            parser,
            indexer: BulkIndexer::new(index, batch_size),
            progress,
        }
    }

    fn url_for(&self, cursor: Cursor) -> String {
        match cursor {
            Cursor::Latest => self.archive.latest_url.clone(),
            Cursor::Month(ym) => self.archive.monthly_url_for(ym),
        }
    }

    async fn sync_page(&self, cursor: Cursor) -> Result<PageSync, SyncError> {
        let url = self.url_for(cursor);
        // The latest page keeps changing; only past months are cacheable.
        let mode = match cursor {
            Cursor::Latest => CacheMode::Bypass,
            Cursor::Month(_) => CacheMode::ReadThrough,
        };

        self.progress.report(SyncProgressEvent::Fetching { cursor });
        let page = self
            .fetcher
            .fetch(&url, mode)
            .await
            .map_err(|source| SyncError::Fetch {
                page: url.clone(),
                source,
            })?;

        let records = self
            .parser
            .parse(&page.content)
            .map_err(|source| SyncError::Parse {
                page: url.clone(),
                source,
            })?;

        let report = self
            .indexer
            .upsert(&records)
            .await
            .map_err(|source| SyncError::Index {
                page: url.clone(),
                source,
            })?;

        tracing::info!(
            page = %cursor,
            url = %page.url,
            records = records.len(),
            chunks = report.chunks,
            rejected = report.failures.len(),
            "page synced"
        );

        Ok(PageSync {
            records: records.len() as u64,
            content: page.content,
            from_cache: page.from_cache,
            failures: report.failures,
        })
    }

    fn start_month(&self, options: &SyncOptions, latest_html: &str) -> Result<YearMonth, SyncError> {
        match options.start {
            StartCursor::Fixed(ym) => Ok(ym),
            StartCursor::Adaptive => {
                previous_month_link(latest_html).map_err(|source| SyncError::Parse {
                    page: self.archive.latest_url.clone(),
                    source,
                })
            }
        }
    }

    pub async fn run(&self, options: &SyncOptions) -> SyncResult {
        let mut result = SyncResult {
            outcome: SyncOutcome::Done { total: 0 },
            last_cursor: Cursor::Latest,
            pages_synced: 0,
            item_failures: Vec::new(),
        };
        let mut total: u64 = 0;

        let latest = match self.sync_page(Cursor::Latest).await {
            Ok(p) => p,
            Err(e) => {
                result.outcome = SyncOutcome::Failed(e);
                return result;
            }
        };
        total += latest.records;
        result.pages_synced += 1;
        result.item_failures.extend(latest.failures);
        self.progress.report(SyncProgressEvent::PageSynced {
            cursor: Cursor::Latest,
            records: latest.records,
            total,
            from_cache: latest.from_cache,
        });

        if options.latest_only {
            result.outcome = SyncOutcome::Done { total };
            return result;
        }

        let mut month = match self.start_month(options, &latest.content) {
            Ok(ym) => ym,
            Err(e) => {
                result.outcome = SyncOutcome::Failed(e);
                return result;
            }
        };

        // Runs until the archive runs out of months.
        loop {
            let cursor = Cursor::Month(month);
            result.last_cursor = cursor;

            match self.sync_page(cursor).await {
                Ok(page) => {
                    total += page.records;
                    result.pages_synced += 1;
                    result.item_failures.extend(page.failures);
                    self.progress.report(SyncProgressEvent::PageSynced {
                        cursor,
                        records: page.records,
                        total,
                        from_cache: page.from_cache,
                    });
                }
                Err(SyncError::Fetch { ref source, .. }) if source.is_not_found() => {
                    tracing::info!(page = %cursor, "received not-found; archive boundary reached");
                    self.progress
                        .report(SyncProgressEvent::BoundaryReached { cursor });
                    break;
                }
                Err(e) => {
                    result.outcome = SyncOutcome::Failed(e);
                    return result;
                }
            }

            month = month.prev();
        }

        result.outcome = SyncOutcome::Done { total };
        result
    }
}

fn open_cache(config: &Config) -> Result<Box<dyn PageCache>> {
    if !config.cache.enabled {
        return Ok(Box::new(NoCache));
    }
    let cache = FileCache::open(&config.cache.dir).with_context(|| {
        format!(
            "Failed to open cache directory: {}",
            config.cache.dir.display()
        )
    })?;
    Ok(Box::new(cache))
}

/// Everything a run needs before the first fetch.
struct SyncSetup {
    fetcher: PageFetcher,
    parser: PageParser,
    index: Box<dyn SearchIndex>,
}

async fn prepare(config: &Config, dry_run: bool) -> Result<SyncSetup> {
    let source = HttpSource::new(&config.http)?;
    let fetcher = PageFetcher::new(Box::new(source), open_cache(config)?);
    let parser = PageParser::new(&config.parser, &config.archive.base_url)
        .context("Invalid archive.base_url")?;

    let index: Box<dyn SearchIndex> = if dry_run {
        Box::new(MemoryIndex::new())
    } else {
        open_index(config).await?
    };
    index
        .ensure(config.index.recreate_on_start)
        .await
        .with_context(|| format!("Failed to prepare {} index", index.name()))?;

    Ok(SyncSetup {
        fetcher,
        parser,
        index,
    })
}

/// CLI entry point for `qah sync`.
///
/// Exactly one status notification is sent per call, including when the
/// run cannot start.
pub async fn run_sync(
    config: &Config,
    options: SyncOptions,
    dry_run: bool,
    progress: ProgressMode,
) -> Result<()> {
    let notifier = create_notifier(&config.notify, &config.http)?;

    let SyncSetup {
        fetcher,
        parser,
        index,
    } = match prepare(config, dry_run).await {
        Ok(setup) => setup,
        Err(e) => {
            notify(notifier.as_ref(), &format!("archive sync failed: {:#}", e)).await;
            return Err(e);
        }
    };

    let reporter = progress.reporter();
    let orchestrator = CrawlOrchestrator::new(
        &config.archive,
        &fetcher,
        &parser,
        index.as_ref(),
        config.index.batch_size,
        reporter.as_ref(),
    );
    let result = orchestrator.run(&options).await;
    notify(notifier.as_ref(), &result.status_message()).await;

    match result.outcome {
        SyncOutcome::Done { total } => {
            println!("sync archive{}", if dry_run { " (dry-run)" } else { "" });
            println!("  index: {}", index.name());
            println!("  pages synced: {}", result.pages_synced);
            println!("  records upserted: {}", total);
            println!("  rejected documents: {}", result.item_failures.len());
            println!("  stopped at: {}", result.last_cursor);
            println!("ok");
            Ok(())
        }
        SyncOutcome::Failed(err) => {
            bail!("sync failed at {}: {}", result.last_cursor, err)
        }
    }
}
