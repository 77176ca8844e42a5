//! Core data models used throughout the harvester.
//!
//! These types represent the pages, cursors, records and run outcomes that
//! flow through the fetch → parse → index pipeline.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::SyncError;
use crate::identity::identify;

/// A calendar month of the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// The month before this one, wrapping January into December.
    pub fn prev(self) -> Self {
        if self.month <= 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (y, m) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| anyhow::anyhow!("expected YYYY-MM, got '{}'", s))?;
        let year: i32 = y.parse()?;
        let month: u32 = m.parse()?;
        YearMonth::new(year, month)
            .ok_or_else(|| anyhow::anyhow!("month out of range in '{}'", s))
    }
}

/// Which archive page to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "month", rename_all = "lowercase")]
pub enum Cursor {
    /// The rolling page that is still being appended to.
    Latest,
    Month(YearMonth),
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::Latest => write!(f, "latest"),
            Cursor::Month(ym) => write!(f, "{}", ym),
        }
    }
}

/// Raw content of one fetched resource.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub cache_key: String,
    pub content: String,
    pub from_cache: bool,
}

/// One extracted archive entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub id: String,
    pub content_html: String,
    pub date: NaiveDateTime,
}

impl Record {
    /// Builds a record whose identity is derived from `content_html`.
    pub fn new(content_html: String, date: NaiveDateTime) -> Self {
        Self {
            id: identify(&content_html),
            content_html,
            date,
        }
    }
}

/// A per-document failure reported by the index for one upsert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemFailure {
    pub record_id: String,
    pub status: Option<u16>,
    pub error: String,
}

/// How a run ended.
#[derive(Debug)]
pub enum SyncOutcome {
    /// The archive boundary (or the end of a latest-only run) was reached.
    Done { total: u64 },
    Failed(SyncError),
}

/// Aggregate result of one orchestration run.
#[derive(Debug)]
pub struct SyncResult {
    pub outcome: SyncOutcome,
    pub last_cursor: Cursor,
    pub pages_synced: u32,
    pub item_failures: Vec<ItemFailure>,
}

impl SyncResult {
    pub fn is_done(&self) -> bool {
        matches!(self.outcome, SyncOutcome::Done { .. })
    }

    /// One-line status text for the notifier.
    pub fn status_message(&self) -> String {
        match &self.outcome {
            SyncOutcome::Done { total } => {
                let mut msg = format!(
                    "archive sync done: {} records from {} pages (stopped at {})",
                    total, self.pages_synced, self.last_cursor
                );
                if !self.item_failures.is_empty() {
                    msg.push_str(&format!(
                        ", {} documents rejected by the index",
                        self.item_failures.len()
                    ));
                }
                msg
            }
            SyncOutcome::Failed(err) => {
                format!("archive sync failed at {}: {}", self.last_cursor, err)
            }
        }
    }
}
