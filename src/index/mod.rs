//! Search index collaborators.
//!
//! The [`SearchIndex`] trait is the boundary between the harvester and the
//! full-text engine that stores and ranks records. Three backends exist:
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`elastic::ElasticIndex`] | Elasticsearch `_bulk` / `_search` over HTTP |
//! | [`sqlite::SqliteIndex`] | Local SQLite file with an FTS5 table |
//! | [`memory::MemoryIndex`] | In-process map for `--dry-run` and tests |

pub mod elastic;
pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::config::Config;
use crate::error::IndexError;
use crate::models::{ItemFailure, Record};

/// A user query against the index.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub term: String,
    pub size: usize,
    pub from: usize,
}

/// One ranked result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    pub content_html: String,
    /// Matched text wrapped in `<mark>` tags, when the backend highlights.
    pub highlight: Option<String>,
    pub date: Option<NaiveDateTime>,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Backend name for logs and summaries.
    fn name(&self) -> &str;

    /// Create the schema if missing; drop it first when `recreate` is set.
    async fn ensure(&self, recreate: bool) -> Result<(), IndexError>;

    /// Upsert one batch keyed by record id.
    ///
    /// Returns the documents the index rejected. An `Err` means the whole
    /// request failed.
    async fn upsert(&self, records: &[Record]) -> Result<Vec<ItemFailure>, IndexError>;

    async fn query(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, IndexError>;
}

/// Open the backend named by `index.backend`.
pub async fn open_index(config: &Config) -> Result<Box<dyn SearchIndex>> {
    let backend: Box<dyn SearchIndex> = match config.index.backend.as_str() {
        "elasticsearch" => Box::new(elastic::ElasticIndex::new(&config.index, &config.http)?),
        "sqlite" => Box::new(sqlite::SqliteIndex::open(&config.index.path).await?),
        "memory" => Box::new(memory::MemoryIndex::new()),
        other => anyhow::bail!("Unknown index backend: '{}'", other),
    };
    Ok(backend)
}

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static WS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Plain text for local full-text matching: tags become spaces, common
/// entities are decoded, whitespace is collapsed.
pub fn html_to_text(html: &str) -> String {
    let text = TAG.replace_all(html, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&#8199;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    WS.replace_all(text.trim(), " ").into_owned()
}
