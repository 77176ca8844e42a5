//! In-memory [`SearchIndex`] for dry runs and tests.
//!
//! Uses a `BTreeMap` behind `std::sync::RwLock`. Matching is a
//! case-insensitive substring test over the tag-stripped text.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{html_to_text, SearchHit, SearchIndex, SearchRequest};
use crate::error::IndexError;
use crate::models::{ItemFailure, Record};

pub struct MemoryIndex {
    docs: RwLock<BTreeMap<String, Record>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> IndexError {
    IndexError::Backend("memory index lock poisoned".to_string())
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ensure(&self, recreate: bool) -> Result<(), IndexError> {
        if recreate {
            self.docs.write().map_err(poisoned)?.clear();
        }
        Ok(())
    }

    async fn upsert(&self, records: &[Record]) -> Result<Vec<ItemFailure>, IndexError> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        for r in records {
            docs.insert(r.id.clone(), r.clone());
        }
        Ok(Vec::new())
    }

    async fn query(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, IndexError> {
        let docs = self.docs.read().map_err(poisoned)?;
        let needle = request.term.trim().to_lowercase();

        let mut matches: Vec<&Record> = docs
            .values()
            .filter(|r| {
                needle.is_empty() || html_to_text(&r.content_html).to_lowercase().contains(&needle)
            })
            .collect();
        matches.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));

        Ok(matches
            .into_iter()
            .skip(request.from)
            .take(request.size)
            .map(|r| SearchHit {
                id: r.id.clone(),
                score: 1.0,
                content_html: r.content_html.clone(),
                highlight: None,
                date: Some(r.date),
            })
            .collect())
    }
}
