//! Local SQLite backend.
//!
//! Records live in a `records` table keyed by identity; an FTS5 table holds
//! the tag-stripped text for matching. Each batch is written in one
//! transaction, each record in its own savepoint.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use sqlx::{Connection, Row, Sqlite, SqlitePool, Transaction};
use std::path::Path;

use super::{html_to_text, SearchHit, SearchIndex, SearchRequest};
use crate::db;
use crate::error::IndexError;
use crate::migrate;
use crate::models::{ItemFailure, Record};

pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        Ok(Self { pool })
    }

    pub async fn count(&self) -> Result<i64, IndexError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn upsert_one(tx: &mut Transaction<'_, Sqlite>, record: &Record) -> sqlx::Result<()> {
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO records (id, content_html, date, indexed_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            content_html = excluded.content_html,
            date = excluded.date,
            indexed_at = excluded.indexed_at
        "#,
    )
    .bind(&record.id)
    .bind(&record.content_html)
    .bind(record.date.and_utc().timestamp())
    .bind(now)
    .execute(&mut **tx)
    .await?;

    sqlx::query("DELETE FROM records_fts WHERE id = ?")
        .bind(&record.id)
        .execute(&mut **tx)
        .await?;

    sqlx::query("INSERT INTO records_fts (id, text) VALUES (?, ?)")
        .bind(&record.id)
        .bind(html_to_text(&record.content_html))
        .execute(&mut **tx)
        .await?;

    Ok(())
}

/// FTS5 query: every word must match, the last one as a prefix.
fn fts_query(term: &str) -> String {
    let words: Vec<String> = term
        .split_whitespace()
        .map(|w| w.replace('"', "\"\""))
        .filter(|w| !w.is_empty())
        .collect();
    let last = words.len().saturating_sub(1);
    words
        .iter()
        .enumerate()
        .map(|(i, w)| {
            if i == last {
                format!("\"{}\"*", w)
            } else {
                format!("\"{}\"", w)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn to_datetime(ts: Option<i64>) -> Option<NaiveDateTime> {
    ts.and_then(|t| DateTime::from_timestamp(t, 0))
        .map(|dt| dt.naive_utc())
}

#[async_trait]
impl SearchIndex for SqliteIndex {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn ensure(&self, recreate: bool) -> Result<(), IndexError> {
        migrate::run_migrations(&self.pool, recreate)
            .await
            .map_err(|e| IndexError::Backend(e.to_string()))
    }

    async fn upsert(&self, records: &[Record]) -> Result<Vec<ItemFailure>, IndexError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexError::Transport(e.to_string()))?;

        let mut failures = Vec::new();
        for record in records {
            let mut savepoint = Connection::begin(&mut *tx)
                .await
                .map_err(|e| IndexError::Transport(e.to_string()))?;
            match upsert_one(&mut savepoint, record).await {
                Ok(()) => savepoint
                    .commit()
                    .await
                    .map_err(|e| IndexError::Transport(e.to_string()))?,
                Err(e) => {
                    savepoint
                        .rollback()
                        .await
                        .map_err(|e| IndexError::Transport(e.to_string()))?;
                    failures.push(ItemFailure {
                        record_id: record.id.clone(),
                        status: None,
                        error: e.to_string(),
                    });
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| IndexError::Transport(e.to_string()))?;
        Ok(failures)
    }

    async fn query(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, IndexError> {
        let limit = request.size as i64;
        let offset = request.from as i64;

        if request.term.trim().is_empty() {
            let rows = sqlx::query(
                "SELECT id, content_html, date FROM records ORDER BY date DESC, id LIMIT ? OFFSET ?",
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

            return Ok(rows
                .iter()
                .map(|row| SearchHit {
                    id: row.get("id"),
                    score: 0.0,
                    content_html: row.get("content_html"),
                    highlight: None,
                    date: to_datetime(row.get("date")),
                })
                .collect());
        }

        let rows = sqlx::query(
            r#"
            SELECT r.id AS id,
                   r.content_html AS content_html,
                   r.date AS date,
                   bm25(records_fts) AS bm25_score,
                   highlight(records_fts, 1, '<mark>', '</mark>') AS highlight
            FROM records_fts
            JOIN records r ON r.id = records_fts.id
            WHERE records_fts MATCH ?
            ORDER BY bm25_score
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(fts_query(&request.term))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let bm25: f64 = row.get("bm25_score");
                SearchHit {
                    id: row.get("id"),
                    // bm25() is lower-is-better
                    score: -bm25,
                    content_html: row.get("content_html"),
                    highlight: row.get("highlight"),
                    date: to_datetime(row.get("date")),
                }
            })
            .collect())
    }
}
