use anyhow::Result;
use sqlx::SqlitePool;

/// Create the SQLite index schema. With `recreate`, existing tables are
/// dropped first.
pub async fn run_migrations(pool: &SqlitePool, recreate: bool) -> Result<()> {
    if recreate {
        sqlx::query("DROP TABLE IF EXISTS records_fts")
            .execute(pool)
            .await?;
        sqlx::query("DROP TABLE IF EXISTS records")
            .execute(pool)
            .await?;
    }

    // Create records table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            id TEXT PRIMARY KEY,
            content_html TEXT NOT NULL,
            date INTEGER,
            indexed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create the FTS table only once
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='records_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE records_fts USING fts5(
                id UNINDEXED,
                text,
                tokenize = 'unicode61 remove_diacritics 2'
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_date ON records(date DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
