//! Chunked bulk upserts.
//!
//! Records are sent to the index in order, at most `batch_size` per request,
//! one request at a time. Documents the index rejects are logged and
//! collected; a request that fails outright stops the upload.

use serde::Serialize;

use crate::error::IndexError;
use crate::index::SearchIndex;
use crate::models::{ItemFailure, Record};

/// Upper bound on records per bulk request.
pub const MAX_BATCH_SIZE: usize = 300;

#[derive(Debug, Default, Clone, Serialize)]
pub struct UpsertReport {
    pub submitted: usize,
    pub chunks: usize,
    pub failures: Vec<ItemFailure>,
}

pub struct BulkIndexer<'a> {
    index: &'a dyn SearchIndex,
    batch_size: usize,
}

impl<'a> BulkIndexer<'a> {
    pub fn new(index: &'a dyn SearchIndex, batch_size: usize) -> Self {
        Self {
            index,
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
        }
    }

    pub async fn upsert(&self, records: &[Record]) -> Result<UpsertReport, IndexError> {
        let mut report = UpsertReport::default();

        for chunk in records.chunks(self.batch_size) {
            tracing::debug!(records = chunk.len(), backend = self.index.name(), "inserting bulk");
            let failures = self.index.upsert(chunk).await?;

            for failure in &failures {
                // 429 can be retried later; anything else usually needs the
                // document or mapping fixed.
                tracing::warn!(
                    record = %failure.record_id,
                    status = ?failure.status,
                    error = %failure.error,
                    "index rejected document"
                );
            }

            report.submitted += chunk.len();
            report.chunks += 1;
            report.failures.extend(failures);
        }

        Ok(report)
    }
}
