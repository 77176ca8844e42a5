//! Elasticsearch backend.
//!
//! Batches go to `POST /_bulk` as NDJSON `index` actions keyed by record id,
//! so a repeated crawl overwrites documents. The response's per-item
//! statuses become [`ItemFailure`]s; a failed request is a transport error.
//!
//! Authentication uses an API key read from the environment variable named
//! by `index.api_key_env`. When the variable is unset, requests go out
//! without an `Authorization` header.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::{json, Value};
use std::time::Duration;

use super::{SearchHit, SearchIndex, SearchRequest};
use crate::config::{HttpConfig, IndexConfig};
use crate::error::IndexError;
use crate::models::{ItemFailure, Record};

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub struct ElasticIndex {
    client: reqwest::Client,
    base_url: String,
    index: String,
    api_key: Option<String>,
    refresh: bool,
}

impl ElasticIndex {
    pub fn new(config: &IndexConfig, http: &HttpConfig) -> Result<Self, IndexError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .user_agent(http.user_agent.clone())
            .build()?;

        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            tracing::warn!(
                var = %config.api_key_env,
                "API key variable not set; sending unauthenticated requests"
            );
        }

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            index: config.name.clone(),
            api_key,
            refresh: config.refresh,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}/{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("ApiKey {}", key)),
            None => builder,
        }
    }
}

/// Index settings: HTML-aware analysis for `content_html`.
pub fn index_definition() -> Value {
    json!({
        "settings": {
            "analysis": {
                "analyzer": {
                    "html_text": {
                        "type": "custom",
                        "char_filter": ["html_strip"],
                        "tokenizer": "standard",
                        "filter": ["lowercase"]
                    }
                }
            }
        },
        "mappings": {
            "properties": {
                "content_html": { "type": "text", "analyzer": "html_text" },
                "date": { "type": "date", "format": "strict_date_optional_time" }
            }
        }
    })
}

/// NDJSON body for one `_bulk` request.
pub fn bulk_body(index: &str, records: &[Record]) -> String {
    let mut body = String::new();
    for r in records {
        let action = json!({ "index": { "_index": index, "_id": r.id } });
        let doc = json!({
            "content_html": r.content_html,
            "date": r.date.format(DATE_FORMAT).to_string(),
        });
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&doc.to_string());
        body.push('\n');
    }
    body
}

/// Collects per-item errors from a `_bulk` response.
///
/// Items are reported in request order, so a missing `_id` falls back to
/// the record at the same position.
pub fn bulk_failures(response: &Value, records: &[Record]) -> Vec<ItemFailure> {
    if !response.get("errors").and_then(Value::as_bool).unwrap_or(false) {
        return Vec::new();
    }
    let Some(items) = response.get("items").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| {
            // Each item is `{ "<operation>": { ... } }`.
            let result = item.as_object()?.values().next()?;
            let error = result.get("error")?;
            let record_id = result
                .get("_id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| records.get(i).map(|r| r.id.clone()))
                .unwrap_or_default();
            Some(ItemFailure {
                record_id,
                status: result
                    .get("status")
                    .and_then(Value::as_u64)
                    .map(|s| s as u16),
                error: error.to_string(),
            })
        })
        .collect()
}

/// Query body: match, phrase and phrase-prefix clauses, highlighted with
/// `<mark>`. An empty term lists the newest documents.
pub fn search_body(request: &SearchRequest) -> Value {
    let mut body = json!({
        "size": request.size,
        "from": request.from,
        "query": { "match_all": {} },
        "highlight": {
            "pre_tags": ["<mark>"],
            "post_tags": ["</mark>"],
            "fields": { "content_html": {} },
            "number_of_fragments": 0
        }
    });

    let term = request.term.trim();
    if term.is_empty() {
        body["sort"] = json!([{ "date": "desc" }]);
    } else {
        body["query"] = json!({
            "bool": {
                "should": [
                    { "match": { "content_html": { "query": term, "fuzziness": 0, "boost": 1 } } },
                    { "match_phrase": { "content_html": { "query": term, "boost": 10 } } },
                    { "match_phrase_prefix": { "content_html": { "query": term, "boost": 5 } } }
                ],
                "minimum_should_match": 1
            }
        });
    }
    body
}

fn parse_hit(hit: &Value) -> Option<SearchHit> {
    let source = hit.get("_source")?;
    Some(SearchHit {
        id: hit.get("_id")?.as_str()?.to_string(),
        score: hit.get("_score").and_then(Value::as_f64).unwrap_or(0.0),
        content_html: source
            .get("content_html")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        highlight: hit
            .pointer("/highlight/content_html/0")
            .and_then(Value::as_str)
            .map(str::to_string),
        date: source
            .get("date")
            .and_then(Value::as_str)
            .and_then(|d| NaiveDateTime::parse_from_str(d, DATE_FORMAT).ok()),
    })
}

async fn error_text(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    format!("HTTP {}: {}", status, body)
}

#[async_trait]
impl SearchIndex for ElasticIndex {
    fn name(&self) -> &str {
        "elasticsearch"
    }

    async fn ensure(&self, recreate: bool) -> Result<(), IndexError> {
        if recreate {
            let resp = self
                .request(reqwest::Method::DELETE, &self.index)
                .send()
                .await?;
            if !resp.status().is_success() && resp.status().as_u16() != 404 {
                return Err(IndexError::Backend(error_text(resp).await));
            }
            tracing::info!(index = %self.index, "deleted index");
        }

        let head = self
            .request(reqwest::Method::HEAD, &self.index)
            .send()
            .await?;
        if head.status().is_success() {
            return Ok(());
        }

        let resp = self
            .request(reqwest::Method::PUT, &self.index)
            .json(&index_definition())
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(IndexError::Backend(error_text(resp).await));
        }
        tracing::info!(index = %self.index, "created index");
        Ok(())
    }

    async fn upsert(&self, records: &[Record]) -> Result<Vec<ItemFailure>, IndexError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let path = format!("_bulk?refresh={}", self.refresh);
        let resp = self
            .request(reqwest::Method::POST, &path)
            .header("Content-Type", "application/x-ndjson")
            .body(bulk_body(&self.index, records))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(IndexError::Transport(error_text(resp).await));
        }

        let json: Value = resp.json().await?;
        Ok(bulk_failures(&json, records))
    }

    async fn query(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, IndexError> {
        let resp = self
            .request(reqwest::Method::POST, &format!("{}/_search", self.index))
            .json(&search_body(request))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(IndexError::Backend(error_text(resp).await));
        }

        let json: Value = resp.json().await?;
        let hits: Vec<SearchHit> = json
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .map(|hits| hits.iter().filter_map(parse_hit).collect())
            .unwrap_or_default();
        Ok(hits)
    }
}
