//! Run status notification.
//!
//! One message per run, success or failure. Delivery problems are logged
//! and never change the run's outcome.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::{HttpConfig, NotifyConfig};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

/// Used when no notification target is configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _text: &str) -> Result<()> {
        Ok(())
    }
}

/// Posts `{"text": ...}` to a webhook URL (Slack/Mattermost/Discord-style).
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str, http: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .user_agent(http.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;
        if !resp.status().is_success() {
            bail!("webhook returned HTTP {}", resp.status());
        }
        Ok(())
    }
}

pub fn create_notifier(config: &NotifyConfig, http: &HttpConfig) -> Result<Box<dyn Notifier>> {
    match config.webhook_url.as_deref() {
        Some(url) if !url.trim().is_empty() => Ok(Box::new(WebhookNotifier::new(url, http)?)),
        _ => Ok(Box::new(NoopNotifier)),
    }
}

/// Send and swallow errors.
pub async fn notify(notifier: &dyn Notifier, text: &str) {
    if let Err(e) = notifier.send(text).await {
        tracing::warn!(error = %e, "status notification failed");
    }
}
