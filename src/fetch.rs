//! Page retrieval with a read-through cache.
//!
//! [`PageFetcher`] combines a [`PageSource`] (the network) with a
//! [`PageCache`]. Monthly pages are immutable once published and go through
//! the cache; the latest page is always fetched live.

use async_trait::async_trait;
use std::time::Duration;

use crate::cache::{cache_key, PageCache};
use crate::config::HttpConfig;
use crate::error::FetchError;
use crate::models::Page;

/// Something that can retrieve the body of a URL.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn get(&self, url: &str) -> Result<String, FetchError>;
}

/// `reqwest`-backed source for the live archive.
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(config: &HttpConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Other(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageSource for HttpSource {
    async fn get(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status.as_u16(), url));
        }
        Ok(response.text().await?)
    }
}

/// Whether a fetch may be served from, and stored into, the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    ReadThrough,
    /// Always fetch live and leave the cache untouched.
    Bypass,
}

pub struct PageFetcher {
    source: Box<dyn PageSource>,
    cache: Box<dyn PageCache>,
}

impl PageFetcher {
    pub fn new(source: Box<dyn PageSource>, cache: Box<dyn PageCache>) -> Self {
        Self { source, cache }
    }

    pub async fn fetch(&self, url: &str, mode: CacheMode) -> Result<Page, FetchError> {
        let key = cache_key(url);

        if mode == CacheMode::ReadThrough {
            match self.cache.get(&key) {
                Ok(Some(content)) => {
                    tracing::debug!(url, "using cached version");
                    return Ok(Page {
                        url: url.to_string(),
                        cache_key: key,
                        content,
                        from_cache: true,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    return Err(FetchError::Other(format!(
                        "reading cache entry {}: {}",
                        key, e
                    )))
                }
            }
        }

        tracing::info!(url, "downloading");
        let content = self.source.get(url).await?;

        if mode == CacheMode::ReadThrough {
            self.cache.put(&key, &content).map_err(|e| {
                FetchError::Other(format!("writing cache entry {}: {}", key, e))
            })?;
        }

        Ok(Page {
            url: url.to_string(),
            cache_key: key,
            content,
            from_cache: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{FileCache, NoCache};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct CountingSource {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PageSource for CountingSource {
        async fn get(&self, url: &str) -> Result<String, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{} #{}", url, n))
        }
    }

    fn fetcher(calls: &Arc<AtomicUsize>, tmp: &TempDir) -> PageFetcher {
        PageFetcher::new(
            Box::new(CountingSource {
                calls: calls.clone(),
            }),
            Box::new(FileCache::open(tmp.path()).unwrap()),
        )
    }

    #[tokio::test]
    async fn second_fetch_served_from_cache() {
        let tmp = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let f = fetcher(&calls, &tmp);

        let first = f.fetch("https://x/2020-01", CacheMode::ReadThrough).await.unwrap();
        let second = f.fetch("https://x/2020-01", CacheMode::ReadThrough).await.unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.content, second.content);
        assert_eq!(first.cache_key, second.cache_key);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_survives_a_new_fetcher() {
        let tmp = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        fetcher(&calls, &tmp)
            .fetch("https://x/2020-02", CacheMode::ReadThrough)
            .await
            .unwrap();

        let page = fetcher(&calls, &tmp)
            .fetch("https://x/2020-02", CacheMode::ReadThrough)
            .await
            .unwrap();
        assert!(page.from_cache);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bypass_never_reads_or_writes_cache() {
        let tmp = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let f = fetcher(&calls, &tmp);

        let a = f.fetch("https://x/latest", CacheMode::Bypass).await.unwrap();
        let b = f.fetch("https://x/latest", CacheMode::Bypass).await.unwrap();
        assert!(!a.from_cache && !b.from_cache);
        assert_ne!(a.content, b.content);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn http_source_maps_status_codes() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("GET", "/ok.html")
            .with_status(200)
            .with_body("<html>ok</html>")
            .create_async()
            .await;
        let missing = server
            .mock("GET", "/missing.html")
            .with_status(404)
            .create_async()
            .await;
        let busy = server
            .mock("GET", "/busy.html")
            .with_status(503)
            .create_async()
            .await;

        let f = PageFetcher::new(
            Box::new(HttpSource::new(&HttpConfig::default()).unwrap()),
            Box::new(NoCache),
        );

        let page = f
            .fetch(&format!("{}/ok.html", server.url()), CacheMode::ReadThrough)
            .await
            .unwrap();
        assert_eq!(page.content, "<html>ok</html>");

        let err = f
            .fetch(&format!("{}/missing.html", server.url()), CacheMode::ReadThrough)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = f
            .fetch(&format!("{}/busy.html", server.url()), CacheMode::ReadThrough)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transient(_)));

        ok.assert_async().await;
        missing.assert_async().await;
        busy.assert_async().await;
    }
}
