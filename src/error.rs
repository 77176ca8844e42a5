//! Error taxonomy for the harvest pipeline.
//!
//! `FetchError::NotFound` is the only variant the orchestrator treats as a
//! control signal (the archive boundary). Everything wrapped in a
//! [`SyncError`] ends the run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Timeouts, connection resets, HTTP 429 and 5xx.
    #[error("transient fetch failure: {0}")]
    Transient(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("fetch failed: {0}")]
    Other(String),
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound(_))
    }

    /// Classifies a non-success HTTP status.
    pub fn from_status(status: u16, url: &str) -> Self {
        match status {
            404 => FetchError::NotFound(url.to_string()),
            429 | 500..=599 => FetchError::Transient(format!("HTTP {} for {}", status, url)),
            _ => FetchError::Other(format!("HTTP {} for {}", status, url)),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            FetchError::Transient(err.to_string())
        } else if let Some(status) = err.status() {
            let url = err.url().map(|u| u.as_str()).unwrap_or_default();
            FetchError::from_status(status.as_u16(), url)
        } else {
            FetchError::Other(err.to_string())
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no end-of-content marker found; page cannot be split safely")]
    BoundaryNotFound,

    #[error("unparsable date in fragment: {excerpt}")]
    UnparsableDate { excerpt: String },

    #[error("no 'previous' navigation link found on the latest page")]
    PreviousLinkNotFound,
}

#[derive(Debug, Error)]
pub enum IndexError {
    /// The whole request failed; nothing in the chunk is known to be stored.
    #[error("index transport failure: {0}")]
    Transport(String),

    #[error("index backend error: {0}")]
    Backend(String),
}

impl From<reqwest::Error> for IndexError {
    fn from(err: reqwest::Error) -> Self {
        IndexError::Transport(err.to_string())
    }
}

impl From<sqlx::Error> for IndexError {
    fn from(err: sqlx::Error) -> Self {
        IndexError::Backend(err.to_string())
    }
}

/// A fatal run error, tagged with the page it happened on.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("fetching {page}: {source}")]
    Fetch {
        page: String,
        #[source]
        source: FetchError,
    },

    #[error("parsing {page}: {source}")]
    Parse {
        page: String,
        #[source]
        source: ParseError,
    },

    #[error("indexing {page}: {source}")]
    Index {
        page: String,
        #[source]
        source: IndexError,
    },
}
