//! Network read capability used by every probe stage
//!
//! The resolver, sampler and probe only ever talk to a [`StreamFetcher`].
//! [`http::HttpStreamFetcher`] is the production implementation and
//! [`memory::InMemoryFetcher`] serves scripted responses for tests.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod http;
pub mod memory;

pub use http::HttpStreamFetcher;
pub use memory::{InMemoryFetcher, ScriptedResponse};

/// Errors raised by a single network read
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Upstream returned HTTP {status}")]
    Status { status: u16 },
    #[error("Request timed out")]
    Timeout,
    #[error("HTTP request failed: {0}")]
    Transport(String),
    #[error("Failed reading response body: {0}")]
    Body(String),
}

/// A small text document such as a playlist
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// URL after redirects; relative entries resolve against this
    pub final_url: String,
    pub content_type: Option<String>,
    /// Body decoded lossily, truncated at the caller's byte cap
    pub body: String,
    /// Time until the body was fully read
    pub elapsed: Duration,
}

impl FetchedDocument {
    /// Whether the document is an M3U playlist by header or by content.
    pub fn looks_like_playlist(&self) -> bool {
        let by_type = self.content_type.as_deref().is_some_and(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.contains("mpegurl") || ct.contains("x-mpegurl")
        });
        by_type || self.body.trim_start_matches('\u{feff}').trim_start().starts_with("#EXTM3U")
    }
}

/// Bytes moved by a bounded binary read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transfer {
    pub bytes: u64,
    /// Wall-clock time from request start to the last byte counted
    pub elapsed: Duration,
    /// Time until the first body byte arrived, if any did
    pub first_byte: Option<Duration>,
}

/// Generic fetch capability the probe stages depend on
#[async_trait]
pub trait StreamFetcher: Send + Sync {
    /// Fetch a document, reading at most `max_bytes` of its body.
    async fn fetch_document(
        &self,
        url: &str,
        max_bytes: usize,
        timeout: Duration,
    ) -> Result<FetchedDocument, FetchError>;

    /// Download up to `max_bytes` of a resource. Completes early when the
    /// body ends. The whole read is bounded by `timeout`.
    async fn fetch_prefix(
        &self,
        url: &str,
        max_bytes: u64,
        timeout: Duration,
    ) -> Result<Transfer, FetchError>;

    /// Read a continuous stream for `duration` or until `max_bytes`
    /// arrive, whichever comes first. A stream that ends earlier is not an
    /// error.
    async fn read_for(
        &self,
        url: &str,
        duration: Duration,
        max_bytes: u64,
    ) -> Result<Transfer, FetchError>;
}
