//! Scripted in-process fetcher
//!
//! Serves canned bodies with configurable delays, statuses and hangs. Delays
//! use the tokio clock, so tests running with a paused clock advance through
//! them instantly.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::{Instant, sleep};

use super::{FetchError, FetchedDocument, StreamFetcher, Transfer};

/// One scripted endpoint
#[derive(Debug, Clone, Default)]
pub struct ScriptedResponse {
    body: Bytes,
    content_type: Option<String>,
    delay: Duration,
    redirect_to: Option<String>,
    status: Option<u16>,
    hang: bool,
}

impl ScriptedResponse {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    /// Body of `len` zero bytes
    pub fn sized(len: usize) -> Self {
        Self::new(vec![0u8; len])
    }

    /// Respond with a non-success HTTP status
    pub fn status(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Never respond
    pub fn hang() -> Self {
        Self {
            hang: true,
            ..Default::default()
        }
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Time taken to deliver the whole body
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Report a different final URL, as after an HTTP redirect
    pub fn redirected_to(mut self, url: impl Into<String>) -> Self {
        self.redirect_to = Some(url.into());
        self
    }
}

/// `StreamFetcher` over a fixed URL → response table
#[derive(Debug, Default)]
pub struct InMemoryFetcher {
    responses: HashMap<String, ScriptedResponse>,
    requests: Mutex<HashMap<String, usize>>,
}

impl InMemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, response: ScriptedResponse) -> Self {
        self.responses.insert(url.into(), response);
        self
    }

    /// Shorthand for a playlist body served instantly
    pub fn with_playlist(self, url: impl Into<String>, body: &str) -> Self {
        self.with(
            url,
            ScriptedResponse::new(body.to_string()).content_type("application/vnd.apple.mpegurl"),
        )
    }

    /// How many times `url` was requested
    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .map(|r| r.get(url).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().map(|r| r.values().sum()).unwrap_or(0)
    }

    fn lookup(&self, url: &str) -> Result<&ScriptedResponse, FetchError> {
        if let Ok(mut requests) = self.requests.lock() {
            *requests.entry(url.to_string()).or_insert(0) += 1;
        }
        let response = self
            .responses
            .get(url)
            .ok_or(FetchError::Status { status: 404 })?;
        if let Some(status) = response.status {
            return Err(FetchError::Status { status });
        }
        Ok(response)
    }

    async fn deliver(response: &ScriptedResponse) {
        if response.hang {
            std::future::pending::<()>().await;
        }
        sleep(response.delay).await;
    }
}

#[async_trait]
impl StreamFetcher for InMemoryFetcher {
    async fn fetch_document(
        &self,
        url: &str,
        max_bytes: usize,
        limit: Duration,
    ) -> Result<FetchedDocument, FetchError> {
        let started = Instant::now();
        let response = self.lookup(url)?;
        tokio::time::timeout(limit, Self::deliver(response))
            .await
            .map_err(|_| FetchError::Timeout)?;

        let body = &response.body[..response.body.len().min(max_bytes)];
        Ok(FetchedDocument {
            final_url: response
                .redirect_to
                .clone()
                .unwrap_or_else(|| url.to_string()),
            content_type: response.content_type.clone(),
            body: String::from_utf8_lossy(body).into_owned(),
            elapsed: started.elapsed(),
        })
    }

    async fn fetch_prefix(
        &self,
        url: &str,
        max_bytes: u64,
        limit: Duration,
    ) -> Result<Transfer, FetchError> {
        let started = Instant::now();
        let response = self.lookup(url)?;
        tokio::time::timeout(limit, Self::deliver(response))
            .await
            .map_err(|_| FetchError::Timeout)?;

        let bytes = (response.body.len() as u64).min(max_bytes);
        Ok(Transfer {
            bytes,
            elapsed: started.elapsed(),
            first_byte: (bytes > 0).then(|| started.elapsed()),
        })
    }

    async fn read_for(
        &self,
        url: &str,
        duration: Duration,
        max_bytes: u64,
    ) -> Result<Transfer, FetchError> {
        let started = Instant::now();
        let response = self.lookup(url)?;
        if tokio::time::timeout(duration, Self::deliver(response))
            .await
            .is_err()
        {
            // Nothing arrived inside the read window
            return Ok(Transfer {
                bytes: 0,
                elapsed: started.elapsed(),
                first_byte: None,
            });
        }

        let bytes = (response.body.len() as u64).min(max_bytes);
        Ok(Transfer {
            bytes,
            elapsed: started.elapsed(),
            first_byte: (bytes > 0).then(|| started.elapsed()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn delays_follow_the_tokio_clock() {
        let fetcher = InMemoryFetcher::new().with(
            "http://a/seg.ts",
            ScriptedResponse::sized(1000).delay(Duration::from_millis(500)),
        );

        let transfer = fetcher
            .fetch_prefix("http://a/seg.ts", 400, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(transfer.bytes, 400);
        assert_eq!(transfer.elapsed, Duration::from_millis(500));
        assert_eq!(fetcher.request_count("http://a/seg.ts"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hang_times_out_and_unknown_urls_are_404() {
        let fetcher = InMemoryFetcher::new().with("http://a/hang", ScriptedResponse::hang());

        let err = fetcher
            .fetch_document("http://a/hang", 1024, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Timeout);

        let err = fetcher
            .fetch_document("http://a/missing", 1024, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Status { status: 404 });
    }

    #[tokio::test(start_paused = true)]
    async fn read_for_returns_empty_transfer_when_window_closes() {
        let fetcher = InMemoryFetcher::new().with("http://a/live", ScriptedResponse::hang());

        let transfer = fetcher
            .read_for("http://a/live", Duration::from_secs(3), 1024)
            .await
            .unwrap();
        assert_eq!(transfer.bytes, 0);
        assert_eq!(transfer.first_byte, None);
    }
}
