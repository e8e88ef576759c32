use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response, header::CONTENT_TYPE};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, trace};

use super::{FetchError, FetchedDocument, StreamFetcher, Transfer};
use crate::config::HttpConfig;
use crate::utils::url::UrlUtils;

/// `StreamFetcher` backed by a shared reqwest client.
///
/// The client only carries a connect timeout; every read applies its own
/// deadline so cancellation from the dispatcher drops the request cleanly.
#[derive(Clone)]
pub struct HttpStreamFetcher {
    client: Client,
}

impl HttpStreamFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;
        Ok(Self { client })
    }

    async fn send(&self, url: &str) -> Result<Response, FetchError> {
        if !UrlUtils::is_http(url) {
            return Err(match UrlUtils::scheme(url) {
                Some(scheme) => FetchError::UnsupportedScheme(scheme),
                None => FetchError::InvalidUrl(UrlUtils::obfuscate_credentials(url)),
            });
        }

        let response = self.client.get(url).send().await.map_err(map_reqwest)?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}

fn map_reqwest(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::Timeout;
    }
    if err.is_builder() {
        return FetchError::InvalidUrl(UrlUtils::obfuscate_credentials(&err.to_string()));
    }
    // Error text may embed the request URL
    FetchError::Transport(UrlUtils::obfuscate_credentials(&err.to_string()))
}

#[async_trait]
impl StreamFetcher for HttpStreamFetcher {
    async fn fetch_document(
        &self,
        url: &str,
        max_bytes: usize,
        limit: Duration,
    ) -> Result<FetchedDocument, FetchError> {
        let started = Instant::now();
        let read = async {
            let response = self.send(url).await?;
            let final_url = response.url().to_string();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let mut body = response.bytes_stream();
            let mut collected: Vec<u8> = Vec::with_capacity(8192);
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| FetchError::Body(e.to_string()))?;
                if collected.len() + chunk.len() > max_bytes {
                    collected.extend_from_slice(&chunk[..(max_bytes - collected.len())]);
                    debug!(
                        url = %UrlUtils::obfuscate_credentials(url),
                        limit = max_bytes,
                        "Document truncated at size limit"
                    );
                    break;
                }
                collected.extend_from_slice(&chunk);
            }

            Ok::<_, FetchError>(FetchedDocument {
                final_url,
                content_type,
                body: String::from_utf8_lossy(&collected).into_owned(),
                elapsed: started.elapsed(),
            })
        };

        timeout(limit, read).await.map_err(|_| FetchError::Timeout)?
    }

    async fn fetch_prefix(
        &self,
        url: &str,
        max_bytes: u64,
        limit: Duration,
    ) -> Result<Transfer, FetchError> {
        let started = Instant::now();
        let read = async {
            let response = self.send(url).await?;
            let mut body = response.bytes_stream();
            let mut transfer = Transfer::default();

            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| FetchError::Body(e.to_string()))?;
                if transfer.first_byte.is_none() && !chunk.is_empty() {
                    transfer.first_byte = Some(started.elapsed());
                }
                transfer.bytes = (transfer.bytes + chunk.len() as u64).min(max_bytes);
                if transfer.bytes >= max_bytes {
                    break;
                }
            }

            transfer.elapsed = started.elapsed();
            trace!(
                url = %UrlUtils::obfuscate_credentials(url),
                bytes = transfer.bytes,
                elapsed_ms = transfer.elapsed.as_millis() as u64,
                "Prefix read complete"
            );
            Ok::<_, FetchError>(transfer)
        };

        timeout(limit, read).await.map_err(|_| FetchError::Timeout)?
    }

    async fn read_for(
        &self,
        url: &str,
        duration: Duration,
        max_bytes: u64,
    ) -> Result<Transfer, FetchError> {
        let started = Instant::now();
        let deadline = started + duration;

        let response = timeout_at(deadline, self.send(url))
            .await
            .map_err(|_| FetchError::Timeout)??;
        let mut body = response.bytes_stream();
        let mut transfer = Transfer::default();

        // Stop at the deadline; bytes read so far still count
        while let Ok(Some(chunk)) = timeout_at(deadline, body.next()).await {
            let chunk = chunk.map_err(|e| FetchError::Body(e.to_string()))?;
            if transfer.first_byte.is_none() && !chunk.is_empty() {
                transfer.first_byte = Some(started.elapsed());
            }
            transfer.bytes = (transfer.bytes + chunk.len() as u64).min(max_bytes);
            transfer.elapsed = started.elapsed();
            if transfer.bytes >= max_bytes {
                break;
            }
        }

        if transfer.bytes == 0 {
            transfer.elapsed = started.elapsed();
        }
        debug!(
            url = %UrlUtils::obfuscate_credentials(url),
            bytes = transfer.bytes,
            elapsed_ms = transfer.elapsed.as_millis() as u64,
            "Direct read complete"
        );
        Ok(transfer)
    }
}
