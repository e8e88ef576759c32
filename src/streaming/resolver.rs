/*!
 * Playlist Resolver
 * =================
 *
 * Turns a candidate URL into something measurable:
 *
 *   - Known media extensions (.ts, .flv, .mp4, ...) are `Direct` without any
 *     network traffic.
 *   - `.m3u8` / `.m3u` URLs are fetched and parsed.
 *   - Anything else is sniffed: a small prefix is fetched and checked for a
 *     playlist content type or an `#EXTM3U` header. Non-playlists are `Direct`.
 *
 * Master playlists are walked by always taking the rendition with the largest
 * declared pixel area (first listed on ties). The walk carries an explicit
 * depth counter and fails once it passes `max_depth`.
 *
 * Relative URIs resolve against the final (post-redirect) URL of the
 * playlist that contains them.
 */

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, trace};

use super::KeyValue;
use super::metrics::metrics;
use super::playlist::{analyze_playlist, best_variant};
use crate::fetch::{FetchError, FetchedDocument, StreamFetcher};
use crate::utils::url::UrlUtils;

/// Bytes fetched to decide whether an extensionless URL is a playlist
pub const SNIFF_BYTES: usize = 4 * 1024;

const MEDIA_EXTENSIONS: &[&str] = &[
    ".ts", ".flv", ".mp4", ".m4v", ".mov", ".mkv", ".mp3", ".aac", ".m4s",
];

/// A media playlist reached from the candidate URL
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestResolved {
    /// Absolute segment URLs in playlist order
    pub segments: Vec<String>,
    /// 0 when no enclosing variant declared a resolution
    pub width: u32,
    pub height: u32,
    /// Time to fetch the first playlist
    pub latency: Duration,
    /// Variant playlists followed to reach the media playlist
    pub variant_hops: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedStream {
    Manifest(ManifestResolved),
    /// Not a playlist; read the endpoint itself
    Direct,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Failed to fetch playlist {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("Response from {url} is not an M3U playlist")]
    NotAPlaylist { url: String },
    #[error("Playlist {url} lists no variants or segments")]
    EmptyPlaylist { url: String },
    #[error("Variant playlists nested deeper than {max_depth} levels")]
    DepthExceeded { max_depth: usize },
    #[error("Invalid playlist entry {uri}: {message}")]
    InvalidUri { uri: String, message: String },
}

impl ResolveError {
    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch",
            Self::NotAPlaylist { .. } => "not-a-playlist",
            Self::EmptyPlaylist { .. } => "empty",
            Self::DepthExceeded { .. } => "depth-exceeded",
            Self::InvalidUri { .. } => "invalid-uri",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeuristicKind {
    Media,
    Playlist,
    Unknown,
}

fn classify_by_extension(url: &str) -> HeuristicKind {
    let path = UrlUtils::path_lowercase(url);
    if path.ends_with(".m3u8") || path.ends_with(".m3u") {
        return HeuristicKind::Playlist;
    }
    if MEDIA_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return HeuristicKind::Media;
    }
    HeuristicKind::Unknown
}

/// Resolves candidate URLs through a [`StreamFetcher`]
#[derive(Clone)]
pub struct PlaylistResolver {
    fetcher: Arc<dyn StreamFetcher>,
    max_playlist_bytes: usize,
    max_depth: usize,
}

impl PlaylistResolver {
    pub fn new(fetcher: Arc<dyn StreamFetcher>, max_playlist_bytes: usize, max_depth: usize) -> Self {
        Self {
            fetcher,
            max_playlist_bytes,
            max_depth,
        }
    }

    /// Decide whether `url` is a manifest or a direct endpoint and, for
    /// manifests, walk down to a media playlist.
    pub async fn resolve(
        &self,
        url: &str,
        fetch_timeout: Duration,
    ) -> Result<ResolvedStream, ResolveError> {
        let result = self.resolve_inner(url, fetch_timeout).await;
        match &result {
            Ok(ResolvedStream::Direct) => {
                metrics()
                    .resolve_total
                    .add(1, &[KeyValue::new("kind", "direct")]);
            }
            Ok(ResolvedStream::Manifest(m)) => {
                metrics()
                    .resolve_total
                    .add(1, &[KeyValue::new("kind", "manifest")]);
                metrics().variant_hops_total.add(m.variant_hops as u64, &[]);
            }
            Err(e) => {
                metrics()
                    .resolve_errors_total
                    .add(1, &[KeyValue::new("reason", e.kind())]);
            }
        }
        result
    }

    async fn resolve_inner(
        &self,
        url: &str,
        fetch_timeout: Duration,
    ) -> Result<ResolvedStream, ResolveError> {
        let first = match classify_by_extension(url) {
            HeuristicKind::Media => {
                trace!(url = %UrlUtils::obfuscate_credentials(url), "Media extension, reading directly");
                return Ok(ResolvedStream::Direct);
            }
            HeuristicKind::Playlist => self.fetch(url, self.max_playlist_bytes, fetch_timeout).await?,
            HeuristicKind::Unknown => {
                let sniff = self.fetch(url, SNIFF_BYTES, fetch_timeout).await?;
                if !sniff.looks_like_playlist() {
                    debug!(
                        url = %UrlUtils::obfuscate_credentials(url),
                        content_type = ?sniff.content_type,
                        "Sniffed non-playlist content, treating as direct endpoint"
                    );
                    return Ok(ResolvedStream::Direct);
                }
                if sniff.body.len() < SNIFF_BYTES {
                    sniff
                } else {
                    // The sniff may have cut the playlist short
                    let mut full = self.fetch(url, self.max_playlist_bytes, fetch_timeout).await?;
                    full.elapsed = sniff.elapsed;
                    full
                }
            }
        };

        let latency = first.elapsed;
        let mut document = first;
        let mut declared: Option<(u32, u32)> = None;
        let mut depth = 0usize;

        loop {
            if !document.looks_like_playlist() {
                return Err(ResolveError::NotAPlaylist {
                    url: UrlUtils::obfuscate_credentials(&document.final_url),
                });
            }

            let analysis = analyze_playlist(&document.body);

            if analysis.is_master {
                let Some(variant) = best_variant(&analysis.variants) else {
                    return Err(ResolveError::EmptyPlaylist {
                        url: UrlUtils::obfuscate_credentials(&document.final_url),
                    });
                };

                depth += 1;
                if depth > self.max_depth {
                    return Err(ResolveError::DepthExceeded {
                        max_depth: self.max_depth,
                    });
                }
                if variant.resolution.is_some() {
                    declared = variant.resolution;
                }

                let next = absolutize(&document.final_url, &variant.uri)?;
                debug!(
                    depth,
                    variants = analysis.variants.len(),
                    resolution = ?variant.resolution,
                    bandwidth = variant.bandwidth,
                    variant = %UrlUtils::obfuscate_credentials(&next),
                    "Following highest-resolution variant"
                );
                document = self.fetch(&next, self.max_playlist_bytes, fetch_timeout).await?;
                continue;
            }

            if analysis.segments.is_empty() {
                return Err(ResolveError::EmptyPlaylist {
                    url: UrlUtils::obfuscate_credentials(&document.final_url),
                });
            }

            let segments = analysis
                .segments
                .iter()
                .map(|s| absolutize(&document.final_url, s))
                .collect::<Result<Vec<_>, _>>()?;
            let (width, height) = declared.unwrap_or((0, 0));

            return Ok(ResolvedStream::Manifest(ManifestResolved {
                segments,
                width,
                height,
                latency,
                variant_hops: depth,
            }));
        }
    }

    async fn fetch(
        &self,
        url: &str,
        max_bytes: usize,
        timeout: Duration,
    ) -> Result<FetchedDocument, ResolveError> {
        self.fetcher
            .fetch_document(url, max_bytes, timeout)
            .await
            .map_err(|source| ResolveError::Fetch {
                url: UrlUtils::obfuscate_credentials(url),
                source,
            })
    }
}

fn absolutize(base: &str, uri: &str) -> Result<String, ResolveError> {
    UrlUtils::join(base, uri).map_err(|e| ResolveError::InvalidUri {
        uri: uri.to_string(),
        message: e.to_string(),
    })
}
