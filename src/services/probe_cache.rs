//! Probe result cache
//!
//! Keyed by URL. A fresh hit lets the dispatcher skip probing an endpoint it
//! measured recently; the cached measurement is re-attributed to whichever
//! candidate asked for it. Timeout results are never stored.
//!
//! Callers treat every [`CacheError`] as a miss.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::models::{FailureReason, ProbeResult};

const CACHE_FILE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Cache file {path} has unsupported version {version}")]
    UnsupportedVersion { path: String, version: u32 },
    #[error("Cache lock poisoned")]
    Poisoned,
    #[error("Cache persist failed: {0}")]
    Persist(String),
}

/// Storage for recent probe measurements
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProbeCache: Send + Sync {
    /// Fresh result for `url`, if any
    async fn get(&self, url: &str) -> Result<Option<ProbeResult>, CacheError>;

    async fn put(&self, url: &str, result: &ProbeResult) -> Result<(), CacheError>;

    /// Write pending entries to durable storage, if the backend has any
    async fn flush(&self) -> Result<(), CacheError>;
}

/// Whether a result is worth remembering
pub fn is_cacheable(result: &ProbeResult) -> bool {
    result.failure_reason != Some(FailureReason::Timeout)
}

/// Bounded in-process cache; entries expire after `ttl`.
pub struct MemoryProbeCache {
    entries: Mutex<LruCache<String, (Instant, ProbeResult)>>,
    ttl: Duration,
}

impl MemoryProbeCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ProbeCache for MemoryProbeCache {
    async fn get(&self, url: &str) -> Result<Option<ProbeResult>, CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        let fresh = match entries.get(url) {
            Some((stored_at, result)) if stored_at.elapsed() < self.ttl => Some(result.clone()),
            Some(_) => None,
            None => return Ok(None),
        };
        if fresh.is_none() {
            entries.pop(url);
        }
        Ok(fresh)
    }

    async fn put(&self, url: &str, result: &ProbeResult) -> Result<(), CacheError> {
        if !is_cacheable(result) {
            return Ok(());
        }
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.put(url.to_string(), (Instant::now(), result.clone()));
        Ok(())
    }

    async fn flush(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedEntry {
    probed_at: DateTime<Utc>,
    result: ProbeResult,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    #[serde(default)]
    entries: HashMap<String, CachedEntry>,
}

/// JSON file cache that survives between runs.
///
/// Entries are loaded once at open; `flush` rewrites the whole file
/// atomically through a temporary file in the same directory.
pub struct JsonFileProbeCache {
    path: PathBuf,
    ttl: chrono::Duration,
    entries: Mutex<HashMap<String, CachedEntry>>,
}

impl JsonFileProbeCache {
    /// Open or create the cache at `path`. Expired entries are dropped on load.
    pub async fn open(path: impl Into<PathBuf>, ttl: Duration) -> Result<Self, CacheError> {
        let path = path.into();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);

        let entries = match tokio::fs::read(&path).await {
            Ok(raw) => {
                let file: CacheFile = serde_json::from_slice(&raw)?;
                if file.version != CACHE_FILE_VERSION {
                    return Err(CacheError::UnsupportedVersion {
                        path: path.display().to_string(),
                        version: file.version,
                    });
                }
                let now = Utc::now();
                let total = file.entries.len();
                let fresh: HashMap<_, _> = file
                    .entries
                    .into_iter()
                    .filter(|(_, entry)| now - entry.probed_at < ttl)
                    .collect();
                info!(
                    path = %path.display(),
                    loaded = fresh.len(),
                    expired = total - fresh.len(),
                    "Loaded probe cache"
                );
                fresh
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No probe cache file yet");
                HashMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            ttl,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), CacheError> {
        use std::io::Write;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)
            .map_err(|e| CacheError::Persist(e.error.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ProbeCache for JsonFileProbeCache {
    async fn get(&self, url: &str) -> Result<Option<ProbeResult>, CacheError> {
        let entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(entries
            .get(url)
            .filter(|entry| Utc::now() - entry.probed_at < self.ttl)
            .map(|entry| entry.result.clone()))
    }

    async fn put(&self, url: &str, result: &ProbeResult) -> Result<(), CacheError> {
        if !is_cacheable(result) {
            return Ok(());
        }
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.insert(
            url.to_string(),
            CachedEntry {
                probed_at: Utc::now(),
                result: result.clone(),
            },
        );
        Ok(())
    }

    async fn flush(&self) -> Result<(), CacheError> {
        let contents = {
            let entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
            let file = CacheFile {
                version: CACHE_FILE_VERSION,
                entries: entries.clone(),
            };
            serde_json::to_vec_pretty(&file)?
        };

        let path = self.path.clone();
        let count = contents.len();
        tokio::task::spawn_blocking(move || Self::write_atomically(&path, &contents))
            .await
            .map_err(|e| CacheError::Persist(e.to_string()))??;

        debug!(path = %self.path.display(), bytes = count, "Probe cache flushed");
        Ok(())
    }
}
