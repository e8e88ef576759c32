//! One complete probing pass
//!
//! naming → dedup → dispatch (with optional cache) → select

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::config::{CacheBackend, CacheConfig, Config};
use crate::errors::{AppError, AppResult};
use crate::fetch::{HttpStreamFetcher, StreamFetcher};
use crate::models::{CandidateSet, ProbeResult, SelectedList};
use crate::naming::ChannelNamer;
use crate::services::dispatcher::{DispatchProgress, DispatchSettings, Dispatcher};
use crate::services::ffprobe::FfprobeInspector;
use crate::services::probe_cache::{JsonFileProbeCache, MemoryProbeCache, ProbeCache};
use crate::services::prober::{QualityThresholds, StreamProbe};
use crate::services::selector::select_with_config;
use crate::sources::RawEntry;

/// Counters describing one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchStats {
    /// Raw entries read from sources
    pub entries: usize,
    /// Entries dropped by naming (no category, empty fields)
    pub unassigned: usize,
    /// Unique candidates dispatched
    pub candidates: usize,
    pub duplicates_removed: usize,
    pub probed: usize,
    pub cached: usize,
    pub passed: usize,
    pub timed_out: usize,
    /// Overall deadline cut the run short
    pub partial: bool,
    pub channels_selected: usize,
    pub urls_selected: usize,
    #[serde(with = "crate::config::duration_serde::duration")]
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub selected: SelectedList,
    /// Every result in completion order
    pub results: Vec<ProbeResult>,
    pub stats: BatchStats,
}

pub struct BatchRunner {
    config: Arc<Config>,
    namer: ChannelNamer,
    dispatcher: Dispatcher,
    cache: Option<Arc<dyn ProbeCache>>,
}

impl BatchRunner {
    /// Build the production pipeline: HTTP fetcher, optional FFprobe and the
    /// configured cache backend.
    pub async fn from_config(config: Config) -> AppResult<Self> {
        let fetcher: Arc<dyn StreamFetcher> = Arc::new(HttpStreamFetcher::new(&config.http)?);
        let cache = open_cache(&config.cache).await;
        Ok(Self::with_fetcher(config, fetcher, cache))
    }

    /// Build a pipeline over any fetcher and cache
    pub fn with_fetcher(
        config: Config,
        fetcher: Arc<dyn StreamFetcher>,
        cache: Option<Arc<dyn ProbeCache>>,
    ) -> Self {
        let config = Arc::new(config);
        let probe_config = Arc::new(config.probe.clone());

        let mut probe = StreamProbe::new(fetcher, probe_config);
        if let Some(command) = config.probe.ffprobe_command.as_deref() {
            info!(command, "FFprobe resolution lookup enabled");
            probe = probe.with_inspector(Arc::new(FfprobeInspector::new(
                command,
                config.probe.ffprobe_timeout,
            )));
        }

        let mut dispatcher = Dispatcher::new(
            Arc::new(probe),
            DispatchSettings::from_config(&config.probe, &config.operational),
        )
        .with_thresholds(QualityThresholds::from(&config.probe));
        if let Some(cache) = &cache {
            dispatcher = dispatcher.with_cache(cache.clone());
        }

        Self {
            namer: ChannelNamer::new(&config.naming),
            config,
            dispatcher,
            cache,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn progress(&self) -> watch::Receiver<DispatchProgress> {
        self.dispatcher.subscribe()
    }

    /// Name and deduplicate raw entries. Returns the set and how many
    /// entries could not be assigned a channel.
    pub fn candidates(&self, entries: &[RawEntry]) -> (CandidateSet, usize) {
        let mut unassigned = 0;
        let candidates = entries
            .iter()
            .filter_map(|entry| {
                let candidate = self.namer.assign(entry);
                if candidate.is_none() {
                    unassigned += 1;
                }
                candidate
            })
            .collect();
        (candidates, unassigned)
    }

    /// Full pass from raw source entries
    pub async fn run(&self, entries: Vec<RawEntry>) -> BatchReport {
        let (candidates, unassigned) = self.candidates(&entries);
        info!(
            entries = entries.len(),
            unassigned,
            candidates = candidates.len(),
            duplicates_removed = candidates.duplicates_removed(),
            "Candidates prepared"
        );

        let mut report = self.run_candidates(candidates).await;
        report.stats.entries = entries.len();
        report.stats.unassigned = unassigned;
        report
    }

    /// [`run`](Self::run), abandoned as soon as `shutdown` completes.
    ///
    /// An interrupted run yields [`AppError::Interrupted`] and no report.
    pub async fn run_until<F>(&self, entries: Vec<RawEntry>, shutdown: F) -> AppResult<BatchReport>
    where
        F: Future,
    {
        tokio::select! {
            report = self.run(entries) => Ok(report),
            _ = shutdown => {
                warn!("Shutdown requested, abandoning run");
                Err(AppError::Interrupted)
            }
        }
    }

    /// Pass over an already named candidate set
    pub async fn run_candidates(&self, candidates: CandidateSet) -> BatchReport {
        let run_id = Uuid::new_v4();
        self.run_batch(run_id, candidates)
            .instrument(info_span!("batch", %run_id))
            .await
    }

    async fn run_batch(&self, run_id: Uuid, candidates: CandidateSet) -> BatchReport {
        let mut stats = BatchStats {
            entries: candidates.len() + candidates.duplicates_removed(),
            candidates: candidates.len(),
            duplicates_removed: candidates.duplicates_removed(),
            ..Default::default()
        };

        let outcome = self.dispatcher.run_all(candidates).await;
        let selected = select_with_config(&outcome.results, &self.config.selection);

        if let Some(cache) = &self.cache
            && let Err(e) = cache.flush().await
        {
            warn!(error = %e, "CacheUnavailable: failed to persist probe cache");
        }

        stats.probed = outcome.probed;
        stats.cached = outcome.cached;
        stats.passed = outcome.results.iter().filter(|r| r.passed).count();
        stats.timed_out = outcome.timed_out;
        stats.partial = outcome.partial;
        stats.channels_selected = selected.channel_count();
        stats.urls_selected = selected.url_count();
        stats.elapsed = outcome.elapsed;

        info!(
            candidates = stats.candidates,
            passed = stats.passed,
            timed_out = stats.timed_out,
            channels = stats.channels_selected,
            urls = stats.urls_selected,
            partial = stats.partial,
            "Batch complete"
        );

        BatchReport {
            run_id,
            selected,
            results: outcome.results,
            stats,
        }
    }
}

/// Open the configured cache backend. Failures disable caching for the run.
pub async fn open_cache(config: &CacheConfig) -> Option<Arc<dyn ProbeCache>> {
    match config.backend {
        CacheBackend::None => None,
        CacheBackend::Memory => Some(Arc::new(MemoryProbeCache::new(config.capacity, config.ttl))),
        CacheBackend::File => match JsonFileProbeCache::open(&config.path, config.ttl).await {
            Ok(cache) => Some(Arc::new(cache)),
            Err(e) => {
                warn!(
                    path = %config.path.display(),
                    error = %e,
                    "CacheUnavailable: probe cache could not be opened, continuing without it"
                );
                None
            }
        },
    }
}
