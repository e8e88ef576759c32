//! Bounded-concurrency probe dispatch
//!
//! Every candidate gets exactly one result: a fresh measurement, a cache hit
//! or a synthetic timeout. The only exception is the overall deadline, which
//! cancels whatever is still in flight and returns what has completed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Semaphore, watch};
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, error, info, warn};

use crate::config::{OperationalConfig, ProbeConfig};
use crate::models::{Candidate, CandidateSet, FailureReason, ProbeResult};
use crate::observability::metrics;
use crate::services::probe_cache::{ProbeCache, is_cacheable};
use crate::services::prober::{QualityThresholds, StreamProbe};
use crate::utils::url::UrlUtils;

/// Anything that can turn a candidate into a result
#[async_trait]
pub trait CandidateProber: Send + Sync + 'static {
    async fn probe(&self, candidate: Candidate) -> ProbeResult;
}

#[async_trait]
impl CandidateProber for StreamProbe {
    async fn probe(&self, candidate: Candidate) -> ProbeResult {
        StreamProbe::probe(self, candidate).await
    }
}

/// Dispatch limits, fixed for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    pub concurrency: usize,
    pub per_probe_timeout: Duration,
    pub overall_timeout: Duration,
    /// Emit a progress log line every N completions (0 disables)
    pub progress_log_interval: usize,
}

impl DispatchSettings {
    pub fn from_config(probe: &ProbeConfig, operational: &OperationalConfig) -> Self {
        Self {
            concurrency: probe.concurrency,
            per_probe_timeout: probe.per_probe_timeout,
            overall_timeout: probe.overall_timeout,
            progress_log_interval: operational.progress_log_interval,
        }
    }
}

/// Advisory progress snapshot published while a run is active
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchProgress {
    pub completed: usize,
    pub total: usize,
    pub passed: usize,
    pub cached: usize,
    pub timed_out: usize,
}

/// Everything `run_all` produced
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    /// Completion order
    pub results: Vec<ProbeResult>,
    /// The overall deadline cut the run short
    pub partial: bool,
    pub probed: usize,
    pub cached: usize,
    pub timed_out: usize,
    pub elapsed: Duration,
}

pub struct Dispatcher {
    prober: Arc<dyn CandidateProber>,
    cache: Option<Arc<dyn ProbeCache>>,
    /// Current thresholds, re-applied to cache hits
    thresholds: Option<QualityThresholds>,
    settings: DispatchSettings,
    progress: watch::Sender<DispatchProgress>,
}

struct RunState {
    results: Vec<ProbeResult>,
    progress: DispatchProgress,
    probed: usize,
    in_flight: HashMap<Id, Candidate>,
}

impl Dispatcher {
    pub fn new(prober: Arc<dyn CandidateProber>, settings: DispatchSettings) -> Self {
        let (progress, _) = watch::channel(DispatchProgress::default());
        Self {
            prober,
            cache: None,
            thresholds: None,
            settings,
            progress,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ProbeCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Judge cached measurements against `thresholds` instead of the
    /// verdict stored with them
    pub fn with_thresholds(mut self, thresholds: QualityThresholds) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    /// Watch progress of the current or next run
    pub fn subscribe(&self) -> watch::Receiver<DispatchProgress> {
        self.progress.subscribe()
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Probe every candidate under the concurrency cap and collect the
    /// results in completion order.
    pub async fn run_all(&self, candidates: CandidateSet) -> DispatchOutcome {
        let started = Instant::now();
        let deadline = started + self.settings.overall_timeout;
        let total = candidates.len();
        let concurrency = self.settings.concurrency.max(1);

        info!(
            candidates = total,
            concurrency,
            per_probe_timeout = ?self.settings.per_probe_timeout,
            overall_timeout = ?self.settings.overall_timeout,
            "Starting probe dispatch"
        );

        let mut state = RunState {
            results: Vec::with_capacity(total),
            progress: DispatchProgress {
                total,
                ..Default::default()
            },
            probed: 0,
            in_flight: HashMap::new(),
        };
        self.progress.send_replace(state.progress);

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut tasks: JoinSet<ProbeResult> = JoinSet::new();

        let run = async {
            for candidate in candidates.into_vec() {
                if let Some(hit) = self.cached(&candidate).await {
                    state.progress.cached += 1;
                    self.complete(&mut state, hit);
                    continue;
                }

                // Wait for a slot, collecting finished probes meanwhile
                let permit = loop {
                    tokio::select! {
                        permit = semaphore.clone().acquire_owned() => break permit,
                        Some(joined) = tasks.join_next_with_id(), if !tasks.is_empty() => {
                            self.collect(&mut state, joined);
                        }
                    }
                };
                let Ok(permit) = permit else {
                    error!("Probe admission semaphore closed unexpectedly");
                    break;
                };

                let prober = self.prober.clone();
                let cache = self.cache.clone();
                let per_probe_timeout = self.settings.per_probe_timeout;
                let task_candidate = candidate.clone();
                let handle = tasks.spawn(async move {
                    let _permit = permit;
                    probe_with_timeout(prober, cache, task_candidate, per_probe_timeout).await
                });
                state.in_flight.insert(handle.id(), candidate);
                state.probed += 1;
            }

            while let Some(joined) = tasks.join_next_with_id().await {
                self.collect(&mut state, joined);
            }
        };

        let partial = timeout_at(deadline, run).await.is_err();

        if partial {
            tasks.abort_all();
            // Probes that finished at the boundary still count
            while let Some(joined) = tasks.join_next_with_id().await {
                if joined.is_ok() {
                    self.collect(&mut state, joined);
                }
            }
            metrics().dispatch_deadline_total.add(1, &[]);
            warn!(
                completed = state.progress.completed,
                total,
                cancelled = state.in_flight.len(),
                "Overall deadline reached, returning partial results"
            );
        }

        let elapsed = started.elapsed();
        info!(
            completed = state.progress.completed,
            total,
            passed = state.progress.passed,
            cached = state.progress.cached,
            timed_out = state.progress.timed_out,
            elapsed_ms = elapsed.as_millis() as u64,
            partial,
            "Probe dispatch finished"
        );

        DispatchOutcome {
            results: state.results,
            partial,
            probed: state.probed,
            cached: state.progress.cached,
            timed_out: state.progress.timed_out,
            elapsed,
        }
    }

    async fn cached(&self, candidate: &Candidate) -> Option<ProbeResult> {
        let cache = self.cache.as_ref()?;
        match cache.get(&candidate.url).await {
            Ok(Some(hit)) => {
                metrics().cache_hits_total.add(1, &[]);
                debug!(
                    channel = %candidate.channel,
                    url = %UrlUtils::obfuscate_credentials(&candidate.url),
                    "Probe cache hit"
                );
                let hit = hit.for_candidate(candidate.clone());
                Some(match &self.thresholds {
                    Some(thresholds) => thresholds.reapply(hit),
                    None => hit,
                })
            }
            Ok(None) => {
                metrics().cache_misses_total.add(1, &[]);
                None
            }
            Err(e) => {
                metrics().cache_errors_total.add(1, &[]);
                warn!(error = %e, "CacheUnavailable: probe cache lookup failed, treating as miss");
                None
            }
        }
    }

    fn collect(&self, state: &mut RunState, joined: Result<(Id, ProbeResult), JoinError>) {
        match joined {
            Ok((id, result)) => {
                state.in_flight.remove(&id);
                self.complete(state, result);
            }
            Err(e) => {
                let Some(candidate) = state.in_flight.remove(&e.id()) else {
                    return;
                };
                if e.is_cancelled() {
                    return;
                }
                error!(
                    channel = %candidate.channel,
                    url = %UrlUtils::obfuscate_credentials(&candidate.url),
                    error = %e,
                    "Probe task failed"
                );
                self.complete(state, ProbeResult::failed(candidate, FailureReason::SampleFailed));
            }
        }
    }

    fn complete(&self, state: &mut RunState, result: ProbeResult) {
        state.progress.completed += 1;
        if result.passed {
            state.progress.passed += 1;
        }
        if result.failure_reason == Some(FailureReason::Timeout) {
            state.progress.timed_out += 1;
        }
        state.results.push(result);
        self.progress.send_replace(state.progress);

        let interval = self.settings.progress_log_interval;
        if interval > 0
            && (state.progress.completed % interval == 0
                || state.progress.completed == state.progress.total)
        {
            info!(
                completed = state.progress.completed,
                total = state.progress.total,
                passed = state.progress.passed,
                "Probe progress"
            );
        }
    }
}

async fn probe_with_timeout(
    prober: Arc<dyn CandidateProber>,
    cache: Option<Arc<dyn ProbeCache>>,
    candidate: Candidate,
    per_probe_timeout: Duration,
) -> ProbeResult {
    let result = match timeout(per_probe_timeout, prober.probe(candidate.clone())).await {
        Ok(result) => result,
        Err(_) => {
            // Dropping the probe future cancels its requests and child processes
            metrics().probe_timeouts_total.add(1, &[]);
            debug!(
                channel = %candidate.channel,
                url = %UrlUtils::obfuscate_credentials(&candidate.url),
                timeout = ?per_probe_timeout,
                "Probe timed out"
            );
            ProbeResult::timed_out(candidate)
        }
    };
    metrics().record(&result);

    if let Some(cache) = cache
        && is_cacheable(&result)
        && let Err(e) = cache.put(&result.candidate.url, &result).await
    {
        metrics().cache_errors_total.add(1, &[]);
        warn!(error = %e, "CacheUnavailable: failed to store probe result");
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::probe_cache::{CacheError, MockProbeCache};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted prober: per-URL delay and throughput, `None` delay hangs forever
    struct ScriptedProber {
        script: HashMap<String, (Option<Duration>, f64)>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    impl ScriptedProber {
        fn new(script: Vec<(&str, Option<Duration>, f64)>) -> Self {
            Self {
                script: script
                    .into_iter()
                    .map(|(url, delay, mbps)| (url.to_string(), (delay, mbps)))
                    .collect(),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CandidateProber for ScriptedProber {
        async fn probe(&self, candidate: Candidate) -> ProbeResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let (delay, mbps) = self
                .script
                .get(&candidate.url)
                .copied()
                .unwrap_or((Some(Duration::from_millis(10)), 1.0));
            match delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => std::future::pending::<()>().await,
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            ProbeResult {
                candidate,
                passed: true,
                throughput_mbps: mbps,
                width: 1920,
                height: 1080,
                latency_ms: 5,
                failure_reason: None,
            }
        }
    }

    fn settings(concurrency: usize, per_probe: u64, overall: u64) -> DispatchSettings {
        DispatchSettings {
            concurrency,
            per_probe_timeout: Duration::from_secs(per_probe),
            overall_timeout: Duration::from_secs(overall),
            progress_log_interval: 5,
        }
    }

    fn candidates(urls: &[&str]) -> CandidateSet {
        urls.iter()
            .enumerate()
            .map(|(i, url)| Candidate::new("g", format!("ch{i}"), *url))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn never_completing_probe_times_out_on_schedule() {
        let prober = Arc::new(ScriptedProber::new(vec![("http://a/hang", None, 0.0)]));
        let dispatcher = Dispatcher::new(prober, settings(3, 4, 600));

        let started = Instant::now();
        let outcome = dispatcher.run_all(candidates(&["http://a/hang"])).await;

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].failure_reason, Some(FailureReason::Timeout));
        assert!(!outcome.results[0].passed);
        assert_eq!(outcome.timed_out, 1);
        assert!(started.elapsed() <= Duration::from_millis(4_010));
        assert!(!outcome.partial);
    }

    #[tokio::test(start_paused = true)]
    async fn one_result_per_candidate_under_concurrency_cap() {
        let urls: Vec<String> = (0..10).map(|i| format!("http://a/{i}")).collect();
        let script = urls
            .iter()
            .map(|u| (u.as_str(), Some(Duration::from_secs(1)), 2.0))
            .chain([("http://a/3", None, 0.0)])
            .collect();
        let prober = Arc::new(ScriptedProber::new(script));
        let dispatcher = Dispatcher::new(prober.clone(), settings(3, 5, 600));

        let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        let outcome = dispatcher.run_all(candidates(&refs)).await;

        assert_eq!(outcome.results.len(), 10);
        assert_eq!(prober.max_in_flight.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.timed_out, 1);
        let mut seen: Vec<&str> = outcome.results.iter().map(|r| r.url()).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn overall_deadline_returns_partial_results() {
        let prober = Arc::new(ScriptedProber::new(vec![
            ("http://a/fast", Some(Duration::from_secs(1)), 3.0),
            ("http://a/hang1", None, 0.0),
            ("http://a/hang2", None, 0.0),
            ("http://a/never-admitted", Some(Duration::from_secs(1)), 3.0),
        ]));
        let dispatcher = Dispatcher::new(prober.clone(), settings(2, 100, 10));
        let progress = dispatcher.subscribe();

        let started = Instant::now();
        let outcome = dispatcher
            .run_all(candidates(&[
                "http://a/fast",
                "http://a/hang1",
                "http://a/hang2",
                "http://a/never-admitted",
            ]))
            .await;

        assert!(outcome.partial);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].url(), "http://a/fast");
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert_eq!(prober.calls.load(Ordering::SeqCst), 3);
        assert_eq!(progress.borrow().completed, 1);
        assert_eq!(progress.borrow().total, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_hits_skip_probing_and_errors_degrade_to_misses() {
        let mut cache = MockProbeCache::new();
        cache
            .expect_get()
            .withf(|url| url.ends_with("/cached"))
            .returning(|url| {
                Ok(Some(ProbeResult {
                    candidate: Candidate::new("other", "other", url),
                    passed: true,
                    throughput_mbps: 9.0,
                    width: 1920,
                    height: 1080,
                    latency_ms: 1,
                    failure_reason: None,
                }))
            });
        cache
            .expect_get()
            .withf(|url| url.ends_with("/broken"))
            .returning(|_| Err(CacheError::Poisoned));
        cache
            .expect_put()
            .withf(|url, _| url.ends_with("/broken"))
            .times(1)
            .returning(|_, _| Ok(()));

        let prober = Arc::new(ScriptedProber::new(vec![]));
        let dispatcher =
            Dispatcher::new(prober.clone(), settings(2, 5, 600)).with_cache(Arc::new(cache));

        let outcome = dispatcher
            .run_all(CandidateSet::new(vec![
                Candidate::new("news", "CCTV-1", "http://a/cached"),
                Candidate::new("news", "CCTV-2", "http://a/broken"),
            ]))
            .await;

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.cached, 1);
        assert_eq!(outcome.probed, 1);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 1);

        let hit = outcome
            .results
            .iter()
            .find(|r| r.url() == "http://a/cached")
            .unwrap();
        // Re-attributed to the requesting candidate
        assert_eq!(hit.candidate.channel.name, "CCTV-1");
        assert_eq!(hit.throughput_mbps, 9.0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_are_not_written_to_cache() {
        let mut cache = MockProbeCache::new();
        cache.expect_get().returning(|_| Ok(None));
        cache.expect_put().times(0);

        let prober = Arc::new(ScriptedProber::new(vec![("http://a/hang", None, 0.0)]));
        let dispatcher = Dispatcher::new(prober, settings(1, 2, 600)).with_cache(Arc::new(cache));

        let outcome = dispatcher.run_all(candidates(&["http://a/hang"])).await;
        assert_eq!(outcome.timed_out, 1);
    }

    #[tokio::test]
    async fn empty_candidate_set_finishes_immediately() {
        let dispatcher = Dispatcher::new(
            Arc::new(ScriptedProber::new(vec![])),
            settings(3, 5, 600),
        );
        let outcome = dispatcher.run_all(CandidateSet::default()).await;
        assert!(outcome.results.is_empty());
        assert!(!outcome.partial);
    }
}
