//! Single-candidate probe
//!
//! Resolve, measure, then apply thresholds in a fixed order: throughput
//! first, resolution second. Each call measures afresh; the wall-clock
//! ceiling is applied by the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::ProbeConfig;
use crate::fetch::StreamFetcher;
use crate::models::{Candidate, FailureReason, ProbeResult};
use crate::services::ffprobe::ResolutionInspector;
use crate::streaming::sampler::throughput_mbps;
use crate::streaming::{PlaylistResolver, ResolvedStream, SegmentSampler};
use crate::utils::url::UrlUtils;

/// Threshold subset of [`ProbeConfig`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityThresholds {
    pub min_throughput_mbps: f64,
    pub min_width: u32,
    pub min_height: u32,
    pub allow_unknown_resolution: bool,
}

impl From<&ProbeConfig> for QualityThresholds {
    fn from(config: &ProbeConfig) -> Self {
        Self {
            min_throughput_mbps: config.min_throughput_mbps,
            min_width: config.min_width,
            min_height: config.min_height,
            allow_unknown_resolution: config.allow_unknown_resolution,
        }
    }
}

impl QualityThresholds {
    /// Failure reason for a measurement, `None` when it passes.
    pub fn evaluate(&self, throughput_mbps: f64, width: u32, height: u32) -> Option<FailureReason> {
        if throughput_mbps < self.min_throughput_mbps {
            return Some(FailureReason::BelowThroughputThreshold);
        }
        let unknown = width == 0 && height == 0;
        if unknown && self.allow_unknown_resolution {
            return None;
        }
        if width < self.min_width || height < self.min_height {
            return Some(FailureReason::BelowResolutionThreshold);
        }
        None
    }

    /// Re-judge a stored measurement under these thresholds.
    ///
    /// Results without a measurement (unresolved, sampling failed, timed
    /// out) are returned unchanged.
    pub fn reapply(&self, mut result: ProbeResult) -> ProbeResult {
        match result.failure_reason {
            None
            | Some(FailureReason::BelowThroughputThreshold)
            | Some(FailureReason::BelowResolutionThreshold) => {
                let failure = self.evaluate(result.throughput_mbps, result.width, result.height);
                result.passed = failure.is_none();
                result.failure_reason = failure;
                result
            }
            Some(
                FailureReason::UnresolvedManifest
                | FailureReason::SampleFailed
                | FailureReason::Timeout,
            ) => result,
        }
    }
}

struct Measurement {
    throughput_mbps: f64,
    width: u32,
    height: u32,
    latency: Duration,
}

/// Composes resolver and sampler into one pass/fail decision
#[derive(Clone)]
pub struct StreamProbe {
    fetcher: Arc<dyn StreamFetcher>,
    resolver: PlaylistResolver,
    sampler: SegmentSampler,
    inspector: Option<Arc<dyn ResolutionInspector>>,
    config: Arc<ProbeConfig>,
    thresholds: QualityThresholds,
}

impl StreamProbe {
    pub fn new(fetcher: Arc<dyn StreamFetcher>, config: Arc<ProbeConfig>) -> Self {
        let resolver = PlaylistResolver::new(
            fetcher.clone(),
            config.max_playlist_bytes,
            config.max_manifest_depth,
        );
        let sampler = SegmentSampler::new(fetcher.clone(), config.max_segment_bytes);
        let thresholds = QualityThresholds::from(config.as_ref());
        Self {
            fetcher,
            resolver,
            sampler,
            inspector: None,
            config,
            thresholds,
        }
    }

    /// Fill unknown resolutions with a decode-based lookup
    pub fn with_inspector(mut self, inspector: Arc<dyn ResolutionInspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub async fn probe(&self, candidate: Candidate) -> ProbeResult {
        let safe_url = UrlUtils::obfuscate_credentials(&candidate.url);

        let measurement = match self.measure(&candidate.url).await {
            Ok(m) => m,
            Err(reason) => {
                debug!(channel = %candidate.channel, url = %safe_url, %reason, "Probe failed");
                return ProbeResult::failed(candidate, reason);
            }
        };

        let failure = self.thresholds.evaluate(
            measurement.throughput_mbps,
            measurement.width,
            measurement.height,
        );
        debug!(
            channel = %candidate.channel,
            url = %safe_url,
            throughput_mbps = measurement.throughput_mbps,
            width = measurement.width,
            height = measurement.height,
            passed = failure.is_none(),
            "Probe measured"
        );

        ProbeResult {
            candidate,
            passed: failure.is_none(),
            throughput_mbps: measurement.throughput_mbps,
            width: measurement.width,
            height: measurement.height,
            latency_ms: measurement.latency.as_millis() as u64,
            failure_reason: failure,
        }
    }

    async fn measure(&self, url: &str) -> Result<Measurement, FailureReason> {
        let resolved = self
            .resolver
            .resolve(url, self.config.fetch_timeout)
            .await
            .map_err(|e| {
                debug!(url = %UrlUtils::obfuscate_credentials(url), error = %e, "Resolution failed");
                FailureReason::UnresolvedManifest
            })?;

        let mut measurement = match resolved {
            ResolvedStream::Manifest(manifest) => {
                let outcome = self
                    .sampler
                    .sample(
                        &manifest.segments,
                        self.config.max_segments_sampled,
                        self.config.segment_timeout,
                    )
                    .await
                    .map_err(|e| {
                        debug!(url = %UrlUtils::obfuscate_credentials(url), error = %e, "Sampling failed");
                        FailureReason::SampleFailed
                    })?;
                Measurement {
                    throughput_mbps: outcome.throughput_mbps(),
                    width: manifest.width,
                    height: manifest.height,
                    latency: manifest.latency,
                }
            }
            ResolvedStream::Direct => {
                if !UrlUtils::is_http(url) {
                    return Err(FailureReason::UnresolvedManifest);
                }
                let transfer = self
                    .fetcher
                    .read_for(url, self.config.direct_read_duration, self.config.max_direct_bytes)
                    .await
                    .map_err(|_| FailureReason::SampleFailed)?;
                if transfer.bytes == 0 || transfer.elapsed.is_zero() {
                    return Err(FailureReason::SampleFailed);
                }
                Measurement {
                    throughput_mbps: throughput_mbps(transfer.bytes, transfer.elapsed),
                    width: 0,
                    height: 0,
                    latency: transfer.first_byte.unwrap_or(transfer.elapsed),
                }
            }
        };

        // Only worth decoding when throughput already qualifies
        if measurement.width == 0
            && measurement.height == 0
            && measurement.throughput_mbps >= self.thresholds.min_throughput_mbps
            && let Some(inspector) = &self.inspector
            && let Some((width, height)) = inspector.inspect(url).await
        {
            measurement.width = width;
            measurement.height = height;
        }

        Ok(measurement)
    }
}
