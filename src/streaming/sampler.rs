//! Throughput sampling over media segments
//!
//! Segments are fetched one at a time so the estimate reflects a single
//! connection, as a player would see it.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, trace};

use super::metrics::metrics;
use crate::fetch::StreamFetcher;
use crate::utils::url::UrlUtils;

/// Minimum successful segment downloads for a usable estimate
pub const MIN_SEGMENTS: usize = 2;

/// Bytes received and time spent across successful segment downloads
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleOutcome {
    pub bytes: u64,
    pub elapsed: Duration,
    pub segments: usize,
}

impl SampleOutcome {
    pub fn throughput_mbps(&self) -> f64 {
        throughput_mbps(self.bytes, self.elapsed)
    }
}

/// `bytes * 8 / seconds / 1e6`, or 0 when no time elapsed
pub fn throughput_mbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    bytes as f64 * 8.0 / secs / 1_000_000.0
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SampleError {
    #[error("Only {succeeded} of {attempted} segments downloaded (need {MIN_SEGMENTS})")]
    TooFewSegments { attempted: usize, succeeded: usize },
    #[error("Segment downloads completed in zero time")]
    ZeroElapsed,
}

/// Downloads bounded segment prefixes and sums the measurements
#[derive(Clone)]
pub struct SegmentSampler {
    fetcher: Arc<dyn StreamFetcher>,
    max_segment_bytes: u64,
}

impl SegmentSampler {
    pub fn new(fetcher: Arc<dyn StreamFetcher>, max_segment_bytes: u64) -> Self {
        Self {
            fetcher,
            max_segment_bytes,
        }
    }

    /// Fetch at most the first `max_segments` segments sequentially.
    ///
    /// Failed or timed-out segments are skipped without retry and contribute
    /// nothing to the totals.
    pub async fn sample(
        &self,
        segments: &[String],
        max_segments: usize,
        per_segment_timeout: Duration,
    ) -> Result<SampleOutcome, SampleError> {
        let mut bytes = 0u64;
        let mut elapsed = Duration::ZERO;
        let mut succeeded = 0usize;
        let attempted = segments.len().min(max_segments);

        for segment in segments.iter().take(max_segments) {
            match self
                .fetcher
                .fetch_prefix(segment, self.max_segment_bytes, per_segment_timeout)
                .await
            {
                Ok(transfer) => {
                    trace!(
                        segment = %UrlUtils::obfuscate_credentials(segment),
                        bytes = transfer.bytes,
                        elapsed_ms = transfer.elapsed.as_millis() as u64,
                        "Segment sampled"
                    );
                    metrics().segments_sampled_total.add(1, &[]);
                    metrics()
                        .segment_fetch_seconds
                        .record(transfer.elapsed.as_secs_f64(), &[]);
                    bytes += transfer.bytes;
                    elapsed += transfer.elapsed;
                    succeeded += 1;
                }
                Err(e) => {
                    debug!(
                        segment = %UrlUtils::obfuscate_credentials(segment),
                        error = %e,
                        "Segment download failed, skipping"
                    );
                    metrics().segment_errors_total.add(1, &[]);
                }
            }
        }

        if succeeded < MIN_SEGMENTS {
            return Err(SampleError::TooFewSegments {
                attempted,
                succeeded,
            });
        }
        if elapsed.is_zero() {
            return Err(SampleError::ZeroElapsed);
        }

        Ok(SampleOutcome {
            bytes,
            elapsed,
            segments: succeeded,
        })
    }
}
