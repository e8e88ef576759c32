use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::Candidate;

/// Why a candidate did not pass. Every variant is local to one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FailureReason {
    /// Manifest could not be fetched/parsed, or the scheme cannot be read directly
    UnresolvedManifest,
    /// Segment sampling or the direct read did not produce a measurement
    SampleFailed,
    BelowThroughputThreshold,
    BelowResolutionThreshold,
    /// Probe exceeded its wall-clock ceiling and was abandoned
    Timeout,
}

/// Outcome of probing one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub candidate: Candidate,
    pub passed: bool,
    pub throughput_mbps: f64,
    /// 0 when unknown
    pub width: u32,
    /// 0 when unknown
    pub height: u32,
    pub latency_ms: u64,
    pub failure_reason: Option<FailureReason>,
}

impl ProbeResult {
    /// A result with no measurement at all.
    pub fn failed(candidate: Candidate, reason: FailureReason) -> Self {
        Self {
            candidate,
            passed: false,
            throughput_mbps: 0.0,
            width: 0,
            height: 0,
            latency_ms: 0,
            failure_reason: Some(reason),
        }
    }

    /// Synthetic result for a probe abandoned by the dispatcher.
    pub fn timed_out(candidate: Candidate) -> Self {
        Self::failed(candidate, FailureReason::Timeout)
    }

    pub fn url(&self) -> &str {
        &self.candidate.url
    }

    pub fn resolution_known(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Copy of this measurement attributed to another candidate with the same URL.
    pub fn for_candidate(&self, candidate: Candidate) -> Self {
        Self {
            candidate,
            ..self.clone()
        }
    }
}
