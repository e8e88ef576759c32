//! Probe pipeline services
//!
//! - `prober`: one candidate → one [`ProbeResult`](crate::models::ProbeResult)
//! - `dispatcher`: all candidates under a concurrency cap and deadlines
//! - `selector`: ranking and truncation per channel
//! - `probe_cache`: optional reuse of recent measurements
//! - `ffprobe`: decode-based resolution lookup
//! - `batch`: wires the above into a single run

pub mod batch;
pub mod dispatcher;
pub mod ffprobe;
pub mod probe_cache;
pub mod prober;
pub mod selector;

pub use batch::{BatchReport, BatchRunner, BatchStats};
pub use dispatcher::{
    CandidateProber, DispatchOutcome, DispatchProgress, DispatchSettings, Dispatcher,
};
pub use ffprobe::{FfprobeInspector, ResolutionInspector};
pub use probe_cache::{CacheError, JsonFileProbeCache, MemoryProbeCache, ProbeCache};
pub use prober::{QualityThresholds, StreamProbe};
pub use selector::select;
