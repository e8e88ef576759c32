pub mod candidate;
pub mod probe_result;
pub mod selection;

pub use candidate::{Candidate, CandidateSet, ChannelKey};
pub use probe_result::{FailureReason, ProbeResult};
pub use selection::{ChannelBucket, NoPassFallback, SelectedList};
