use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical channel identity: `(group, normalized name)`.
///
/// Both parts are opaque to the prober; they are assigned by discovery and
/// naming before anything is probed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelKey {
    pub group: String,
    pub name: String,
}

impl ChannelKey {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.name)
    }
}

/// One endpoint awaiting evaluation for a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub channel: ChannelKey,
    pub url: String,
}

impl Candidate {
    pub fn new(group: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            channel: ChannelKey::new(group, name),
            url: url.into(),
        }
    }
}

/// Candidates deduplicated by the exact `(group, name, url)` triple.
///
/// First-seen order is preserved so runs over the same input dispatch in the
/// same order.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    candidates: Vec<Candidate>,
    duplicates_removed: usize,
}

impl CandidateSet {
    pub fn new<I>(candidates: I) -> Self
    where
        I: IntoIterator<Item = Candidate>,
    {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        let mut duplicates_removed = 0;

        for candidate in candidates {
            if seen.insert(candidate.clone()) {
                unique.push(candidate);
            } else {
                duplicates_removed += 1;
            }
        }

        Self {
            candidates: unique,
            duplicates_removed,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn duplicates_removed(&self) -> usize {
        self.duplicates_removed
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    pub fn into_vec(self) -> Vec<Candidate> {
        self.candidates
    }
}

impl FromIterator<Candidate> for CandidateSet {
    fn from_iter<T: IntoIterator<Item = Candidate>>(iter: T) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_uses_exact_triple() {
        let set = CandidateSet::new(vec![
            Candidate::new("news", "CCTV-1", "http://a/x.m3u8"),
            Candidate::new("news", "CCTV-1", "http://a/x.m3u8"),
            // Same URL under another channel is a different candidate
            Candidate::new("news", "CCTV-2", "http://a/x.m3u8"),
            Candidate::new("sport", "CCTV-1", "http://a/x.m3u8"),
        ]);

        assert_eq!(set.len(), 3);
        assert_eq!(set.duplicates_removed(), 1);
    }

    #[test]
    fn dedup_preserves_first_seen_order() {
        let set: CandidateSet = vec![
            Candidate::new("g", "b", "http://b"),
            Candidate::new("g", "a", "http://a"),
            Candidate::new("g", "b", "http://b"),
        ]
        .into_iter()
        .collect();

        let urls: Vec<_> = set.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["http://b", "http://a"]);
    }
}
