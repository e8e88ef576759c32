use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::{ChannelKey, ProbeResult};

/// What to emit for a channel where no candidate passed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum NoPassFallback {
    /// Leave the channel out of the output
    #[default]
    Drop,
    /// Emit the single highest-throughput candidate regardless of status
    BestEffort,
}

/// All probe results sharing one channel key.
#[derive(Debug, Clone)]
pub struct ChannelBucket {
    key: ChannelKey,
    results: Vec<ProbeResult>,
}

impl ChannelBucket {
    pub(crate) fn new(key: ChannelKey, results: Vec<ProbeResult>) -> Self {
        Self { key, results }
    }

    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    pub fn results(&self) -> &[ProbeResult] {
        &self.results
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub(crate) fn into_parts(self) -> (ChannelKey, Vec<ProbeResult>) {
        (self.key, self.results)
    }
}

/// Ranked URLs per channel, highest-ranked first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedList {
    channels: BTreeMap<ChannelKey, Vec<String>>,
}

impl SelectedList {
    pub(crate) fn insert(&mut self, key: ChannelKey, urls: Vec<String>) {
        self.channels.insert(key, urls);
    }

    pub fn get(&self, key: &ChannelKey) -> Option<&[String]> {
        self.channels.get(key).map(Vec::as_slice)
    }

    pub fn contains(&self, key: &ChannelKey) -> bool {
        self.channels.contains_key(key)
    }

    /// Number of channels with at least one URL.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Total URLs across all channels.
    pub fn url_count(&self) -> usize {
        self.channels.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChannelKey, &[String])> {
        self.channels.iter().map(|(k, v)| (k, v.as_slice()))
    }
}

impl IntoIterator for SelectedList {
    type Item = (ChannelKey, Vec<String>);
    type IntoIter = std::collections::btree_map::IntoIter<ChannelKey, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.channels.into_iter()
    }
}
