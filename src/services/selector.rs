//! Per-channel ranking and truncation
//!
//! Pure functions over a finished result set. Running them twice over the
//! same input yields the same [`SelectedList`].

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::config::SelectionConfig;
use crate::models::{ChannelBucket, ChannelKey, NoPassFallback, ProbeResult, SelectedList};

/// Passed before failed, then throughput descending, then URL ascending.
pub fn rank(a: &ProbeResult, b: &ProbeResult) -> Ordering {
    b.passed
        .cmp(&a.passed)
        .then_with(|| b.throughput_mbps.total_cmp(&a.throughput_mbps))
        .then_with(|| a.url().cmp(b.url()))
}

/// Group results by channel key
pub fn partition(results: &[ProbeResult]) -> Vec<ChannelBucket> {
    let mut groups: BTreeMap<ChannelKey, Vec<ProbeResult>> = BTreeMap::new();
    for result in results {
        groups
            .entry(result.candidate.channel.clone())
            .or_default()
            .push(result.clone());
    }
    groups
        .into_iter()
        .map(|(key, results)| ChannelBucket::new(key, results))
        .collect()
}

/// Ranked URLs for one channel, or `None` when the channel is dropped.
pub fn select_bucket(
    bucket: ChannelBucket,
    max_per_channel: usize,
    fallback: NoPassFallback,
) -> Option<(ChannelKey, Vec<String>)> {
    let passed = bucket.passed_count();
    let (key, mut results) = bucket.into_parts();
    results.sort_by(rank);

    let mut seen = HashSet::new();
    let mut urls: Vec<String> = if passed > 0 {
        results
            .into_iter()
            .filter(|r| r.passed)
            .map(|r| r.candidate.url)
            .filter(|url| seen.insert(url.clone()))
            .collect()
    } else {
        match fallback {
            NoPassFallback::Drop => {
                debug!(channel = %key, candidates = results.len(), "No passing candidate, dropping channel");
                return None;
            }
            NoPassFallback::BestEffort => {
                debug!(channel = %key, candidates = results.len(), "No passing candidate, keeping best effort");
                results.into_iter().take(1).map(|r| r.candidate.url).collect()
            }
        }
    };

    if max_per_channel > 0 {
        urls.truncate(max_per_channel);
    }
    if urls.is_empty() {
        return None;
    }
    Some((key, urls))
}

/// Build the final per-channel list.
pub fn select(
    results: &[ProbeResult],
    max_per_channel: usize,
    fallback: NoPassFallback,
) -> SelectedList {
    let mut selected = SelectedList::default();
    for bucket in partition(results) {
        if let Some((key, urls)) = select_bucket(bucket, max_per_channel, fallback) {
            selected.insert(key, urls);
        }
    }
    selected
}

/// [`select`] with settings taken from configuration
pub fn select_with_config(results: &[ProbeResult], config: &SelectionConfig) -> SelectedList {
    select(results, config.max_per_channel, config.no_pass_fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Candidate, FailureReason};

    fn result(group: &str, name: &str, url: &str, passed: bool, mbps: f64) -> ProbeResult {
        ProbeResult {
            candidate: Candidate::new(group, name, url),
            passed,
            throughput_mbps: mbps,
            width: 1920,
            height: 1080,
            latency_ms: 10,
            failure_reason: (!passed).then_some(FailureReason::BelowThroughputThreshold),
        }
    }

    #[test]
    fn best_throughput_wins_with_max_one() {
        let results = vec![
            result("news", "CCTV-1", "http://b/y.manifest", true, 1.0),
            result("news", "CCTV-1", "http://a/x.manifest", true, 5.0),
        ];

        let selected = select(&results, 1, NoPassFallback::Drop);
        assert_eq!(
            selected.get(&ChannelKey::new("news", "CCTV-1")).unwrap(),
            &["http://a/x.manifest".to_string()]
        );
    }

    #[test]
    fn ties_break_by_url_and_failed_are_excluded() {
        let results = vec![
            result("g", "n", "http://c", true, 2.0),
            result("g", "n", "http://a", true, 2.0),
            result("g", "n", "http://z", false, 50.0),
            result("g", "n", "http://b", true, 3.0),
        ];

        let selected = select(&results, 0, NoPassFallback::BestEffort);
        assert_eq!(
            selected.get(&ChannelKey::new("g", "n")).unwrap(),
            &["http://b", "http://a", "http://c"].map(String::from)
        );
    }

    #[test]
    fn no_pass_fallback_policies() {
        let results = vec![
            result("g", "n", "http://slow", false, 0.2),
            result("g", "n", "http://faster", false, 0.8),
            result("g", "other", "http://ok", true, 4.0),
        ];

        let dropped = select(&results, 8, NoPassFallback::Drop);
        assert!(!dropped.contains(&ChannelKey::new("g", "n")));
        assert_eq!(dropped.channel_count(), 1);

        let best_effort = select(&results, 8, NoPassFallback::BestEffort);
        assert_eq!(
            best_effort.get(&ChannelKey::new("g", "n")).unwrap(),
            &["http://faster".to_string()]
        );
    }

    #[test]
    fn empty_input_selects_nothing() {
        assert!(select(&[], 8, NoPassFallback::BestEffort).is_empty());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_result() -> impl Strategy<Value = ProbeResult> {
            (0u8..4, 0u8..6, any::<bool>(), 0u32..2000).prop_map(|(ch, url, passed, tenths)| {
                result(
                    "g",
                    &format!("ch{ch}"),
                    &format!("http://host/{url}"),
                    passed,
                    f64::from(tenths) / 10.0,
                )
            })
        }

        proptest! {
            #[test]
            fn never_exceeds_max_per_channel(
                results in prop::collection::vec(arb_result(), 0..40),
                max in 1usize..5,
                best_effort in any::<bool>(),
            ) {
                let fallback = if best_effort { NoPassFallback::BestEffort } else { NoPassFallback::Drop };
                let selected = select(&results, max, fallback);
                for (_, urls) in selected.iter() {
                    prop_assert!(urls.len() <= max);
                    prop_assert!(!urls.is_empty());
                }
            }

            #[test]
            fn first_url_has_highest_passed_throughput(
                results in prop::collection::vec(arb_result(), 1..40),
                max in 0usize..5,
            ) {
                let selected = select(&results, max, NoPassFallback::Drop);
                for bucket in partition(&results) {
                    let best = bucket
                        .results()
                        .iter()
                        .filter(|r| r.passed)
                        .map(|r| r.throughput_mbps)
                        .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.max(t))));
                    match best {
                        Some(best) => {
                            let urls = selected.get(bucket.key()).unwrap();
                            let first = bucket
                                .results()
                                .iter()
                                .filter(|r| r.passed && r.url() == urls[0])
                                .map(|r| r.throughput_mbps)
                                .fold(f64::MIN, f64::max);
                            prop_assert_eq!(first, best);
                        }
                        None => prop_assert!(!selected.contains(bucket.key())),
                    }
                }
            }

            #[test]
            fn select_is_idempotent(
                results in prop::collection::vec(arb_result(), 0..40),
                max in 0usize..5,
            ) {
                let first = select(&results, max, NoPassFallback::BestEffort);
                let second = select(&results, max, NoPassFallback::BestEffort);
                prop_assert_eq!(first, second);
            }
        }
    }
}
