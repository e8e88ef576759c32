//! Channel naming and grouping
//!
//! Raw source entries carry free-form names such as `cctv-1 hd` or
//! `湖南卫视 HD`. Before probing, each entry is mapped onto a stable
//! `(group, name)` key so that candidates for the same logical channel land
//! in the same bucket.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::{CategoryRule, NamingConfig};
use crate::models::Candidate;
use crate::sources::RawEntry;

static CCTV5_PLUS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"cctv[-\s]?5\+").ok());
static CCTV_NUMBER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"cctv[-\s]?(\d{1,2})").ok());
static CETV_NUMBER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"cetv[-\s]?(\d)").ok());

/// Keep only CJK unified ideographs.
pub fn clean_name(name: &str) -> String {
    name.chars()
        .filter(|c| ('\u{4e00}'..='\u{9fff}').contains(c))
        .collect()
}

/// Maps raw entries onto channel keys using configured rules
#[derive(Debug, Clone)]
pub struct ChannelNamer {
    rules: Vec<CategoryRule>,
    cctv_names: BTreeMap<String, String>,
}

impl ChannelNamer {
    pub fn new(config: &NamingConfig) -> Self {
        let rules = config
            .rules
            .iter()
            .map(|rule| CategoryRule {
                keywords: rule.keywords.iter().map(|k| k.to_lowercase()).collect(),
                ..rule.clone()
            })
            .collect();
        Self {
            rules,
            cctv_names: config.cctv_names.clone(),
        }
    }

    /// Canonical CCTV / CETV names; anything else is returned unchanged.
    ///
    /// `cctv5+`, `CCTV 5+` → `CCTV-5+体育赛事`, `cctv-1 hd` → `CCTV-1综合`,
    /// `cetv1` → `CETV-1`.
    pub fn normalize_name(&self, name: &str) -> String {
        let lower = name.to_lowercase();

        if let Some(re) = CCTV5_PLUS.as_ref()
            && re.is_match(&lower)
        {
            return format!("CCTV-5+{}", self.cctv_suffix("5+"));
        }
        if let Some(re) = CCTV_NUMBER.as_ref()
            && let Some(caps) = re.captures(&lower)
        {
            let number = caps[1].trim_start_matches('0');
            let number = if number.is_empty() { "0" } else { number };
            return format!("CCTV-{number}{}", self.cctv_suffix(number));
        }
        if let Some(re) = CETV_NUMBER.as_ref()
            && let Some(caps) = re.captures(&lower)
        {
            return format!("CETV-{}", &caps[1]);
        }
        name.trim().to_string()
    }

    fn cctv_suffix(&self, number: &str) -> &str {
        self.cctv_names.get(number).map(String::as_str).unwrap_or("")
    }

    /// First rule with a keyword contained in the normalized name
    pub fn classify(&self, normalized: &str) -> Option<&CategoryRule> {
        let lower = normalized.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.keywords.iter().any(|k| lower.contains(k.as_str())))
    }

    /// Turn a raw entry into a candidate, or `None` when it is unusable or
    /// matches no category.
    pub fn assign(&self, entry: &RawEntry) -> Option<Candidate> {
        let name = entry.name.trim();
        let url = entry.url.trim();
        if name.is_empty() || url.is_empty() {
            return None;
        }

        let normalized = self.normalize_name(name);

        if let Some(group) = entry.group.as_deref().map(str::trim)
            && !group.is_empty()
        {
            return Some(Candidate::new(group, normalized, url));
        }

        let rule = self.classify(&normalized)?;
        let final_name = if rule.strip_latin {
            let cleaned = clean_name(name);
            if cleaned.is_empty() { normalized } else { cleaned }
        } else {
            normalized
        };
        Some(Candidate::new(rule.name.clone(), final_name, url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn namer() -> ChannelNamer {
        ChannelNamer::new(&NamingConfig::default())
    }

    fn entry(group: Option<&str>, name: &str, url: &str) -> RawEntry {
        RawEntry {
            group: group.map(str::to_string),
            name: name.to_string(),
            url: url.to_string(),
        }
    }

    #[rstest]
    #[case("cctv5+", "CCTV-5+体育赛事")]
    #[case("CCTV 5+ HD", "CCTV-5+体育赛事")]
    #[case("cctv-1 hd", "CCTV-1综合")]
    #[case("CCTV13", "CCTV-13新闻")]
    #[case("CCTV-01", "CCTV-1综合")]
    #[case("CCTV-99", "CCTV-99")]
    #[case("CETV1", "CETV-1")]
    #[case("CCTV-1综合", "CCTV-1综合")]
    #[case(" 湖南卫视 ", "湖南卫视")]
    fn normalizes_names(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(namer().normalize_name(raw), expected);
    }

    #[test]
    fn clean_name_keeps_only_cjk() {
        assert_eq!(clean_name("湖南卫视 HD 1080p"), "湖南卫视");
        assert_eq!(clean_name("HBO"), "");
    }

    #[test]
    fn assigns_groups_by_first_matching_rule() {
        let namer = namer();

        let c = namer.assign(&entry(None, "cctv-5 HD", "http://a/1")).unwrap();
        assert_eq!((c.channel.group.as_str(), c.channel.name.as_str()), ("央视频道", "CCTV-5体育"));

        let c = namer.assign(&entry(None, "湖南卫视 HD", "http://a/2")).unwrap();
        assert_eq!((c.channel.group.as_str(), c.channel.name.as_str()), ("卫视频道", "湖南卫视"));

        // 4K is listed first, so it wins over the satellite rule
        let c = namer.assign(&entry(None, "4K 浙江卫视", "http://a/3")).unwrap();
        assert_eq!(c.channel.group, "4K专区");
        assert_eq!(c.channel.name, "浙江卫视");

        // Latin-only name under a stripping rule falls back to the normalized name
        let c = namer.assign(&entry(None, "TVB", "http://a/4")).unwrap();
        assert_eq!(c.channel.name, "TVB");

        assert!(namer.assign(&entry(None, "Random Sports", "http://a/5")).is_none());
    }

    #[test]
    fn explicit_group_is_kept() {
        let c = namer()
            .assign(&entry(Some("news"), "cctv1", "http://a/x.manifest"))
            .unwrap();
        assert_eq!(c.channel.group, "news");
        assert_eq!(c.channel.name, "CCTV-1综合");
    }

    #[test]
    fn empty_fields_are_rejected() {
        assert!(namer().assign(&entry(None, "  ", "http://a")).is_none());
        assert!(namer().assign(&entry(Some("g"), "n", "")).is_none());
    }
}
