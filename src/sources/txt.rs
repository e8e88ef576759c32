//! TXT "genre" list parsing
//!
//! ```text
//! 央视频道,#genre#
//! CCTV-1综合,http://a/cctv1.m3u8
//!
//! 卫视频道,#genre#
//! 湖南卫视,http://b/hunan.m3u8
//! ```
//!
//! Lines before the first header carry no group.

use tracing::warn;

use super::RawEntry;

const GENRE_MARKER: &str = "#genre#";

pub fn parse_txt(content: &str, origin: &str) -> Vec<RawEntry> {
    let mut entries = Vec::new();
    let mut group: Option<String> = None;

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim().trim_start_matches('\u{feff}');
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }

        let Some((left, right)) = line.split_once(',') else {
            warn!(source = origin, line = line_num + 1, "Skipping line without a comma");
            continue;
        };
        let (left, right) = (left.trim(), right.trim());

        if right.eq_ignore_ascii_case(GENRE_MARKER) {
            group = (!left.is_empty()).then(|| left.to_string());
            continue;
        }

        if left.is_empty() || !right.contains("://") {
            warn!(source = origin, line = line_num + 1, "Skipping malformed channel line");
            continue;
        }

        entries.push(RawEntry {
            group: group.clone(),
            name: left.to_string(),
            url: right.to_string(),
        });
    }

    entries
}
