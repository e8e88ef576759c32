//! Playlist writers for a [`SelectedList`]
//!
//! Groups follow the configured order, then any remaining groups
//! alphabetically. Channels within a group are sorted by name and URLs keep
//! their rank order.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::OutputConfig;
use crate::errors::AppResult;
use crate::models::SelectedList;

/// Group name → channels (sorted by name) → ranked URLs
type Grouped<'a> = Vec<(&'a str, Vec<(&'a str, &'a [String])>)>;

fn grouped<'a>(selected: &'a SelectedList, group_order: &[String]) -> Grouped<'a> {
    let mut by_group: BTreeMap<&str, Vec<(&str, &[String])>> = BTreeMap::new();
    for (key, urls) in selected.iter() {
        by_group
            .entry(key.group.as_str())
            .or_default()
            .push((key.name.as_str(), urls));
    }
    for channels in by_group.values_mut() {
        channels.sort_by(|a, b| a.0.cmp(b.0));
    }

    let mut ordered = Vec::with_capacity(by_group.len());
    for group in group_order {
        if let Some(entry) = by_group.remove_entry(group.as_str()) {
            ordered.push(entry);
        }
    }
    // Groups outside the configured order, alphabetically
    ordered.extend(by_group);
    ordered
}

/// Extended M3U with one `#EXTINF` entry per URL
pub fn render_m3u(selected: &SelectedList, group_order: &[String]) -> String {
    let mut out = String::from("#EXTM3U\n");
    for (group, channels) in grouped(selected, group_order) {
        for (name, urls) in channels {
            for url in urls {
                let _ = writeln!(out, "#EXTINF:-1 group-title=\"{group}\",{name}");
                let _ = writeln!(out, "{url}");
            }
        }
    }
    out
}

/// TXT genre list: `Group,#genre#` header, `Name,url` lines, blank line
pub fn render_txt(selected: &SelectedList, group_order: &[String]) -> String {
    let mut out = String::new();
    for (group, channels) in grouped(selected, group_order) {
        let _ = writeln!(out, "{group},#genre#");
        for (name, urls) in channels {
            for url in urls {
                let _ = writeln!(out, "{name},{url}");
            }
        }
        out.push('\n');
    }
    out
}

/// Write the configured output files, returning the paths written.
pub async fn write_outputs(
    selected: &SelectedList,
    group_order: &[String],
    config: &OutputConfig,
) -> AppResult<Vec<PathBuf>> {
    tokio::fs::create_dir_all(&config.directory).await?;
    let mut written = Vec::new();

    if config.write_m3u {
        let path = config.directory.join(&config.m3u_file);
        write_file(&path, render_m3u(selected, group_order)).await?;
        written.push(path);
    }
    if config.write_txt {
        let path = config.directory.join(&config.txt_file);
        write_file(&path, render_txt(selected, group_order)).await?;
        written.push(path);
    }

    info!(
        files = written.len(),
        channels = selected.channel_count(),
        urls = selected.url_count(),
        "Playlists written"
    );
    Ok(written)
}

async fn write_file(path: &Path, contents: String) -> AppResult<()> {
    tokio::fs::write(path, contents).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Candidate, NoPassFallback, ProbeResult};
    use crate::services::selector::select;

    fn selected() -> SelectedList {
        let passed = |g: &str, n: &str, u: &str, mbps: f64| ProbeResult {
            candidate: Candidate::new(g, n, u),
            passed: true,
            throughput_mbps: mbps,
            width: 0,
            height: 0,
            latency_ms: 0,
            failure_reason: None,
        };
        select(
            &[
                passed("卫视频道", "湖南卫视", "http://h/1", 2.0),
                passed("央视频道", "CCTV-2财经", "http://c/2", 2.0),
                passed("央视频道", "CCTV-1综合", "http://c/1b", 1.0),
                passed("央视频道", "CCTV-1综合", "http://c/1a", 3.0),
                passed("Misc", "X", "http://x", 1.0),
            ],
            0,
            NoPassFallback::Drop,
        )
    }

    fn order() -> Vec<String> {
        vec!["央视频道".to_string(), "卫视频道".to_string()]
    }

    #[test]
    fn m3u_follows_group_order_and_rank() {
        let m3u = render_m3u(&selected(), &order());
        let expected = "#EXTM3U\n\
#EXTINF:-1 group-title=\"央视频道\",CCTV-1综合\nhttp://c/1a\n\
#EXTINF:-1 group-title=\"央视频道\",CCTV-1综合\nhttp://c/1b\n\
#EXTINF:-1 group-title=\"央视频道\",CCTV-2财经\nhttp://c/2\n\
#EXTINF:-1 group-title=\"卫视频道\",湖南卫视\nhttp://h/1\n\
#EXTINF:-1 group-title=\"Misc\",X\nhttp://x\n";
        assert_eq!(m3u, expected);
    }

    #[test]
    fn txt_has_genre_headers_and_blank_separators() {
        let txt = render_txt(&selected(), &order());
        let expected = "央视频道,#genre#\n\
CCTV-1综合,http://c/1a\n\
CCTV-1综合,http://c/1b\n\
CCTV-2财经,http://c/2\n\
\n\
卫视频道,#genre#\n\
湖南卫视,http://h/1\n\
\n\
Misc,#genre#\n\
X,http://x\n\
\n";
        assert_eq!(txt, expected);
    }

    #[test]
    fn txt_output_parses_back_into_the_same_entries() {
        let txt = render_txt(&selected(), &order());
        let entries = crate::sources::parse_source(&txt, "roundtrip");
        assert_eq!(entries.len(), 5);
        assert!(entries.iter().all(|e| e.group.is_some()));
    }

    #[tokio::test]
    async fn writes_configured_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = OutputConfig {
            directory: dir.path().join("out"),
            write_txt: false,
            ..OutputConfig::default()
        };

        let written = write_outputs(&selected(), &order(), &config).await.unwrap();
        assert_eq!(written, vec![dir.path().join("out").join("iptv_channels.m3u")]);
        assert!(written[0].exists());
    }
}
