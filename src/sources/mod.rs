//! File-based candidate discovery
//!
//! Reads M3U or TXT channel lists into [`RawEntry`] values. Format is
//! detected from content: an `#EXTM3U` header means M3U, anything else is
//! read as a TXT genre list.

use std::path::Path;

use strum::{Display, EnumString};
use tracing::info;

use crate::errors::{SourceError, SourceResult};

pub mod m3u;
pub mod txt;

pub use m3u::parse_m3u;
pub use txt::parse_txt;

/// An unnormalized `(group?, name, url)` entry from a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub group: Option<String>,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SourceFormat {
    M3u,
    Txt,
}

pub fn detect_format(content: &str) -> SourceFormat {
    let first = content
        .lines()
        .map(|l| l.trim().trim_start_matches('\u{feff}'))
        .find(|l| !l.is_empty());
    match first {
        Some(line) if line.starts_with("#EXTM3U") || line.starts_with("#EXTINF") => {
            SourceFormat::M3u
        }
        _ => SourceFormat::Txt,
    }
}

/// Parse in-memory content; `origin` only labels log output.
pub fn parse_source(content: &str, origin: &str) -> Vec<RawEntry> {
    match detect_format(content) {
        SourceFormat::M3u => parse_m3u(content, origin),
        SourceFormat::Txt => parse_txt(content, origin),
    }
}

/// Read and parse one source file. A file with no usable entries is an error.
pub async fn load_file(path: &Path) -> SourceResult<Vec<RawEntry>> {
    let path_str = path.display().to_string();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SourceError::read(&path_str, e.to_string()))?;

    let format = detect_format(&content);
    let entries = parse_source(&content, &path_str);
    if entries.is_empty() {
        return Err(SourceError::Empty { path: path_str });
    }

    info!(source = %path_str, %format, entries = entries.len(), "Loaded candidate source");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_format_from_content() {
        assert_eq!(detect_format("\u{feff}#EXTM3U\n"), SourceFormat::M3u);
        assert_eq!(detect_format("\n\n#EXTINF:-1,a\nhttp://x"), SourceFormat::M3u);
        assert_eq!(detect_format("央视频道,#genre#\n"), SourceFormat::Txt);
        assert_eq!(detect_format(""), SourceFormat::Txt);
    }

    #[tokio::test]
    async fn load_file_reads_and_rejects_empty_sources() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("list.txt");
        std::fs::write(&good, "news,#genre#\nCCTV-1,http://a/x.manifest\n").unwrap();
        let entries = load_file(&good).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].group.as_deref(), Some("news"));

        let empty = dir.path().join("empty.m3u");
        std::fs::write(&empty, "#EXTM3U\n").unwrap();
        assert!(matches!(load_file(&empty).await, Err(SourceError::Empty { .. })));

        let missing = dir.path().join("missing.txt");
        assert!(matches!(load_file(&missing).await, Err(SourceError::Read { .. })));
    }
}
