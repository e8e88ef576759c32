//! M3U playlist source parsing
//!
//! Supports plain and extended M3U: `#EXTINF:-1 group-title="G",Name`
//! followed by the stream URL line.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::RawEntry;

#[derive(Debug, Default)]
struct PendingEntry {
    name: String,
    group: Option<String>,
}

/// Parse M3U content into raw entries.
pub fn parse_m3u(content: &str, origin: &str) -> Vec<RawEntry> {
    let mut entries = Vec::new();
    let mut pending: Option<PendingEntry> = None;

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim().trim_start_matches('\u{feff}');

        if line.is_empty() || line.starts_with('#') && !line.starts_with("#EXTINF") {
            continue;
        }

        if line.starts_with("#EXTINF") {
            pending = parse_extinf_line(line);
            if pending.is_none() {
                warn!(source = origin, line = line_num + 1, "Skipping malformed EXTINF line");
            }
            continue;
        }

        match pending.take() {
            Some(entry) => entries.push(RawEntry {
                group: entry.group,
                name: entry.name,
                url: line.to_string(),
            }),
            None => {
                debug!(
                    source = origin,
                    line = line_num + 1,
                    "Stream URL without EXTINF metadata, skipping"
                );
            }
        }
    }

    entries
}

/// `#EXTINF:duration attrs,title`
fn parse_extinf_line(line: &str) -> Option<PendingEntry> {
    let content = line.strip_prefix("#EXTINF:").unwrap_or(line);
    let comma = find_unquoted_comma(content)?;
    let (duration_and_attrs, title) = content.split_at(comma);
    let title = title.trim_start_matches(',').trim();

    let attributes = parse_extinf_attributes(duration_and_attrs);
    let name = if title.is_empty() {
        attributes.get("tvg-name").cloned().unwrap_or_default()
    } else {
        title.to_string()
    };
    if name.is_empty() {
        return None;
    }

    Some(PendingEntry {
        name,
        group: attributes
            .get("group-title")
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty()),
    })
}

fn find_unquoted_comma(s: &str) -> Option<usize> {
    let mut in_quotes = false;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

/// Parse `key="value"` pairs; unquoted values end at whitespace.
fn parse_extinf_attributes(attrs_part: &str) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    let mut chars = attrs_part.chars().peekable();
    let mut key = String::new();
    let mut value = String::new();
    let mut in_quotes = false;
    let mut in_value = false;

    while let Some(ch) = chars.next() {
        match ch {
            ' ' | '\t' if !in_quotes => {
                if in_value && !key.is_empty() {
                    attributes.insert(key.to_lowercase(), value.clone());
                }
                key.clear();
                value.clear();
                in_value = false;
            }
            '=' if !in_quotes && !in_value => {
                in_value = true;
                if chars.peek() == Some(&'"') {
                    chars.next();
                    in_quotes = true;
                }
            }
            '"' if in_quotes => {
                in_quotes = false;
                if !key.is_empty() {
                    attributes.insert(key.to_lowercase(), value.clone());
                }
                key.clear();
                value.clear();
                in_value = false;
            }
            _ if in_value => value.push(ch),
            _ => key.push(ch),
        }
    }

    if in_value && !key.is_empty() && !value.is_empty() {
        attributes.insert(key.to_lowercase(), value);
    }

    attributes
}
