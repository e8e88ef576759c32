//! Lightweight M3U8 analysis
//!
//! Only the parts needed to pick a rendition and enumerate segments are
//! understood: `#EXT-X-STREAM-INF` variant entries and bare segment URIs.
//! Everything else is ignored.

/// A rendition listed by a master playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterVariant {
    pub bandwidth: u64,
    pub resolution: Option<(u32, u32)>,
    pub uri: String,
}

impl MasterVariant {
    /// Pixel area, 0 when the rendition declares no resolution
    pub fn area(&self) -> u64 {
        self.resolution
            .map(|(w, h)| u64::from(w) * u64::from(h))
            .unwrap_or(0)
    }
}

/// Structural summary of a playlist body
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PlaylistAnalysis {
    pub is_master: bool,
    pub variants: Vec<MasterVariant>,
    /// Segment URIs as written, in playlist order
    pub segments: Vec<String>,
}

/// Classify a playlist body and extract its entries.
pub fn analyze_playlist(text: &str) -> PlaylistAnalysis {
    let mut a = PlaylistAnalysis::default();
    let mut pending: Option<(u64, Option<(u32, u32)>)> = None;

    for raw_line in text.lines() {
        let line = raw_line.trim().trim_start_matches('\u{feff}');
        if line.is_empty() {
            continue;
        }
        if let Some(attrs) = line.strip_prefix("#EXT-X-STREAM-INF") {
            a.is_master = true;
            pending = Some(parse_stream_inf(attrs.trim_start_matches(':')));
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        // URI line: belongs to the preceding STREAM-INF, otherwise a segment
        if let Some((bandwidth, resolution)) = pending.take() {
            a.variants.push(MasterVariant {
                bandwidth,
                resolution,
                uri: line.to_string(),
            });
        } else {
            a.segments.push(line.to_string());
        }
    }

    a
}

/// Parse the attribute list of an `#EXT-X-STREAM-INF` tag.
///
/// Quoted attribute values (e.g. `CODECS="avc1.4d401f,mp4a.40.2"`) may
/// contain commas, so the list is split outside quotes only.
fn parse_stream_inf(attrs: &str) -> (u64, Option<(u32, u32)>) {
    let mut bandwidth = 0;
    let mut resolution = None;

    for part in split_attributes(attrs) {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_uppercase().as_str() {
            "BANDWIDTH" => {
                if let Ok(bw) = value.trim().parse::<u64>() {
                    bandwidth = bw;
                }
            }
            "RESOLUTION" => {
                let value = value.trim().trim_matches('"');
                if let Some((w, h)) = value.split_once(['x', 'X'])
                    && let (Ok(w), Ok(h)) = (w.parse::<u32>(), h.parse::<u32>())
                {
                    resolution = Some((w, h));
                }
            }
            _ => {}
        }
    }

    (bandwidth, resolution)
}

fn split_attributes(attrs: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in attrs.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&attrs[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&attrs[start..]);
    parts
}

/// Index of the rendition with the strictly largest pixel area; the first
/// listed wins ties.
pub fn best_variant(variants: &[MasterVariant]) -> Option<&MasterVariant> {
    let mut best: Option<&MasterVariant> = None;
    for v in variants {
        match best {
            Some(b) if v.area() <= b.area() => {}
            _ => best = Some(v),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_variant_parse_orders_in_source_sequence() {
        let playlist = r#"#EXTM3U
#EXT-X-VERSION:4
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360
low/playlist.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=1600000,RESOLUTION=1280x720
mid/playlist.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=4000000,RESOLUTION=1920x1080
hi/playlist.m3u8
"#;
        let a = analyze_playlist(playlist);
        assert!(a.is_master);
        assert!(a.segments.is_empty());
        assert_eq!(a.variants.len(), 3);
        assert_eq!(a.variants[0].resolution, Some((640, 360)));
        assert_eq!(a.variants[2].bandwidth, 4_000_000);
        assert_eq!(a.variants[2].uri, "hi/playlist.m3u8");
    }

    #[test]
    fn quoted_codecs_do_not_break_attribute_parsing() {
        let playlist = "#EXTM3U\n\
#EXT-X-STREAM-INF:BANDWIDTH=500000,CODECS=\"avc1.4d401f,mp4a.40.2\",RESOLUTION=1280x720\n\
a.m3u8\n";
        let a = analyze_playlist(playlist);
        assert_eq!(a.variants[0].bandwidth, 500_000);
        assert_eq!(a.variants[0].resolution, Some((1280, 720)));
    }

    #[test]
    fn media_playlist_collects_segments() {
        let playlist = "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXTINF:6.0,\nseg1.ts\n#EXTINF:6.0,\nseg2.ts?x=1\n";
        let a = analyze_playlist(playlist);
        assert!(!a.is_master);
        assert_eq!(a.segments, vec!["seg1.ts", "seg2.ts?x=1"]);
    }

    #[test]
    fn best_variant_prefers_area_then_first_listed() {
        let v = |w, h, uri: &str| MasterVariant {
            bandwidth: 0,
            resolution: Some((w, h)),
            uri: uri.to_string(),
        };
        let variants = vec![v(640, 360, "a"), v(1920, 1080, "b"), v(1080, 1920, "c")];
        assert_eq!(best_variant(&variants).unwrap().uri, "b");

        let unknown = MasterVariant {
            bandwidth: 9,
            resolution: None,
            uri: "u".to_string(),
        };
        assert_eq!(best_variant(&[unknown.clone(), v(1, 1, "d")]).unwrap().uri, "d");
        assert_eq!(best_variant(&[unknown]).unwrap().uri, "u");
        assert!(best_variant(&[]).is_none());
    }

    #[test]
    fn bare_lines_are_segments() {
        // The resolver rejects such bodies earlier by the missing #EXTM3U header
        let a = analyze_playlist("<html><body>nope</body></html>");
        assert_eq!(a.segments, vec!["<html><body>nope</body></html>"]);
        assert_eq!(analyze_playlist(""), PlaylistAnalysis::default());
    }
}
