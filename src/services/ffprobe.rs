//! Decode-based resolution lookup
//!
//! Streams that do not declare a resolution in their playlists can still be
//! measured by asking FFprobe for the first video stream's dimensions.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::utils::url::UrlUtils;

/// Looks up the video resolution of a stream URL
#[async_trait]
pub trait ResolutionInspector: Send + Sync {
    /// `None` when the resolution cannot be determined
    async fn inspect(&self, url: &str) -> Option<(u32, u32)>;
}

/// One stream entry from `ffprobe -show_entries stream=...`
#[derive(Debug, Clone, Deserialize)]
pub struct StreamInfo {
    #[serde(default)]
    pub codec_type: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeError {
    pub code: Option<i32>,
    pub string: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<StreamInfo>,
    error: Option<ProbeError>,
}

/// Runs an external `ffprobe` binary
#[derive(Debug, Clone)]
pub struct FfprobeInspector {
    ffprobe_command: String,
    probe_timeout: Duration,
}

impl FfprobeInspector {
    pub fn new(ffprobe_command: impl Into<String>, probe_timeout: Duration) -> Self {
        Self {
            ffprobe_command: ffprobe_command.into(),
            probe_timeout,
        }
    }

    async fn run(&self, input_url: &str) -> Result<Vec<u8>, String> {
        let mut cmd = Command::new(&self.ffprobe_command);
        cmd.args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=codec_type,width,height",
            "-analyzeduration",
            "3000000",
            "-probesize",
            "2000000",
            input_url,
        ]);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::null());
        // Dropping the future (timeout or dispatcher cancellation) kills the child
        cmd.kill_on_drop(true);

        let output = tokio::time::timeout(self.probe_timeout, cmd.output())
            .await
            .map_err(|_| format!("ffprobe timeout after {:?}", self.probe_timeout))?
            .map_err(|e| format!("failed to execute ffprobe: {e}"))?;

        Ok(output.stdout)
    }
}

/// Pick the first video stream with non-zero dimensions
pub fn parse_resolution(stdout: &[u8]) -> Result<Option<(u32, u32)>, String> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let output: FfprobeOutput =
        serde_json::from_slice(stdout).map_err(|e| format!("failed to parse ffprobe output: {e}"))?;

    if let Some(error) = output.error {
        return Err(format!(
            "ffprobe error: {} (code: {:?})",
            error.string.as_deref().unwrap_or("unknown"),
            error.code
        ));
    }

    Ok(output
        .streams
        .iter()
        .filter(|s| s.codec_type.is_empty() || s.codec_type == "video")
        .find_map(|s| match (s.width, s.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }))
}

#[async_trait]
impl ResolutionInspector for FfprobeInspector {
    async fn inspect(&self, url: &str) -> Option<(u32, u32)> {
        let safe_url = UrlUtils::obfuscate_credentials(url);
        let stdout = match self.run(url).await {
            Ok(stdout) => stdout,
            Err(e) => {
                warn!(url = %safe_url, error = %e, "FFprobe did not complete");
                return None;
            }
        };

        match parse_resolution(&stdout) {
            Ok(resolution) => {
                debug!(url = %safe_url, ?resolution, "FFprobe resolution lookup");
                resolution
            }
            Err(e) => {
                debug!(url = %safe_url, error = %e, "FFprobe reported no usable video stream");
                None
            }
        }
    }
}
