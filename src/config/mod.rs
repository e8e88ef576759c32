use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::models::NoPassFallback;

pub mod defaults;
pub mod duration_serde;

use defaults::*;

/// Root configuration. Every tunable of a run lives here and is passed
/// explicitly into the dispatcher and selector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub naming: NamingConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub operational: OperationalConfig,
}

/// Probe, sampling and dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Maximum simultaneous in-flight probes
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Wall-clock ceiling per candidate
    #[serde(with = "duration_serde::duration", default = "default_per_probe_timeout")]
    pub per_probe_timeout: Duration,
    /// Wall-clock ceiling for the whole dispatch
    #[serde(with = "duration_serde::duration", default = "default_overall_timeout")]
    pub overall_timeout: Duration,
    /// Timeout for fetching a single manifest document
    #[serde(with = "duration_serde::duration", default = "default_fetch_timeout")]
    pub fetch_timeout: Duration,
    /// Timeout for downloading one segment prefix
    #[serde(with = "duration_serde::duration", default = "default_segment_timeout")]
    pub segment_timeout: Duration,
    /// How long to read a non-manifest endpoint when measuring throughput
    #[serde(with = "duration_serde::duration", default = "default_direct_read_duration")]
    pub direct_read_duration: Duration,
    #[serde(default = "default_max_segments_sampled")]
    pub max_segments_sampled: usize,
    /// Byte prefix downloaded from each sampled segment
    #[serde(default = "default_max_segment_bytes")]
    pub max_segment_bytes: u64,
    /// Byte cap for a direct read
    #[serde(default = "default_max_direct_bytes")]
    pub max_direct_bytes: u64,
    /// Byte cap for a manifest body
    #[serde(default = "default_max_playlist_bytes")]
    pub max_playlist_bytes: usize,
    /// Variant manifests nested deeper than this are rejected
    #[serde(default = "default_max_manifest_depth")]
    pub max_manifest_depth: usize,
    #[serde(default = "default_min_throughput_mbps")]
    pub min_throughput_mbps: f64,
    #[serde(default = "default_min_width")]
    pub min_width: u32,
    #[serde(default = "default_min_height")]
    pub min_height: u32,
    /// Let candidates with no resolution data pass the resolution threshold
    #[serde(default = "default_allow_unknown_resolution")]
    pub allow_unknown_resolution: bool,
    /// FFprobe command used to read the resolution of streams that do not
    /// declare one. Disabled when unset.
    #[serde(default)]
    pub ffprobe_command: Option<String>,
    #[serde(with = "duration_serde::duration", default = "default_ffprobe_timeout")]
    pub ffprobe_timeout: Duration,
}

/// Ranking and truncation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Maximum URLs kept per channel (0 = unlimited)
    #[serde(default = "default_max_per_channel")]
    pub max_per_channel: usize,
    #[serde(default)]
    pub no_pass_fallback: NoPassFallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(with = "duration_serde::duration", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Accept self-signed upstream certificates
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    None,
    Memory,
    File,
}

/// Probe result cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
    /// Entries older than this are treated as misses
    #[serde(with = "duration_serde::duration", default = "default_cache_ttl")]
    pub ttl: Duration,
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

/// A keyword rule mapping channel names onto a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub name: String,
    pub keywords: Vec<String>,
    /// Use the CJK-only form of the channel name when it is non-empty
    #[serde(default = "default_strip_latin")]
    pub strip_latin: bool,
}

/// Channel naming and grouping settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamingConfig {
    /// Evaluated in order; first match wins
    #[serde(default = "default_category_rules")]
    pub rules: Vec<CategoryRule>,
    /// CCTV channel number to display suffix
    #[serde(default = "default_cctv_names")]
    pub cctv_names: BTreeMap<String, String>,
    /// Group order used by the output writers
    #[serde(default = "default_group_order")]
    pub group_order: Vec<String>,
}

/// Playlist writer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
    #[serde(default = "default_m3u_file")]
    pub m3u_file: String,
    #[serde(default = "default_txt_file")]
    pub txt_file: String,
    #[serde(default = "default_true")]
    pub write_m3u: bool,
    #[serde(default = "default_true")]
    pub write_txt: bool,
}

/// Operational configuration for logging and progress reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationalConfig {
    /// Log dispatcher progress every N completed probes
    #[serde(default = "default_progress_log_interval")]
    pub progress_log_interval: usize,
}

// Probe defaults
fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_per_probe_timeout() -> Duration {
    Duration::from_secs(DEFAULT_PER_PROBE_TIMEOUT_SECS)
}

fn default_overall_timeout() -> Duration {
    Duration::from_secs(DEFAULT_OVERALL_TIMEOUT_SECS)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS)
}

fn default_segment_timeout() -> Duration {
    Duration::from_secs(DEFAULT_SEGMENT_TIMEOUT_SECS)
}

fn default_direct_read_duration() -> Duration {
    Duration::from_millis(DEFAULT_DIRECT_READ_MILLIS)
}

fn default_max_segments_sampled() -> usize {
    DEFAULT_MAX_SEGMENTS_SAMPLED
}

fn default_max_segment_bytes() -> u64 {
    DEFAULT_MAX_SEGMENT_BYTES
}

fn default_max_direct_bytes() -> u64 {
    DEFAULT_MAX_DIRECT_BYTES
}

fn default_max_playlist_bytes() -> usize {
    DEFAULT_MAX_PLAYLIST_BYTES
}

fn default_max_manifest_depth() -> usize {
    DEFAULT_MAX_MANIFEST_DEPTH
}

fn default_min_throughput_mbps() -> f64 {
    DEFAULT_MIN_THROUGHPUT_MBPS
}

fn default_min_width() -> u32 {
    DEFAULT_MIN_WIDTH
}

fn default_min_height() -> u32 {
    DEFAULT_MIN_HEIGHT
}

fn default_allow_unknown_resolution() -> bool {
    DEFAULT_ALLOW_UNKNOWN_RESOLUTION
}

fn default_ffprobe_timeout() -> Duration {
    Duration::from_secs(DEFAULT_FFPROBE_TIMEOUT_SECS)
}

// Selection defaults
fn default_max_per_channel() -> usize {
    DEFAULT_MAX_PER_CHANNEL
}

// HTTP defaults
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)
}

// Cache defaults
fn default_cache_path() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_PATH)
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(DEFAULT_CACHE_TTL_SECS)
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

// Naming defaults
fn default_strip_latin() -> bool {
    true
}

fn default_category_rules() -> Vec<CategoryRule> {
    DEFAULT_CATEGORY_RULES
        .iter()
        .map(|(name, keywords, strip_latin)| CategoryRule {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            strip_latin: *strip_latin,
        })
        .collect()
}

fn default_cctv_names() -> BTreeMap<String, String> {
    DEFAULT_CCTV_NAMES
        .iter()
        .map(|(number, name)| (number.to_string(), name.to_string()))
        .collect()
}

fn default_group_order() -> Vec<String> {
    DEFAULT_GROUP_ORDER.iter().map(|g| g.to_string()).collect()
}

// Output defaults
fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

fn default_m3u_file() -> String {
    DEFAULT_M3U_FILE.to_string()
}

fn default_txt_file() -> String {
    DEFAULT_TXT_FILE.to_string()
}

fn default_true() -> bool {
    true
}

// Operational defaults
fn default_progress_log_interval() -> usize {
    DEFAULT_PROGRESS_LOG_INTERVAL
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            per_probe_timeout: default_per_probe_timeout(),
            overall_timeout: default_overall_timeout(),
            fetch_timeout: default_fetch_timeout(),
            segment_timeout: default_segment_timeout(),
            direct_read_duration: default_direct_read_duration(),
            max_segments_sampled: default_max_segments_sampled(),
            max_segment_bytes: default_max_segment_bytes(),
            max_direct_bytes: default_max_direct_bytes(),
            max_playlist_bytes: default_max_playlist_bytes(),
            max_manifest_depth: default_max_manifest_depth(),
            min_throughput_mbps: default_min_throughput_mbps(),
            min_width: default_min_width(),
            min_height: default_min_height(),
            allow_unknown_resolution: default_allow_unknown_resolution(),
            ffprobe_command: None,
            ffprobe_timeout: default_ffprobe_timeout(),
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_per_channel: default_max_per_channel(),
            no_pass_fallback: NoPassFallback::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connect_timeout: default_connect_timeout(),
            accept_invalid_certs: false,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            path: default_cache_path(),
            ttl: default_cache_ttl(),
            capacity: default_cache_capacity(),
        }
    }
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            rules: default_category_rules(),
            cctv_names: default_cctv_names(),
            group_order: default_group_order(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            m3u_file: default_m3u_file(),
            txt_file: default_txt_file(),
            write_m3u: true,
            write_txt: true,
        }
    }
}

impl Default for OperationalConfig {
    fn default() -> Self {
        Self {
            progress_log_interval: default_progress_log_interval(),
        }
    }
}

impl ProbeConfig {
    /// Reject settings that can never produce a passing probe
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 {
            return Err("probe.concurrency must be at least 1".to_string());
        }
        if self.max_segments_sampled < 2 {
            return Err(format!(
                "probe.max_segments_sampled is {} but sampling needs at least 2 segments",
                self.max_segments_sampled
            ));
        }
        if self.max_manifest_depth == 0 {
            return Err("probe.max_manifest_depth must be at least 1".to_string());
        }
        for (name, value) in [
            ("per_probe_timeout", self.per_probe_timeout),
            ("overall_timeout", self.overall_timeout),
            ("fetch_timeout", self.fetch_timeout),
            ("segment_timeout", self.segment_timeout),
            ("direct_read_duration", self.direct_read_duration),
        ] {
            if value.is_zero() {
                return Err(format!("probe.{name} must be greater than zero"));
            }
        }
        if !self.min_throughput_mbps.is_finite() || self.min_throughput_mbps < 0.0 {
            return Err(format!(
                "probe.min_throughput_mbps must be a non-negative number, got {}",
                self.min_throughput_mbps
            ));
        }
        if self.max_segment_bytes == 0 || self.max_direct_bytes == 0 || self.max_playlist_bytes == 0
        {
            return Err("probe byte limits must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl Config {
    pub fn validate(&self) -> AppResult<()> {
        self.probe.validate().map_err(AppError::configuration)?;
        if self.output.m3u_file.trim().is_empty() || self.output.txt_file.trim().is_empty() {
            return Err(AppError::configuration("output file names must not be empty"));
        }
        Ok(())
    }

    /// Load `config_file` merged over defaults and `M3U_PROBER_*` environment
    /// variables. A missing file is created with the defaults.
    pub fn load_from_file(config_file: &str) -> AppResult<Self> {
        let path = Path::new(config_file);
        if !path.exists() {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)
                .map_err(|e| AppError::configuration(format!("Failed to render defaults: {e}")))?;
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, contents)?;
            info!("Created default config file: {}", config_file);
        }

        let config: Config = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}
