/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Probe defaults
pub const DEFAULT_CONCURRENCY: usize = 3;
pub const DEFAULT_PER_PROBE_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_OVERALL_TIMEOUT_SECS: u64 = 30 * 60;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_SEGMENT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_DIRECT_READ_MILLIS: u64 = 3000;
pub const DEFAULT_MAX_SEGMENTS_SAMPLED: usize = 3;
pub const DEFAULT_MAX_SEGMENT_BYTES: u64 = 2 * 1024 * 1024; // 2MB
pub const DEFAULT_MAX_DIRECT_BYTES: u64 = 8 * 1024 * 1024; // 8MB
pub const DEFAULT_MAX_PLAYLIST_BYTES: usize = 256 * 1024; // 256KB
pub const DEFAULT_MAX_MANIFEST_DEPTH: usize = 5;
pub const DEFAULT_MIN_THROUGHPUT_MBPS: f64 = 1.0;
pub const DEFAULT_MIN_WIDTH: u32 = 1920;
pub const DEFAULT_MIN_HEIGHT: u32 = 1080;
pub const DEFAULT_ALLOW_UNKNOWN_RESOLUTION: bool = true;
pub const DEFAULT_FFPROBE_TIMEOUT_SECS: u64 = 5;

// Selection defaults
pub const DEFAULT_MAX_PER_CHANNEL: usize = 8;

// HTTP defaults
pub const DEFAULT_USER_AGENT: &str = concat!("m3u-prober/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

// Cache defaults
pub const DEFAULT_CACHE_PATH: &str = "./data/probe-cache.json";
pub const DEFAULT_CACHE_TTL_SECS: u64 = 6 * 60 * 60;
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

// Output defaults
pub const DEFAULT_OUTPUT_DIR: &str = ".";
pub const DEFAULT_M3U_FILE: &str = "iptv_channels.m3u";
pub const DEFAULT_TXT_FILE: &str = "iptv_channels.txt";

// Operational defaults
pub const DEFAULT_PROGRESS_LOG_INTERVAL: usize = 25;

// Environment overrides: M3U_PROBER_PROBE__CONCURRENCY=8
pub const ENV_PREFIX: &str = "M3U_PROBER_";

// Naming defaults
pub const DEFAULT_GROUP_ORDER: &[&str] = &[
    "央视频道",
    "卫视频道",
    "电影频道",
    "4K专区",
    "儿童频道",
    "轮播频道",
];

/// (group name, keywords, strip_latin)
pub const DEFAULT_CATEGORY_RULES: &[(&str, &[&str], bool)] = &[
    ("4K专区", &["4k"], true),
    ("央视频道", &["cctv", "cetv", "中央"], false),
    (
        "卫视频道",
        &[
            "卫视", "凤凰", "tvb", "湖南", "浙江", "江苏", "东方", "北京", "深圳", "山东", "天津",
            "贵州", "四川", "黑龙江", "安徽", "江西", "湖北", "东南", "辽宁", "广东", "河北",
        ],
        true,
    ),
    ("电影频道", &["电影", "影迷", "影院", "chc"], true),
    ("轮播频道", &["轮播"], true),
    (
        "儿童频道",
        &["少儿", "动画", "卡通", "金鹰", "嘉佳", "卡酷"],
        true,
    ),
];

pub const DEFAULT_CCTV_NAMES: &[(&str, &str)] = &[
    ("1", "综合"),
    ("2", "财经"),
    ("3", "综艺"),
    ("4", "国际"),
    ("5", "体育"),
    ("5+", "体育赛事"),
    ("6", "电影"),
    ("7", "国防军事"),
    ("8", "电视剧"),
    ("9", "纪录"),
    ("10", "科教"),
    ("11", "戏曲"),
    ("12", "社会与法"),
    ("13", "新闻"),
    ("14", "少儿"),
    ("15", "音乐"),
    ("16", "奥林匹克"),
    ("17", "农业农村"),
];
