use iptv_core::config::{ConnectionConfig, ProbeConfig, ScoringConfig, ToolsConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub check: CheckConfig,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Xtream Codes provider account and channel cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// Provider host (`host[:port]`), optionally with an `http(s)://` scheme
    #[serde(default)]
    pub server: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Where the channel list is cached between runs
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,

    /// Read the cache instead of hitting the provider when it exists
    #[serde(default = "default_true")]
    pub use_cache: bool,

    /// Extension appended to live stream URLs (e.g. "ts" or "m3u8")
    #[serde(default)]
    pub stream_extension: Option<String>,

    /// Timeout for provider API requests, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum number of EPG entries requested per channel
    #[serde(default = "default_epg_limit")]
    pub epg_limit: u32,
}

fn default_cache_file() -> PathBuf {
    PathBuf::from("channel_cache.json")
}
fn default_true() -> bool {
    true
}
fn default_request_timeout() -> u64 {
    30
}
fn default_epg_limit() -> u32 {
    100
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            server: None,
            username: None,
            password: None,
            cache_file: default_cache_file(),
            use_cache: true,
            stream_extension: None,
            request_timeout_secs: default_request_timeout(),
            epg_limit: default_epg_limit(),
        }
    }
}

impl CatalogConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// How channel checks are run.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckConfig {
    /// Number of channels checked at the same time
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// Timeout for the ffprobe stream info lookup, in seconds
    #[serde(default = "default_info_timeout")]
    pub info_timeout_secs: u64,
}

fn default_jobs() -> usize {
    4
}
fn default_info_timeout() -> u64 {
    15
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            info_timeout_secs: default_info_timeout(),
        }
    }
}

impl CheckConfig {
    pub fn info_timeout(&self) -> Duration {
        Duration::from_secs(self.info_timeout_secs)
    }
}
