use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::CacheConfig;
use crate::error::ConfigError;

const DEFAULT_USER_AGENT: &str = concat!("imago/", env!("CARGO_PKG_VERSION"));

/// Order in which queued downloads are admitted once a slot frees up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum DownloadPrioritization {
    /// New downloads join the back of the queue (append)
    #[default]
    #[serde(alias = "append")]
    Fifo,
    /// New downloads jump to the front of the queue (insert)
    #[serde(alias = "insert")]
    Lifo,
}

impl std::fmt::Display for DownloadPrioritization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadPrioritization::Fifo => write!(f, "fifo"),
            DownloadPrioritization::Lifo => write!(f, "lifo"),
        }
    }
}

/// Configurable options for the HTTP transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Overall timeout for the entire HTTP request
    #[serde(with = "duration_secs")]
    pub timeout: Duration,

    /// Connection timeout (time to establish initial connection)
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// User agent string
    pub user_agent: String,

    /// Idle connections kept per host
    pub pool_max_idle_per_host: usize,

    /// Custom HTTP headers for requests
    #[serde(skip, default = "TransportConfig::get_default_headers")]
    pub headers: HeaderMap,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            pool_max_idle_per_host: 5,
            headers: TransportConfig::get_default_headers(),
        }
    }
}

impl TransportConfig {
    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("image/*,*/*;q=0.8"),
        );

        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );

        default_headers
    }

    /// Merge custom headers over the defaults; custom values win
    pub fn merge_headers(&mut self, headers: &HeaderMap) {
        for (name, value) in headers.iter() {
            self.headers.insert(name.clone(), value.clone());
        }
    }
}

/// Configurable options for the image downloader
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    /// Maximum number of downloads running at the same time
    pub max_active_downloads: usize,

    /// Admission order of queued downloads
    pub prioritization: DownloadPrioritization,

    /// Memory cache configuration, `None` disables caching
    pub cache: Option<CacheConfig>,

    /// Options for the default HTTP transport
    pub transport: TransportConfig,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            max_active_downloads: 4,
            prioritization: DownloadPrioritization::default(),
            cache: Some(CacheConfig::default()),
            transport: TransportConfig::default(),
        }
    }
}

impl DownloaderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_active_downloads == 0 {
            return Err(ConfigError::ZeroActiveDownloads);
        }
        if let Some(cache) = &self.cache {
            cache.validate()?;
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
