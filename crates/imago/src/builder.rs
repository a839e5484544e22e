//! # Builder for ImageDownloader
//!
//! This module provides a builder pattern implementation for assembling an
//! [`ImageDownloader`] from its configuration and pluggable parts with a fluent API.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use imago_engine::{DownloadPrioritization, ImageDownloader};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = ImageDownloader::builder()
//!     .with_max_active_downloads(8)
//!     .with_prioritization(DownloadPrioritization::Lifo)
//!     .with_timeout(Duration::from_secs(60))
//!     .with_user_agent("MyApp/1.0")
//!     .with_header("X-Api-Key", "my-secret-key")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use tokio::runtime::Handle;

use crate::cache::{AutoPurgingImageCache, CacheConfig, ImageRequestCache};
use crate::config::{DownloadPrioritization, DownloaderConfig};
use crate::decode::{ImageDecoder, ImageResponseDecoder};
use crate::downloader::ImageDownloader;
use crate::error::ConfigError;
use crate::transport::{HttpTransport, Transport};

/// Builder for creating ImageDownloader instances with a fluent API
#[derive(Clone, Default)]
pub struct ImageDownloaderBuilder {
    /// Internal config being built
    config: DownloaderConfig,
    image_cache: Option<Arc<dyn ImageRequestCache>>,
    transport: Option<Arc<dyn Transport>>,
    decoder: Option<Arc<dyn ImageDecoder>>,
    runtime: Option<Handle>,
}

impl ImageDownloaderBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: DownloaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_max_active_downloads(mut self, max_active_downloads: usize) -> Self {
        self.config.max_active_downloads = max_active_downloads;
        self
    }

    pub fn with_prioritization(mut self, prioritization: DownloadPrioritization) -> Self {
        self.config.prioritization = prioritization;
        self
    }

    /// Set the configuration of the built-in memory cache
    pub fn with_cache_config(mut self, cache_config: CacheConfig) -> Self {
        self.config.cache = Some(cache_config);
        self
    }

    /// Use an existing cache instead of building one from the configuration
    pub fn with_image_cache(mut self, image_cache: Arc<dyn ImageRequestCache>) -> Self {
        self.image_cache = Some(image_cache);
        self
    }

    /// Disable caching entirely
    pub fn without_cache(mut self) -> Self {
        self.config.cache = None;
        self.image_cache = None;
        self
    }

    /// Set the overall timeout for the entire HTTP request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.transport.timeout = timeout;
        self
    }

    /// Set the connection timeout (time to establish initial connection)
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.transport.connect_timeout = timeout;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.transport.user_agent = user_agent.into();
        self
    }

    /// Add a custom HTTP header
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.as_ref().parse::<reqwest::header::HeaderName>(),
            HeaderValue::from_str(value.as_ref()),
        ) {
            self.config.transport.headers.insert(name, value);
        }
        self
    }

    /// Merge custom HTTP headers over the defaults
    pub fn with_headers(mut self, headers: &HeaderMap) -> Self {
        self.config.transport.merge_headers(headers);
        self
    }

    /// Use a custom transport. The transport options of the configuration are then ignored.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Runtime the transport operations are spawned on, defaults to the current one
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the ImageDownloader instance
    pub fn build(self) -> Result<ImageDownloader, ConfigError> {
        self.config.validate()?;

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| ConfigError::NoRuntime(e.to_string()))?,
        };

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                HttpTransport::new(&self.config.transport)
                    .map_err(|e| ConfigError::Client(e.to_string()))?,
            ),
        };

        let image_cache = match (self.image_cache, self.config.cache) {
            (Some(image_cache), _) => Some(image_cache),
            (None, Some(cache_config)) => Some(
                Arc::new(AutoPurgingImageCache::new(cache_config)?) as Arc<dyn ImageRequestCache>
            ),
            (None, None) => None,
        };

        let decoder = self
            .decoder
            .unwrap_or_else(|| Arc::new(ImageResponseDecoder::default()));

        Ok(ImageDownloader::from_parts(
            &self.config,
            image_cache,
            transport,
            decoder,
            runtime,
        ))
    }
}
