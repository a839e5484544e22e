//! # Imago
//!
//! A library for downloading images with a bounded in-memory cache.
//! Routes every request through a single coordinator that shares work
//! between identical requests and keeps the network load bounded.
//!
//! ## Features
//!
//! - Least-recently-used memory cache with automatic purging
//! - Request coalescing: one transport operation per cache key
//! - Configurable concurrency ceiling with FIFO or LIFO admission
//! - Per-receipt cancellation that only aborts work nobody waits for
//! - Pluggable transport and response decoding

pub mod builder;
pub mod cache;
pub mod config;
pub mod decode;
pub mod downloader;
pub mod error;
pub mod image;
pub mod key;
pub mod request;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use builder::ImageDownloaderBuilder;
pub use cache::{AutoPurgingImageCache, CacheConfig, ImageCache, ImageRequestCache};
pub use config::{DownloadPrioritization, DownloaderConfig, TransportConfig};
pub use decode::{ImageDecoder, ImageResponseDecoder};
pub use error::{ConfigError, DecodeError, DownloadError, TransportError};
pub use image::{Image, ImageFormat};
pub use key::{cache_key, key_digest};
pub use request::{CachePolicy, ImageRequest};

// Re-export downloader types
pub use downloader::{
    CancelOutcome, DownloadHandle, DownloadResult, Downloaded, Fetch, ImageDownloader, Receipt,
};

// Re-export transport types
pub use transport::{
    DownloadProgress, HttpTransport, ProgressReporter, ResponseInfo, Transport,
    TransportResponse, create_client,
};
