//! # Cache System
//!
//! This module provides the bounded in-memory image cache. A hit lets the
//! downloader answer a request without touching the network; a finished
//! download populates it.

// Module declarations
pub mod providers;
mod types;

// Re-export primary types from our various modules
pub use types::CacheConfig;

pub use providers::{AutoPurgingImageCache, ImageCache, ImageRequestCache};
