//! # Cache Providers
//!
//! This module contains the cache capability traits and their implementations.

// Re-export providers for easier access
pub use self::memory::AutoPurgingImageCache;
pub use self::provider::{ImageCache, ImageRequestCache};

// Provider interface
pub mod provider;

// Individual provider implementations
pub mod memory;
