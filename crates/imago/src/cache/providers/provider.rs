//! # Cache Provider
//!
//! This module defines the cache capability traits. [`ImageCache`] is keyed by
//! plain strings; [`ImageRequestCache`] adds request-aware conveniences that
//! derive the key the same way the downloader does.

use crate::image::Image;
use crate::key::cache_key;
use crate::request::ImageRequest;

/// A synchronous store of images keyed by string identifiers
pub trait ImageCache: Send + Sync {
    /// Insert or replace the image stored under `key`
    fn add(&self, key: &str, image: Image);

    /// Get the image stored under `key`, marking it as recently used
    fn lookup(&self, key: &str) -> Option<Image>;

    /// Remove the image stored under `key`, reporting whether one existed
    fn remove(&self, key: &str) -> bool;

    /// Remove every image, reporting whether any existed
    fn remove_all(&self) -> bool;
}

/// An [`ImageCache`] addressable by request and additional identifier
pub trait ImageRequestCache: ImageCache {
    fn add_for_request(&self, image: Image, request: &ImageRequest, identifier: Option<&str>) {
        self.add(&cache_key(request, identifier), image);
    }

    fn lookup_for_request(&self, request: &ImageRequest, identifier: Option<&str>) -> Option<Image> {
        self.lookup(&cache_key(request, identifier))
    }

    fn remove_for_request(&self, request: &ImageRequest, identifier: Option<&str>) -> bool {
        self.remove(&cache_key(request, identifier))
    }
}
