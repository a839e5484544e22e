//! # Key Derivation
//!
//! Both the memory cache and the downloader's in-flight table are keyed by the
//! string produced here, so a finished download lands exactly on the cache
//! entry later lookups will ask for.

use sha2::{Digest, Sha256};

use crate::request::ImageRequest;

/// Derive the cache and dedup key for a request and optional additional identifier.
///
/// The key is `"<METHOD> <URL>"`, followed by `" <identifier>"` when one is given.
/// Neither the method nor a serialized URL can contain a space, so everything
/// after the second space is the identifier and distinct inputs never collide.
/// The URL is in its parsed, canonical form (lowercase scheme and host, default
/// port elided, fragment removed).
pub fn cache_key(request: &ImageRequest, identifier: Option<&str>) -> String {
    let mut key = format!("{} {}", request.method(), request.url());
    if let Some(identifier) = identifier {
        key.push(' ');
        key.push_str(identifier);
    }
    key
}

/// Filename-safe digest of a key
pub fn key_digest(key: &str) -> String {
    let hash = Sha256::digest(key.as_bytes());
    format!("{hash:x}")
}
