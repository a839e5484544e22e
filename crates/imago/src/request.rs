//! # Image Requests
//!
//! Describes what to fetch. The request is the identity the cache and the
//! downloader agree on (see [`crate::key`]).

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

/// Whether a request may be answered from the memory cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Serve a cached image when one exists
    #[default]
    UseCache,
    /// Always go to the network; the result still populates the cache
    ReloadIgnoringCache,
}

/// A request for a remote image
#[derive(Debug, Clone)]
pub struct ImageRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    cache_policy: CachePolicy,
}

impl ImageRequest {
    /// Create a request; the URL fragment is dropped since it never reaches the server
    pub fn new(method: Method, mut url: Url) -> Self {
        url.set_fragment(None);
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            cache_policy: CachePolicy::default(),
        }
    }

    /// Create a GET request from a URL string
    pub fn get(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Method::GET, Url::parse(url)?))
    }

    /// Add a header sent with this request only
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_cache_policy(mut self, cache_policy: CachePolicy) -> Self {
        self.cache_policy = cache_policy;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }
}

impl From<Url> for ImageRequest {
    fn from(url: Url) -> Self {
        Self::new(Method::GET, url)
    }
}
