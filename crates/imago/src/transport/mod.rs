//! # Transport
//!
//! The downloader does no network I/O itself. It hands each admitted request to
//! a [`Transport`], which reports progress while it runs and resolves to exactly
//! one terminal outcome. Cancelling a download drops the transport future.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use tokio::sync::watch;
use url::Url;

use crate::error::TransportError;
use crate::request::ImageRequest;

mod http;

pub use http::{HttpTransport, create_client};

/// Bytes received so far for one download
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadProgress {
    pub received: u64,
    /// Expected total, when the server announced one
    pub expected: Option<u64>,
}

impl DownloadProgress {
    pub fn fraction(&self) -> Option<f64> {
        match self.expected {
            Some(0) | None => None,
            Some(total) => Some(self.received as f64 / total as f64),
        }
    }
}

/// Sink for progress events of a single download
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: Arc<watch::Sender<DownloadProgress>>,
}

impl ProgressReporter {
    pub(crate) fn new(tx: Arc<watch::Sender<DownloadProgress>>) -> Self {
        Self { tx }
    }

    /// A reporter nobody listens to, for driving a transport directly
    pub fn detached() -> Self {
        let (tx, _rx) = watch::channel(DownloadProgress::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn report(&self, received: u64, expected: Option<u64>) {
        self.tx.send_replace(DownloadProgress { received, expected });
    }
}

/// Response metadata shared by every waiter of a download
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    /// Final URL of the response
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// Terminal success of a transport operation
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub info: ResponseInfo,
    pub body: Bytes,
}

/// Performs the network fetch for an admitted request
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Fetch `request`, reporting progress through `progress`.
    ///
    /// The future may be dropped at any await point when the last waiter of
    /// the download goes away.
    async fn fetch(
        &self,
        request: &ImageRequest,
        progress: &ProgressReporter,
    ) -> Result<TransportResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_fraction() {
        let progress = DownloadProgress {
            received: 25,
            expected: Some(100),
        };
        assert_eq!(progress.fraction(), Some(0.25));
        assert_eq!(DownloadProgress::default().fraction(), None);
    }

    #[test]
    fn test_reporter_publishes_latest_value() {
        let (tx, rx) = watch::channel(DownloadProgress::default());
        let reporter = ProgressReporter::new(Arc::new(tx));

        reporter.report(10, Some(40));
        reporter.report(20, Some(40));
        assert_eq!(
            *rx.borrow(),
            DownloadProgress {
                received: 20,
                expected: Some(40)
            }
        );

        // Reporting without listeners is fine
        ProgressReporter::detached().report(1, None);
    }
}
