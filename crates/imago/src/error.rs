use reqwest::StatusCode;
use std::sync::Arc;

/// Failure reported by the transport that performs the actual network I/O.
///
/// The downloader treats it as opaque and hands it verbatim to every waiter,
/// so non-clonable sources are wrapped in `Arc`.
#[derive(Debug, thiserror::Error, Clone)]
pub enum TransportError {
    #[error("Network error: {source}")]
    Network {
        #[from]
        source: Arc<reqwest::Error>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: Arc<std::io::Error>,
    },

    #[error("Transport error: {0}")]
    Other(String),
}

// Manual implementation of From<reqwest::Error> for TransportError
// because of the Arc wrapping.
impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Network {
            source: Arc::new(err),
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io {
            source: Arc::new(err),
        }
    }
}

/// The transport succeeded but the payload is not a usable image.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Server returned unacceptable status code {0}")]
    UnacceptableStatus(StatusCode),

    #[error("Unacceptable content type: {0}")]
    UnacceptableContentType(String),

    #[error("Response body is empty")]
    EmptyPayload,

    #[error("Payload is not a recognized image format")]
    UnrecognizedFormat,
}

/// Error delivered to a waiter of a download.
#[derive(Debug, thiserror::Error, Clone)]
pub enum DownloadError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The waiter's receipt was cancelled before the download finished.
    #[error("Download cancelled")]
    Cancelled,

    /// The downloader (or the runtime driving it) went away before an outcome was produced.
    #[error("Downloader shut down before the download completed")]
    Shutdown,
}

impl DownloadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled)
    }
}

/// Invalid cache or downloader configuration.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_active_downloads must be at least 1")]
    ZeroActiveDownloads,

    #[error(
        "Preferred memory usage after purge ({preferred} bytes) must be below the memory capacity ({capacity} bytes)"
    )]
    PreferredUsageNotBelowCapacity { capacity: u64, preferred: u64 },

    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}
