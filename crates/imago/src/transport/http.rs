use async_trait::async_trait;
use bytes::BytesMut;
use reqwest::Client;
use rustls::{ClientConfig, crypto::aws_lc_rs};
use rustls_platform_verifier::BuilderVerifierExt;
use std::sync::Arc;
use tracing::debug;

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::request::ImageRequest;
use crate::transport::{ProgressReporter, ResponseInfo, Transport, TransportResponse};

/// Upper bound for pre-allocating a body from its announced length
const MAX_PREALLOCATION: u64 = 8 * 1024 * 1024;

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &TransportConfig) -> Result<Client, TransportError> {
    // Create the crypto provider
    let provider = Arc::new(aws_lc_rs::default_provider());

    // Build platform default TLS configuration
    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::Other(format!("Failed to configure TLS versions: {e}")))?
        .with_platform_verifier()
        .map_err(|e| TransportError::Other(format!("Failed to load platform verifier: {e}")))?
        .with_no_client_auth();

    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .use_preconfigured_tls(tls_config);

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    client_builder.build().map_err(TransportError::from)
}

/// [`Transport`] backed by a reqwest [`Client`]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        Ok(Self {
            client: create_client(config)?,
        })
    }

    /// Use an already configured client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(
        &self,
        request: &ImageRequest,
        progress: &ProgressReporter,
    ) -> Result<TransportResponse, TransportError> {
        let mut response = self
            .client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone())
            .send()
            .await?;

        let expected = response.content_length();
        let info = ResponseInfo {
            url: response.url().clone(),
            status: response.status(),
            headers: response.headers().clone(),
        };
        debug!(url = %info.url, status = %info.status, expected = ?expected, "Received image response");

        let mut body = BytesMut::with_capacity(expected.unwrap_or(0).min(MAX_PREALLOCATION) as usize);
        progress.report(0, expected);
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
            progress.report(body.len() as u64, expected);
        }

        Ok(TransportResponse {
            info,
            body: body.freeze(),
        })
    }
}
