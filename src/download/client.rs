//! HTTP transport for streaming package archives.
//!
//! The [`Transport`] trait is the seam between the pipeline and the HTTP
//! layer: transfer workers consume a byte stream plus an optional content
//! length and never touch `reqwest` directly, which keeps them exercisable
//! against in-memory transports in tests. [`HttpClient`] is the production
//! implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::Client;
use url::Url;

use super::error::DownloadError;
use crate::config::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};

/// Signs outgoing package requests.
///
/// The remote service's authentication scheme is out of scope here;
/// implementations attach whatever headers or query parameters it expects.
pub trait RequestSigner: Send + Sync {
    /// Attaches authentication material to the request.
    fn sign(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder;
}

/// A response body stream plus the content length the server exposed, if any.
pub struct TransferSource {
    /// Chunked response body. Chunk sizes are transport-determined.
    pub stream: BoxStream<'static, Result<Bytes, DownloadError>>,
    /// Content length when the server reported one. Absent for compressed
    /// or chunked responses; callers fall back to the declared size.
    pub content_length: Option<u64>,
}

/// Abstraction over the HTTP layer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs a GET for the given URL and returns the body as a stream.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] for invalid URLs, connection failures,
    /// timeouts, and non-success HTTP statuses.
    async fn fetch(&self, url: &str) -> Result<TransferSource, DownloadError>;
}

/// HTTP client for streaming package downloads.
///
/// Created once and reused for every transfer to take advantage of
/// connection pooling. Socket reads are bounded (25 s default) but there is
/// no whole-request timeout: a slow, live connection keeps streaming.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    signer: Option<Arc<dyn RequestSigner>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(concat!("coursepack/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self {
            client,
            signer: None,
        }
    }

    /// Attaches a request signer applied to every outgoing request.
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn fetch(&self, url: &str) -> Result<TransferSource, DownloadError> {
        // Validate before issuing the request so malformed catalogue URLs
        // surface as InvalidUrl rather than an opaque network error.
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let mut request = self.client.get(url);
        if let Some(signer) = &self.signer {
            request = signer.sign(request);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        let content_length = response.content_length();
        let owned_url = url.to_string();
        let stream = response
            .bytes_stream()
            .map(move |chunk| {
                chunk.map_err(|e| {
                    if e.is_timeout() {
                        DownloadError::timeout(&owned_url)
                    } else {
                        DownloadError::network(&owned_url, e)
                    }
                })
            })
            .boxed();

        Ok(TransferSource {
            stream,
            content_length,
        })
    }
}
