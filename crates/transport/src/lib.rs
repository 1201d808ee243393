#![deny(
    trivial_numeric_casts,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    unused_results
)]
#![warn(rust_2021_compatibility, unreachable_pub)]

//! The transport substrate: compresses a [`BatchEnvelope`] and POSTs it to
//! the configured webhook, classifying the outcome for the retry executor.

/// Test doubles for exercising code that depends on [`Transport`] without a
/// real network.
pub mod testing;

use async_trait::async_trait;
use reportwire_compress::{compress, CompressConfig};
use reportwire_model::BatchEnvelope;
use reportwire_retry::Retryable;

/// Errors raised while delivering an envelope to the webhook.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The envelope could not be serialized to JSON.
    #[error("envelope serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Compression of the serialized envelope failed.
    #[error("compression failed: {0}")]
    Compress(#[from] reportwire_compress::Error),

    /// The underlying HTTP client failed (connection, DNS, TLS, timeout).
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    /// The webhook responded with a non-success status.
    #[error("webhook responded with status {status}")]
    Status {
        /// The HTTP status code returned.
        status: u16,
    },
}

impl Error {
    /// Builds a `Status` error for the given HTTP status code. The only way
    /// for downstream crates to construct this non-exhaustive error, since
    /// it is also used from test doubles outside this crate.
    pub fn status(code: u16) -> Self {
        Error::Status { status: code }
    }
}

impl Retryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Serialize(_) | Error::Compress(_) => false,
            Error::Http(error) => !error.is_status() || error.is_timeout() || error.is_connect(),
            Error::Status { status } => !matches!(status, 400 | 401 | 403 | 404),
        }
    }
}

/// The transport trait: delivers a batch envelope (or a one-element
/// envelope wrapping a single report) to the ingestion webhook.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `envelope`, returning once the webhook has accepted or
    /// rejected it.
    async fn send(&self, envelope: &BatchEnvelope) -> Result<(), Error>;
}

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// The ingestion webhook URL.
    pub webhook_url: String,
    /// Per-request timeout.
    pub timeout: std::time::Duration,
    /// Compression configuration applied to the serialized envelope.
    pub compress: CompressConfig,
    /// `User-Agent` header value identifying this SDK.
    pub user_agent: String,
}

/// The default HTTPS transport, backed by `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
    config: TransportConfig,
}

impl HttpTransport {
    /// Builds a new transport from `config`, constructing its own
    /// `reqwest::Client` bound to the configured timeout.
    pub fn new(config: TransportConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, envelope: &BatchEnvelope) -> Result<(), Error> {
        let body = if envelope.reports.len() == 1 {
            serde_json::to_vec(&envelope.reports[0])?
        } else {
            serde_json::to_vec(&envelope.reports)?
        };

        let payload = compress(&self.config.compress, &body)?;

        let mut request = self
            .client
            .post(&self.config.webhook_url)
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .header(reqwest::header::CONTENT_TYPE, payload.content_type())
            .body(payload.bytes);

        if let Some(encoding) = payload.content_encoding() {
            request = request.header(reqwest::header::CONTENT_ENCODING, encoding);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(Error::Status { status: status.as_u16() });
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn non_retryable_statuses_match_spec() {
        for status in [400, 401, 403, 404] {
            assert!(!Error::Status { status }.is_retryable(), "status {status} should be non-retryable");
        }
    }

    #[test]
    fn server_errors_are_retryable() {
        for status in [500, 502, 503] {
            assert!(Error::Status { status }.is_retryable(), "status {status} should be retryable");
        }
    }

    #[test]
    fn serialization_and_compression_failures_are_never_retryable() {
        let serialize_err = Error::Serialize(serde_json::from_str::<()>("not json").unwrap_err());
        assert!(!serialize_err.is_retryable());
    }
}
