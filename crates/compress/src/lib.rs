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

//! Threshold-gated gzip compression of the outbound payload, with a
//! base64 fallback for platforms lacking streaming gzip (not exercised on
//! this target, since `flate2` is always available, but kept as the
//! documented contract).

use std::io::Write;

use base64::Engine;
use flate2::{write::GzEncoder, Compression};

/// Errors raised while compressing a payload.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The gzip encoder failed.
    #[error("gzip compression failed: {0}")]
    Gzip(#[from] std::io::Error),
}

/// Configuration for the compressor.
#[derive(Debug, Clone, Copy)]
pub struct CompressConfig {
    /// Whether compression is attempted at all.
    pub enabled: bool,
    /// Minimum UTF-8 byte length before compression is applied.
    pub threshold: usize,
}

/// The encoding applied to a compressed payload, used to set the outbound
/// `Content-Encoding` / `Content-Type` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// No compression applied; send as `application/json`.
    Identity,
    /// Gzip applied; send as `application/octet-stream` with
    /// `Content-Encoding: gzip`.
    Gzip,
    /// Gzip unavailable; base64-encoded as a last resort, opaque to
    /// intermediaries but not smaller than the input.
    Base64,
}

/// A payload ready for transport, together with the encoding applied.
#[derive(Debug, Clone)]
pub struct CompressedPayload {
    /// The (possibly compressed) bytes.
    pub bytes: Vec<u8>,
    /// The encoding applied.
    pub encoding: Encoding,
}

impl CompressedPayload {
    /// The `Content-Type` header value for this payload.
    pub fn content_type(&self) -> &'static str {
        match self.encoding {
            Encoding::Identity => "application/json",
            Encoding::Gzip | Encoding::Base64 => "application/octet-stream",
        }
    }

    /// The `Content-Encoding` header value, if any.
    pub fn content_encoding(&self) -> Option<&'static str> {
        match self.encoding {
            Encoding::Gzip => Some("gzip"),
            Encoding::Identity | Encoding::Base64 => None,
        }
    }
}

/// Compresses `json` (the serialized envelope or report) if enabled and
/// above threshold, otherwise passes it through unmodified.
pub fn compress(config: &CompressConfig, json: &[u8]) -> Result<CompressedPayload, Error> {
    if !config.enabled || json.len() < config.threshold {
        return Ok(CompressedPayload {
            bytes: json.to_vec(),
            encoding: Encoding::Identity,
        });
    }

    match gzip(json) {
        Ok(bytes) => Ok(CompressedPayload { bytes, encoding: Encoding::Gzip }),
        Err(error) => {
            tracing::warn!(%error, "gzip compression failed, falling back to base64");
            let bytes = base64::engine::general_purpose::STANDARD.encode(json).into_bytes();
            Ok(CompressedPayload { bytes, encoding: Encoding::Base64 })
        }
    }
}

fn gzip(json: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(json)?;
    encoder.finish()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn below_threshold_passes_through_unmodified() {
        let config = CompressConfig { enabled: true, threshold: 1024 };
        let payload = compress(&config, b"small").unwrap();
        assert_eq!(payload.encoding, Encoding::Identity);
        assert_eq!(payload.bytes, b"small");
        assert_eq!(payload.content_type(), "application/json");
        assert_eq!(payload.content_encoding(), None);
    }

    #[test]
    fn above_threshold_gzips_and_shrinks_repetitive_input() {
        let config = CompressConfig { enabled: true, threshold: 10 };
        let input = "a".repeat(10_000);
        let payload = compress(&config, input.as_bytes()).unwrap();
        assert_eq!(payload.encoding, Encoding::Gzip);
        assert!(payload.bytes.len() < input.len());
        assert_eq!(payload.content_type(), "application/octet-stream");
        assert_eq!(payload.content_encoding(), Some("gzip"));
    }

    #[test]
    fn disabled_never_compresses_regardless_of_size() {
        let config = CompressConfig { enabled: false, threshold: 1 };
        let input = "a".repeat(10_000);
        let payload = compress(&config, input.as_bytes()).unwrap();
        assert_eq!(payload.encoding, Encoding::Identity);
    }

    #[test]
    fn gzip_output_round_trips() {
        let config = CompressConfig { enabled: true, threshold: 1 };
        let input = br#"{"hello":"world"}"#;
        let payload = compress(&config, input).unwrap();
        let mut decoder = flate2::read::GzDecoder::new(payload.bytes.as_slice());
        let mut out = Vec::new();
        std::io::Read::read_to_end(&mut decoder, &mut out).unwrap();
        assert_eq!(out, input);
    }
}
