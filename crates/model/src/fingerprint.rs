//! Deterministic fingerprinting for duplicate suppression.
//!
//! A fingerprint is derived from `(message, file, line)`. It is not
//! security-sensitive: it only needs to alias identical call sites and stay
//! stable across process restarts, so a fast non-cryptographic-strength
//! hash is appropriate. `blake3` is used here purely for its speed and
//! uniform output, not for any collision-resistance guarantee.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::report::ErrorReport;

/// A short opaque string derived deterministically from `(message, file,
/// line)`. Equal triples produce equal fingerprints; cosmetic variations in
/// interpolated values that appear in `message` necessarily alias, which is
/// accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of a report from its `message`, `file`, and
    /// `line`.
    pub fn of(report: &ErrorReport) -> Self {
        Self::compute(&report.message, &report.file, report.line)
    }

    /// Computes the fingerprint of the given triple directly, without
    /// requiring a full `ErrorReport`.
    pub fn compute(message: &str, file: &str, line: u32) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(message.as_bytes());
        hasher.update(b"\0");
        hasher.update(file.as_bytes());
        hasher.update(b"\0");
        hasher.update(&line.to_le_bytes());
        Self(hasher.finalize().to_hex()[..16].to_string())
    }

    /// Returns the fingerprint as a plain string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
