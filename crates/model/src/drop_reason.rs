//! The closed taxonomy of reasons a report can be dropped, shared by every
//! stage so the Health Monitor can keep per-reason sub-totals without
//! resorting to free-form strings.

use std::fmt;

/// Which quota limit rejected a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum QuotaLimit {
    /// The serialized payload exceeded the configured size limit.
    PayloadSize,
    /// The rolling burst-window limit was exceeded.
    Burst,
    /// The daily limit was exceeded.
    Daily,
    /// The monthly limit was exceeded.
    Monthly,
}

impl fmt::Display for QuotaLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QuotaLimit::PayloadSize => "payload-size",
            QuotaLimit::Burst => "burst",
            QuotaLimit::Daily => "daily",
            QuotaLimit::Monthly => "monthly",
        };
        f.write_str(label)
    }
}

/// The reason a captured report did not reach the transport.
///
/// Every drop is recorded with exactly one of these reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum DropReason {
    /// The SDK was constructed but `enabled` is false, or `destroy()` was
    /// called.
    SdkDisabled,
    /// A capture call arrived before initialization completed.
    NotInitialized,
    /// The report failed schema or size validation.
    ValidationFailed,
    /// The `beforeSend` hook returned a nullish value.
    FilteredByUser,
    /// The per-window request cap was exceeded.
    RateLimited,
    /// The fingerprint was seen again within the duplicate window.
    DuplicateSuppressed,
    /// A quota limit was exceeded; see the nested `QuotaLimit`.
    QuotaExceeded(QuotaLimit),
    /// The circuit breaker is open and offline queuing is disabled.
    CircuitOpenOfflineDisabled,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::SdkDisabled => f.write_str("SDK disabled"),
            DropReason::NotInitialized => f.write_str("SDK not initialized"),
            DropReason::ValidationFailed => f.write_str("Validation failed"),
            DropReason::FilteredByUser => f.write_str("Filtered by user"),
            DropReason::RateLimited => f.write_str("Rate limit exceeded"),
            DropReason::DuplicateSuppressed => f.write_str("Duplicate error"),
            DropReason::QuotaExceeded(limit) => write!(f, "Quota exceeded ({limit})"),
            DropReason::CircuitOpenOfflineDisabled => f.write_str("Circuit open, offline support disabled"),
        }
    }
}
