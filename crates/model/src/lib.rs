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

//! Shared data model for the reportwire error telemetry pipeline.
//!
//! This crate owns the types that flow between pipeline stages
//! (`ErrorReport`, `Breadcrumb`, `BatchEnvelope`, `QueuedItem`), the
//! deterministic `Fingerprint` used for duplicate suppression, the closed
//! `DropReason` taxonomy, and the two seams the core consumes but does not
//! implement: the durable key-value store and the network-status signal.

pub mod breadcrumb;
pub mod drop_reason;
pub mod envelope;
pub mod fingerprint;
pub mod network;
pub mod report;
pub mod store;

pub use breadcrumb::{Breadcrumb, BreadcrumbLevel};
pub use drop_reason::{DropReason, QuotaLimit};
pub use envelope::{BatchEnvelope, QueuedItem};
pub use fingerprint::Fingerprint;
pub use network::{AlwaysOnline, NetworkStatus, WatchNetworkStatus};
pub use report::{BrowserSnapshot, ErrorReport, RequestSnapshot};
pub use store::{DurableStore, FileStore, InMemoryStore, StoreError};

/// All the errors that can occur while building or manipulating the shared
/// data model.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A required field was missing from a report under construction.
    #[error("missing required field `{field}`")]
    MissingField {
        /// The name of the missing field.
        field: &'static str,
    },

    /// The durable store returned a value that could not be decoded.
    #[error("durable store value for key `{key}` could not be decoded: {reason}")]
    StoreDecode {
        /// The key under which the value was stored.
        key: String,
        /// The decode failure reason.
        reason: String,
    },
}

/// The terminal outcome of a captured report, per the pipeline's contract:
/// every admitted capture is delivered, durably queued, or dropped with
/// exactly one accounted reason.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CaptureOutcome {
    /// The report was handed off to the transport and accepted.
    Delivered,
    /// The report was appended to the offline queue for later delivery.
    Queued,
    /// The report was dropped at some stage, with exactly one reason.
    Dropped(DropReason),
}
