//! The `ErrorReport` is the unit that flows through the pipeline, from the
//! format stage to the transport substrate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::breadcrumb::Breadcrumb;

/// A snapshot of the browser/runtime environment at capture time. Captured
/// by an external collaborator (out of scope for the core) and attached
/// verbatim to the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BrowserSnapshot {
    /// The `navigator.userAgent` string, or platform equivalent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Viewport width in CSS pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport_width: Option<u32>,
    /// Viewport height in CSS pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport_height: Option<u32>,
}

/// A snapshot of the page/request the error occurred on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RequestSnapshot {
    /// The current page URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// The HTTP referrer, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
}

/// The unit flowing through the pipeline: a captured application error
/// together with the context needed to triage it.
///
/// Invariant: once a report exits the format stage, no stage except the
/// Redactor may mutate `message`, `stack_trace`, `context`, `user`, or
/// `breadcrumbs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Human-readable error message.
    pub message: String,
    /// Symbolic exception class name (e.g. `"TypeError"`).
    pub exception_class: String,
    /// Stack trace text, empty if unavailable.
    #[serde(default)]
    pub stack_trace: String,
    /// Source file the error originated from, or `"unknown"`.
    pub file: String,
    /// Source line, `0` if unknown.
    pub line: u32,
    /// Configured project name.
    pub project: String,
    /// Deployment environment (e.g. `"production"`).
    pub environment: String,
    /// Capture time, UTC.
    pub timestamp: DateTime<Utc>,
    /// Opaque id assigned once per process.
    pub session_id: Uuid,

    /// The reporting user, if `set_user` was called.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
    /// Arbitrary caller-supplied context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    /// Breadcrumbs leading up to the error, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub breadcrumbs: Vec<Breadcrumb>,
    /// Browser/runtime environment snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<BrowserSnapshot>,
    /// Page/request snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestSnapshot>,
    /// Source control commit hash of the running build.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    /// Application version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Free-form caller-supplied payload, distinct from `context`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<serde_json::Value>,
}

impl ErrorReport {
    /// Returns the approximate size in bytes this report would occupy once
    /// serialized to JSON. Used by the validator and quota accountant;
    /// recomputed rather than cached since redaction mutates the report
    /// in place.
    pub fn serialized_size(&self) -> usize {
        serde_json::to_vec(self).map(|bytes| bytes.len()).unwrap_or(usize::MAX)
    }
}
