//! A breadcrumb is a log crumb captured out-of-band by the external
//! breadcrumb recorder and snapshotted into an `ErrorReport` at format time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a breadcrumb, as surfaced by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum BreadcrumbLevel {
    /// Diagnostic detail, not normally surfaced.
    Debug,
    /// Informational event.
    Info,
    /// A condition worth flagging but not an error.
    Warning,
    /// An error-level event recorded as context for a later error.
    Error,
}

/// A single breadcrumb captured by the host application before an error
/// occurred, attached to the next `ErrorReport` as context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    /// Human-readable description of the event.
    pub message: String,
    /// Free-form category, e.g. `"navigation"` or `"http"`.
    pub category: String,
    /// Severity of the breadcrumb.
    pub level: BreadcrumbLevel,
    /// When the breadcrumb was recorded.
    pub timestamp: DateTime<Utc>,
    /// Optional structured payload attached to the breadcrumb.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Breadcrumb {
    /// Creates a new breadcrumb recorded at `timestamp`.
    pub fn new(message: impl Into<String>, category: impl Into<String>, level: BreadcrumbLevel, timestamp: DateTime<Utc>) -> Self {
        Self {
            message: message.into(),
            category: category.into(),
            level,
            timestamp,
            data: None,
        }
    }

    /// Attaches structured data to the breadcrumb.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}
