//! Aggregate wire types built on top of `ErrorReport`: the offline queue's
//! `QueuedItem` and the batch aggregator's `BatchEnvelope`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::report::ErrorReport;

/// An item held in the offline queue awaiting delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedItem {
    /// Unique id assigned at enqueue time.
    pub id: Uuid,
    /// The queued report.
    pub report: ErrorReport,
    /// When the item was enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// Number of delivery failures observed so far. Does not count the
    /// initial attempt that caused the item to be queued.
    pub attempts: u32,
}

impl QueuedItem {
    /// Creates a new queued item with zero attempts.
    pub fn new(report: ErrorReport, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            report,
            enqueued_at,
            attempts: 0,
        }
    }

    /// Returns whether this item has exceeded the delivery failure budget
    /// (3 attempts, per the offline queue's retirement rule).
    pub fn exhausted(&self) -> bool {
        self.attempts >= 3
    }

    /// Returns whether this item is older than `max_age` measured from
    /// `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now.signed_duration_since(self.enqueued_at) >= max_age
    }
}

/// A batch wrapper grouping one or more reports for a single transport call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEnvelope {
    /// Unique within the process.
    pub batch_id: Uuid,
    /// When the batch was created (the first report's admission time).
    pub created_at: DateTime<Utc>,
    /// Number of reports in the batch; kept in sync with `reports.len()`.
    pub count: usize,
    /// The reports, in enqueue order.
    pub reports: Vec<ErrorReport>,
}

impl BatchEnvelope {
    /// Wraps `reports` into a new envelope, created now.
    pub fn new(reports: Vec<ErrorReport>, created_at: DateTime<Utc>) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            created_at,
            count: reports.len(),
            reports,
        }
    }

    /// Wraps a single report into a one-element envelope, used when
    /// batching is disabled.
    pub fn single(report: ErrorReport, created_at: DateTime<Utc>) -> Self {
        Self::new(vec![report], created_at)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn report() -> ErrorReport {
        ErrorReport {
            message: "boom".into(),
            exception_class: "Error".into(),
            stack_trace: String::new(),
            file: "file.ts".into(),
            line: 10,
            project: "p".into(),
            environment: "production".into(),
            timestamp: Utc::now(),
            session_id: Uuid::new_v4(),
            user: None,
            context: None,
            breadcrumbs: vec![],
            browser: None,
            request: None,
            commit_hash: None,
            version: None,
            custom_data: None,
        }
    }

    #[test]
    fn exhausted_after_three_attempts() {
        let mut item = QueuedItem::new(report(), Utc::now());
        assert!(!item.exhausted());
        item.attempts = 3;
        assert!(item.exhausted());
    }

    #[test]
    fn expires_after_max_age() {
        let item = QueuedItem {
            enqueued_at: Utc::now() - chrono::Duration::days(2),
            ..QueuedItem::new(report(), Utc::now())
        };
        assert!(item.is_expired(Utc::now(), chrono::Duration::days(1)));
        assert!(!item.is_expired(Utc::now(), chrono::Duration::days(3)));
    }

    #[test]
    fn envelope_count_matches_reports() {
        let envelope = BatchEnvelope::new(vec![report(), report()], Utc::now());
        assert_eq!(envelope.count, 2);
        assert_eq!(envelope.reports.len(), 2);
    }
}
