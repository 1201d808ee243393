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

//! Size/time/bytes-triggered batch aggregation.
//!
//! The aggregator itself holds no timer: the caller (the pipeline
//! Coordinator, which owns the async runtime) polls [`BatchAggregator::
//! check_timeout`] on its own timer tick. This mirrors the teacher's
//! `Signal::TimerTick` pattern, where the timer lives at the edge and the
//! stage only reacts to it.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reportwire_model::{BatchEnvelope, ErrorReport};

/// Configuration for the batch aggregator.
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    /// Whether batching is enabled at all. When `false`, every admitted
    /// report is wrapped in a one-element envelope and returned
    /// immediately from `enqueue`.
    pub enabled: bool,
    /// Flush once the batch reaches this many reports.
    pub max_size: usize,
    /// Flush once the batch's estimated serialized size reaches this many
    /// bytes.
    pub max_payload_size: usize,
    /// Flush once this much time has elapsed since the first report was
    /// enqueued into the current batch.
    pub max_wait_ms: i64,
}

struct State {
    reports: Vec<ErrorReport>,
    first_enqueued_at: Option<DateTime<Utc>>,
}

/// Accumulates admitted reports into a batch, flushing on whichever
/// trigger fires first: size, estimated bytes, or time.
pub struct BatchAggregator {
    config: BatchConfig,
    state: Mutex<State>,
}

impl BatchAggregator {
    /// Creates a new, empty batch aggregator.
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State {
                reports: Vec::new(),
                first_enqueued_at: None,
            }),
        }
    }

    /// Adds `report` to the current batch at `now`. Returns a flushed
    /// envelope if adding it triggers a size or byte-size flush, or if
    /// batching is disabled (in which case the report is returned
    /// immediately in a one-element envelope, never touching the batch).
    pub fn enqueue(&self, report: ErrorReport, now: DateTime<Utc>) -> Option<BatchEnvelope> {
        if !self.config.enabled {
            return Some(BatchEnvelope::single(report, now));
        }

        let mut state = self.state.lock();
        if state.reports.is_empty() {
            state.first_enqueued_at = Some(now);
        }
        state.reports.push(report);

        if state.reports.len() >= self.config.max_size {
            return Some(Self::drain(&mut state, now));
        }

        if Self::estimated_bytes(&state.reports) >= self.config.max_payload_size {
            return Some(Self::drain(&mut state, now));
        }

        None
    }

    /// Checks whether the current batch has been open for at least
    /// `max_wait_ms`, flushing it if so. Intended to be called on a
    /// recurring timer tick owned by the caller.
    pub fn check_timeout(&self, now: DateTime<Utc>) -> Option<BatchEnvelope> {
        let mut state = self.state.lock();
        let first_enqueued_at = state.first_enqueued_at?;
        if now.signed_duration_since(first_enqueued_at) >= chrono::Duration::milliseconds(self.config.max_wait_ms) {
            Some(Self::drain(&mut state, now))
        } else {
            None
        }
    }

    /// Flushes the current batch unconditionally, if non-empty. Called on
    /// teardown to guarantee one final flush.
    pub fn flush(&self, now: DateTime<Utc>) -> Option<BatchEnvelope> {
        let mut state = self.state.lock();
        if state.reports.is_empty() {
            None
        } else {
            Some(Self::drain(&mut state, now))
        }
    }

    /// Returns the number of reports currently held in the open batch.
    pub fn current_len(&self) -> usize {
        self.state.lock().reports.len()
    }

    fn drain(state: &mut State, now: DateTime<Utc>) -> BatchEnvelope {
        let reports = std::mem::take(&mut state.reports);
        state.first_enqueued_at = None;
        BatchEnvelope::new(reports, now)
    }

    fn estimated_bytes(reports: &[ErrorReport]) -> usize {
        reports.iter().map(ErrorReport::serialized_size).sum()
    }
}

#[cfg(test)]
mod test {
    use chrono::Duration;
    use uuid::Uuid;

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

    fn config() -> BatchConfig {
        BatchConfig {
            enabled: true,
            max_size: 5,
            max_payload_size: 1_000_000,
            max_wait_ms: 5000,
        }
    }

    #[test]
    fn five_rapid_captures_flush_a_single_envelope_of_five() {
        let aggregator = BatchAggregator::new(config());
        let now = Utc::now();
        let mut flushed = None;
        for _ in 0..5 {
            flushed = aggregator.enqueue(report(), now).or(flushed);
        }
        let envelope = flushed.expect("batch should flush at max_size");
        assert_eq!(envelope.count, 5);
        assert_eq!(aggregator.current_len(), 0);
    }

    #[test]
    fn two_captures_then_idle_flush_on_timer() {
        let aggregator = BatchAggregator::new(config());
        let now = Utc::now();
        assert!(aggregator.enqueue(report(), now).is_none());
        assert!(aggregator.enqueue(report(), now).is_none());
        assert!(aggregator.check_timeout(now + Duration::milliseconds(4_999)).is_none());

        let envelope = aggregator
            .check_timeout(now + Duration::milliseconds(5_000))
            .expect("batch should flush on timeout");
        assert_eq!(envelope.count, 2);
    }

    #[test]
    fn disabled_batching_wraps_each_report_immediately() {
        let aggregator = BatchAggregator::new(BatchConfig { enabled: false, ..config() });
        let envelope = aggregator.enqueue(report(), Utc::now()).expect("immediate envelope");
        assert_eq!(envelope.count, 1);
        assert_eq!(aggregator.current_len(), 0);
    }

    #[test]
    fn byte_size_trigger_flushes_before_max_size_is_reached() {
        let aggregator = BatchAggregator::new(BatchConfig {
            max_payload_size: 300,
            max_size: 100,
            ..config()
        });
        let now = Utc::now();
        assert!(aggregator.enqueue(report(), now).is_none());
        let envelope = aggregator.enqueue(report(), now);
        assert!(envelope.is_some(), "second report should cross the byte threshold");
    }

    #[test]
    fn teardown_flush_drains_a_partial_batch() {
        let aggregator = BatchAggregator::new(config());
        let now = Utc::now();
        let _ = aggregator.enqueue(report(), now);
        let envelope = aggregator.flush(now).expect("teardown flush should drain");
        assert_eq!(envelope.count, 1);
        assert!(aggregator.flush(now).is_none());
    }
}
