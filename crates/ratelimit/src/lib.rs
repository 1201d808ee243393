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

//! Per-window request cap and fingerprint duplicate suppression.
//!
//! Admission is split from marking: `check` is a pure read that may be
//! called speculatively, `mark` is only invoked once a report has fully
//! admitted through every later stage, per the Coordinator's charge-after-
//! admit ordering.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use reportwire_model::{ErrorReport, Fingerprint};

/// Configuration for the rate limiter.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    /// Width of the rolling admission window.
    pub window_ms: i64,
    /// Maximum admitted requests within `window_ms`.
    pub max_requests: u32,
    /// Width of the duplicate-suppression window for a given fingerprint.
    pub duplicate_window_ms: i64,
}

/// The outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionDecision {
    /// Whether the report may proceed to the next stage.
    pub allowed: bool,
    /// Remaining admissions in the current window, `max(0, max_requests -
    /// observed)`. Deliberately not tied to a literal constant (see the
    /// redesign flag on the `rateLimitRemaining` computation).
    pub remaining: u32,
    /// When the oldest timestamp in the window expires.
    pub reset_at: DateTime<Utc>,
    /// Populated when `allowed` is `false`.
    pub reason: Option<&'static str>,
}

#[derive(Debug, Default)]
struct State {
    request_timestamps: VecDeque<DateTime<Utc>>,
    fingerprint_last_seen: HashMap<Fingerprint, DateTime<Utc>>,
}

/// A rate limiter guarding the pipeline against request floods and
/// immediate duplicate resubmission.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    state: Mutex<State>,
}

impl RateLimiter {
    /// Creates a new rate limiter with the given configuration.
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::default()),
        }
    }

    /// Checks whether `report` may be admitted at `now`, without recording
    /// it. The duplicate check is only evaluated once the window-count cap
    /// has admitted, per the stage ordering in the pipeline spec.
    pub fn check(&self, report: &ErrorReport, now: DateTime<Utc>) -> AdmissionDecision {
        let mut state = self.state.lock();
        self.sweep_locked(&mut state, now);

        let reset_at = state
            .request_timestamps
            .front()
            .copied()
            .map(|oldest| oldest + Duration::milliseconds(self.config.window_ms))
            .unwrap_or(now);

        if state.request_timestamps.len() as u32 >= self.config.max_requests {
            return AdmissionDecision {
                allowed: false,
                remaining: 0,
                reset_at,
                reason: Some("Rate limit exceeded"),
            };
        }

        let fingerprint = Fingerprint::of(report);
        if let Some(last_seen) = state.fingerprint_last_seen.get(&fingerprint) {
            if now.signed_duration_since(*last_seen) < Duration::milliseconds(self.config.duplicate_window_ms) {
                let remaining = self.config.max_requests.saturating_sub(state.request_timestamps.len() as u32);
                return AdmissionDecision {
                    allowed: false,
                    remaining,
                    reset_at,
                    reason: Some("Duplicate error"),
                };
            }
        }

        let remaining = self
            .config
            .max_requests
            .saturating_sub(state.request_timestamps.len() as u32 + 1);
        AdmissionDecision {
            allowed: true,
            remaining,
            reset_at,
            reason: None,
        }
    }

    /// Records that `report` was fully admitted at `now`. Must be called
    /// only after every later stage has also admitted the report.
    pub fn mark(&self, report: &ErrorReport, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.request_timestamps.push_back(now);
        state.fingerprint_last_seen.insert(Fingerprint::of(report), now);
    }

    /// Drops expired timestamps and fingerprint entries. Intended to be
    /// invoked periodically (once per `window_ms`) to bound memory
    /// independently of admission traffic; `check` also sweeps opportunistically.
    pub fn sweep(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        self.sweep_locked(&mut state, now);
    }

    fn sweep_locked(&self, state: &mut State, now: DateTime<Utc>) {
        let window = Duration::milliseconds(self.config.window_ms);
        while let Some(front) = state.request_timestamps.front() {
            if now.signed_duration_since(*front) >= window {
                let _ = state.request_timestamps.pop_front();
            } else {
                break;
            }
        }

        let duplicate_window = Duration::milliseconds(self.config.duplicate_window_ms);
        state
            .fingerprint_last_seen
            .retain(|_, last_seen| now.signed_duration_since(*last_seen) < duplicate_window);
    }

    /// Clears all rate-limiter state, allowing any previously blocked
    /// report to be admitted again.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.request_timestamps.clear();
        state.fingerprint_last_seen.clear();
    }
}
