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

//! A circuit breaker gating the transport substrate.
//!
//! Three states — `Closed`, `Open`, `HalfOpen` — with lazy transitions: no
//! wall-clock timer is needed, `canExecute` re-evaluates `Open -> HalfOpen`
//! on the next admission check after `resetTimeout` has elapsed.
//!
//! The failure threshold is accepted as a fraction in `[0, 1]`, not as a
//! tenths-scaled integer — see the redesign flag on the source's
//! `failureThreshold / 10` computation.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// The circuit breaker's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Requests pass through normally.
    Closed,
    /// The transport must not be invoked; callers should divert elsewhere.
    Open,
    /// At most one trial request may be in flight.
    HalfOpen,
}

/// Configuration for the circuit breaker.
#[derive(Debug, Clone, Copy)]
pub struct CircuitConfig {
    /// Fraction in `[0, 1]` of observed requests that must fail within the
    /// monitoring period for the breaker to trip.
    pub failure_threshold: f64,
    /// Minimum observed requests before the failure rate is evaluated.
    pub minimum_requests: u32,
    /// Width of the sliding window used to evaluate the failure rate.
    pub monitoring_period_ms: i64,
    /// Time after entering `Open` before a trial request is allowed.
    pub reset_timeout_ms: i64,
}

struct Inner {
    state: State,
    state_entered_at: DateTime<Utc>,
    window: VecDeque<(DateTime<Utc>, bool)>,
    trial_in_flight: bool,
}

/// A circuit breaker around the transport substrate.
pub struct CircuitBreaker {
    config: CircuitConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Creates a new, closed circuit breaker.
    pub fn new(config: CircuitConfig, now: DateTime<Utc>) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: State::Closed,
                state_entered_at: now,
                window: VecDeque::new(),
                trial_in_flight: false,
            }),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> State {
        self.inner.lock().state
    }

    /// Returns whether a request may currently be dispatched through the
    /// transport. In `HalfOpen`, returns `true` at most once until the
    /// trial's outcome is recorded.
    pub fn can_execute(&self, now: DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Closed => true,
            State::Open => {
                if now.signed_duration_since(inner.state_entered_at) >= Duration::milliseconds(self.config.reset_timeout_ms) {
                    inner.state = State::HalfOpen;
                    inner.state_entered_at = now;
                    inner.trial_in_flight = true;
                    tracing::info!("circuit breaker entering half-open trial");
                    true
                } else {
                    false
                }
            }
            State::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Records a successful request outcome.
    pub fn on_success(&self, now: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        match inner.state {
            State::HalfOpen => {
                tracing::info!("circuit breaker closing after half-open success");
                inner.state = State::Closed;
                inner.state_entered_at = now;
                inner.trial_in_flight = false;
                inner.window.clear();
            }
            State::Closed => {
                Self::record(&mut inner, now, true, self.config.monitoring_period_ms);
            }
            State::Open => {}
        }
    }

    /// Records a failed request outcome.
    pub fn on_failure(&self, now: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        match inner.state {
            State::HalfOpen => {
                tracing::info!("circuit breaker reopening after half-open failure");
                inner.state = State::Open;
                inner.state_entered_at = now;
                inner.trial_in_flight = false;
            }
            State::Closed => {
                Self::record(&mut inner, now, false, self.config.monitoring_period_ms);
                if Self::should_trip(&inner, self.config) {
                    tracing::warn!("circuit breaker opening: failure rate exceeded threshold");
                    inner.state = State::Open;
                    inner.state_entered_at = now;
                }
            }
            State::Open => {}
        }
    }

    fn record(inner: &mut Inner, now: DateTime<Utc>, success: bool, monitoring_period_ms: i64) {
        inner.window.push_back((now, success));
        let window = Duration::milliseconds(monitoring_period_ms);
        while let Some((ts, _)) = inner.window.front() {
            if now.signed_duration_since(*ts) > window {
                let _ = inner.window.pop_front();
            } else {
                break;
            }
        }
    }

    fn should_trip(inner: &Inner, config: CircuitConfig) -> bool {
        let total = inner.window.len() as u32;
        if total < config.minimum_requests {
            return false;
        }
        let failures = inner.window.iter().filter(|(_, success)| !success).count() as f64;
        (failures / total as f64) >= config.failure_threshold
    }

    /// Forces the breaker into `Open`, for tests and operator override.
    pub fn force_open(&self, now: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        inner.state = State::Open;
        inner.state_entered_at = now;
        inner.trial_in_flight = false;
    }

    /// Forces the breaker into `Closed`, for tests and operator override.
    pub fn force_close(&self, now: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        inner.state = State::Closed;
        inner.state_entered_at = now;
        inner.trial_in_flight = false;
        inner.window.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn config() -> CircuitConfig {
        CircuitConfig {
            failure_threshold: 0.5,
            minimum_requests: 3,
            monitoring_period_ms: 60_000,
            reset_timeout_ms: 30_000,
        }
    }

    #[test]
    fn stays_closed_below_minimum_requests() {
        let now = Utc::now();
        let breaker = CircuitBreaker::new(config(), now);
        breaker.on_failure(now);
        breaker.on_failure(now);
        assert_eq!(breaker.state(), State::Closed);
    }

    #[test]
    fn opens_once_failure_rate_reaches_threshold_with_minimum_samples() {
        let now = Utc::now();
        let breaker = CircuitBreaker::new(config(), now);
        breaker.on_success(now);
        breaker.on_failure(now);
        breaker.on_failure(now);
        assert_eq!(breaker.state(), State::Open);
    }

    #[test]
    fn open_denies_execution_until_reset_timeout_elapses() {
        let now = Utc::now();
        let breaker = CircuitBreaker::new(config(), now);
        breaker.force_open(now);
        assert!(!breaker.can_execute(now + Duration::milliseconds(29_999)));
        assert!(breaker.can_execute(now + Duration::milliseconds(30_000)));
    }

    #[test]
    fn half_open_permits_exactly_one_trial_at_a_time() {
        let now = Utc::now();
        let breaker = CircuitBreaker::new(config(), now);
        breaker.force_open(now);
        let trial_time = now + Duration::milliseconds(30_000);
        assert!(breaker.can_execute(trial_time));
        assert_eq!(breaker.state(), State::HalfOpen);
        assert!(!breaker.can_execute(trial_time));
    }

    #[test]
    fn half_open_success_closes_and_failure_reopens() {
        let now = Utc::now();
        let breaker = CircuitBreaker::new(config(), now);
        breaker.force_open(now);
        let trial_time = now + Duration::milliseconds(30_000);
        assert!(breaker.can_execute(trial_time));
        breaker.on_success(trial_time);
        assert_eq!(breaker.state(), State::Closed);

        breaker.force_open(now);
        assert!(breaker.can_execute(trial_time));
        breaker.on_failure(trial_time);
        assert_eq!(breaker.state(), State::Open);
    }

    #[test]
    fn forced_transitions_work_for_operator_override() {
        let now = Utc::now();
        let breaker = CircuitBreaker::new(config(), now);
        breaker.force_open(now);
        assert_eq!(breaker.state(), State::Open);
        breaker.force_close(now);
        assert_eq!(breaker.state(), State::Closed);
    }
}
