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

//! The Health Monitor: a read-side observer accumulating capture/suppress/
//! retry counters and a rolling response-time sample, from which
//! [`HealthMonitor::assess`] derives a 0-100 health score.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reportwire_model::DropReason;

/// Number of recent response-time samples averaged for health scoring.
const RESPONSE_TIME_WINDOW: usize = 20;

const HEAP_USAGE_THRESHOLD_BYTES: u64 = 50 * 1024 * 1024;
const QUEUE_SIZE_THRESHOLD: usize = 10;
const RESPONSE_TIME_THRESHOLD_MS: f64 = 5000.0;
const SUPPRESSION_RATE_THRESHOLD: f64 = 0.5;

/// Categorical health status derived from the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Score >= 80.
    Healthy,
    /// Score >= 60 and < 80.
    Degraded,
    /// Score < 60.
    Unhealthy,
}

/// A point-in-time snapshot of the counters the Health Monitor tracks.
#[derive(Debug, Clone)]
pub struct Stats {
    /// Reports that reached the transport (delivered or queued), not
    /// dropped at any stage.
    pub errors_reported: u64,
    /// Reports dropped at any stage, for any reason.
    pub errors_suppressed: u64,
    /// Suppressed-count broken down by reason.
    pub suppressed_by_reason: HashMap<DropReason, u64>,
    /// Total retry attempts made by the retry executor.
    pub retry_attempts: u64,
    /// Current offline queue depth, as reported by the caller.
    pub offline_queue_size: usize,
    /// Mean of the last (up to) 20 transport response times, in
    /// milliseconds. `None` if no sample has been recorded yet.
    pub average_response_time_ms: Option<f64>,
    /// Time elapsed since the monitor was constructed.
    pub uptime: chrono::Duration,
    /// Process heap usage in bytes, if the host platform exposes it.
    pub memory_usage_bytes: Option<u64>,
}

/// The result of [`HealthMonitor::assess`].
#[derive(Debug, Clone)]
pub struct Assessment {
    /// The 0-100 health score.
    pub score: u8,
    /// The categorical status the score maps to.
    pub status: HealthStatus,
    /// Human-readable descriptions of each triggered condition.
    pub issues: Vec<String>,
    /// A recommendation paired 1:1 with each entry in `issues`.
    pub recommendations: Vec<String>,
}

/// Accumulates capture/suppress/retry counters and a rolling
/// response-time sample for the lifetime of the pipeline.
pub struct HealthMonitor {
    started_at: DateTime<Utc>,
    errors_reported: AtomicU64,
    errors_suppressed: AtomicU64,
    suppressed_by_reason: Mutex<HashMap<DropReason, u64>>,
    retry_attempts: AtomicU64,
    response_times_ms: Mutex<std::collections::VecDeque<f64>>,
}

impl HealthMonitor {
    /// Creates a new monitor, with `now` as the uptime epoch.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            started_at: now,
            errors_reported: AtomicU64::new(0),
            errors_suppressed: AtomicU64::new(0),
            suppressed_by_reason: Mutex::new(HashMap::new()),
            retry_attempts: AtomicU64::new(0),
            response_times_ms: Mutex::new(std::collections::VecDeque::with_capacity(RESPONSE_TIME_WINDOW)),
        }
    }

    /// Records a report that reached the transport (delivered or queued).
    pub fn record_reported(&self) {
        let _ = self.errors_reported.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a report dropped at any stage, with its reason.
    pub fn record_suppressed(&self, reason: DropReason) {
        let _ = self.errors_suppressed.fetch_add(1, Ordering::Relaxed);
        *self.suppressed_by_reason.lock().entry(reason).or_insert(0) += 1;
    }

    /// Records one retry attempt made by the retry executor.
    pub fn record_retry_attempt(&self) {
        let _ = self.retry_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one transport round-trip time, in milliseconds, keeping
    /// only the most recent [`RESPONSE_TIME_WINDOW`] samples.
    pub fn record_response_time(&self, millis: f64) {
        let mut samples = self.response_times_ms.lock();
        if samples.len() == RESPONSE_TIME_WINDOW {
            let _ = samples.pop_front();
        }
        samples.push_back(millis);
    }

    fn average_response_time_ms(&self) -> Option<f64> {
        let samples = self.response_times_ms.lock();
        if samples.is_empty() {
            None
        } else {
            Some(samples.iter().sum::<f64>() / samples.len() as f64)
        }
    }

    /// Snapshots the current counters. `offline_queue_size` and
    /// `memory_usage_bytes` are supplied by the caller, since the monitor
    /// owns neither the queue nor platform memory introspection.
    pub fn stats(&self, offline_queue_size: usize, memory_usage_bytes: Option<u64>, now: DateTime<Utc>) -> Stats {
        Stats {
            errors_reported: self.errors_reported.load(Ordering::Relaxed),
            errors_suppressed: self.errors_suppressed.load(Ordering::Relaxed),
            suppressed_by_reason: self.suppressed_by_reason.lock().clone(),
            retry_attempts: self.retry_attempts.load(Ordering::Relaxed),
            offline_queue_size,
            average_response_time_ms: self.average_response_time_ms(),
            uptime: now.signed_duration_since(self.started_at),
            memory_usage_bytes,
        }
    }

    /// Computes a 0-100 health score from the current counters plus the
    /// caller-supplied queue depth and memory usage (§4.10): starts at
    /// 100, subtracting 20 for a >50% suppression rate, 15 for an average
    /// response time over 5000ms, 10 for a queue deeper than 10, and 10
    /// for heap usage over 50MiB.
    pub fn assess(&self, offline_queue_size: usize, memory_usage_bytes: Option<u64>, now: DateTime<Utc>) -> Assessment {
        let stats = self.stats(offline_queue_size, memory_usage_bytes, now);

        let mut score: i32 = 100;
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        let total = stats.errors_reported + stats.errors_suppressed;
        let suppression_rate = if total == 0 { 0.0 } else { stats.errors_suppressed as f64 / total as f64 };
        if suppression_rate > SUPPRESSION_RATE_THRESHOLD {
            score -= 20;
            issues.push(format!("suppression rate is {:.0}%, above the 50% threshold", suppression_rate * 100.0));
            recommendations.push("review rate limit, quota, and circuit breaker configuration".to_string());
        }

        if let Some(average) = stats.average_response_time_ms {
            if average > RESPONSE_TIME_THRESHOLD_MS {
                score -= 15;
                issues.push(format!("average response time is {average:.0}ms, above the 5000ms threshold"));
                recommendations.push("investigate webhook latency or reduce payload size".to_string());
            }
        }

        if stats.offline_queue_size > QUEUE_SIZE_THRESHOLD {
            score -= 10;
            issues.push(format!("offline queue depth is {}, above the threshold of {QUEUE_SIZE_THRESHOLD}", stats.offline_queue_size));
            recommendations.push("check network connectivity and webhook availability".to_string());
        }

        if let Some(memory) = stats.memory_usage_bytes {
            if memory > HEAP_USAGE_THRESHOLD_BYTES {
                score -= 10;
                issues.push(format!("heap usage is {:.1}MiB, above the 50MiB threshold", memory as f64 / (1024.0 * 1024.0)));
                recommendations.push("reduce breadcrumb/context retention or flush more frequently".to_string());
            }
        }

        let score = score.clamp(0, 100) as u8;
        let status = match score {
            80..=100 => HealthStatus::Healthy,
            60..=79 => HealthStatus::Degraded,
            _ => HealthStatus::Unhealthy,
        };

        Assessment { score, status, issues, recommendations }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn no_activity_is_a_perfect_score() {
        let monitor = HealthMonitor::new(Utc::now());
        let assessment = monitor.assess(0, None, Utc::now());
        assert_eq!(assessment.score, 100);
        assert_eq!(assessment.status, HealthStatus::Healthy);
        assert!(assessment.issues.is_empty());
    }

    #[test]
    fn high_suppression_rate_degrades_the_score() {
        let monitor = HealthMonitor::new(Utc::now());
        monitor.record_reported();
        for _ in 0..9 {
            monitor.record_suppressed(DropReason::RateLimited);
        }
        let assessment = monitor.assess(0, None, Utc::now());
        assert_eq!(assessment.score, 80);
        assert_eq!(assessment.issues.len(), 1);
    }

    #[test]
    fn slow_responses_and_deep_queue_and_high_memory_compound() {
        let monitor = HealthMonitor::new(Utc::now());
        monitor.record_reported();
        for _ in 0..RESPONSE_TIME_WINDOW {
            monitor.record_response_time(6000.0);
        }
        let assessment = monitor.assess(20, Some(80 * 1024 * 1024), Utc::now());
        assert_eq!(assessment.score, 100 - 15 - 10 - 10);
        assert_eq!(assessment.status, HealthStatus::Degraded);
        assert_eq!(assessment.issues.len(), 3);
        assert_eq!(assessment.recommendations.len(), 3);
    }

    #[test]
    fn response_time_window_keeps_only_the_most_recent_twenty_samples() {
        let monitor = HealthMonitor::new(Utc::now());
        for _ in 0..15 {
            monitor.record_response_time(100.0);
        }
        for _ in 0..20 {
            monitor.record_response_time(1000.0);
        }
        let stats = monitor.stats(0, None, Utc::now());
        assert_eq!(stats.average_response_time_ms, Some(1000.0));
    }

    #[test]
    fn suppressed_by_reason_tracks_sub_totals() {
        let monitor = HealthMonitor::new(Utc::now());
        monitor.record_suppressed(DropReason::RateLimited);
        monitor.record_suppressed(DropReason::RateLimited);
        monitor.record_suppressed(DropReason::DuplicateSuppressed);
        let stats = monitor.stats(0, None, Utc::now());
        assert_eq!(stats.suppressed_by_reason[&DropReason::RateLimited], 2);
        assert_eq!(stats.suppressed_by_reason[&DropReason::DuplicateSuppressed], 1);
    }
}
