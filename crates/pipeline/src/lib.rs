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

//! The Pipeline Coordinator: sequences every capture through format,
//! validate, redact, user-filter, rate-limit, quota, charge, and dispatch,
//! per the fixed stage ordering. Holds direct dependencies on every other
//! component; every other component is a sibling with no cross-edges
//! except the offline queue, which itself invokes the transport.

mod format;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reportwire_config::Config;
use reportwire_model::{
    BatchEnvelope, Breadcrumb, BreadcrumbLevel, CaptureOutcome, DropReason, DurableStore, ErrorReport, NetworkStatus,
};
use reportwire_transport::Transport;
use uuid::Uuid;

/// A snapshot of the pipeline's counters and queue depth, returned by
/// [`Coordinator::get_stats`].
pub type Stats = reportwire_health::Stats;

/// The result of [`Coordinator::get_sdk_health`].
pub type HealthAssessment = reportwire_health::Assessment;

struct MutableState {
    config: Config,
    breadcrumbs: VecDeque<Breadcrumb>,
    user: Option<serde_json::Value>,
    context: Option<serde_json::Value>,
}

/// Sequences every pipeline stage and owns every sibling component.
pub struct Coordinator {
    state: Mutex<MutableState>,
    enabled: AtomicBool,
    session_id: Uuid,

    redactor: reportwire_redact::Redactor,
    rate_limiter: reportwire_ratelimit::RateLimiter,
    quota: reportwire_quota::QuotaAccountant,
    circuit: reportwire_circuit::CircuitBreaker,
    batch: reportwire_batch::BatchAggregator,
    queue: reportwire_queue::OfflineQueue,
    health: reportwire_health::HealthMonitor,
    transport: Arc<dyn Transport>,
    network: Arc<dyn NetworkStatus>,
}

fn rate_limiter_config(config: &Config) -> reportwire_ratelimit::RateLimiterConfig {
    reportwire_ratelimit::RateLimiterConfig {
        window_ms: 60_000,
        max_requests: config.max_requests_per_minute,
        duplicate_window_ms: config.duplicate_error_window_ms,
    }
}

fn quota_config(config: &Config) -> reportwire_quota::QuotaConfig {
    reportwire_quota::QuotaConfig {
        max_payload_size: config.max_payload_size,
        daily_limit: config.daily_limit,
        monthly_limit: config.monthly_limit,
        burst_limit: config.burst_limit,
        burst_window_ms: config.burst_window_ms,
    }
}

fn circuit_config(config: &Config) -> reportwire_circuit::CircuitConfig {
    reportwire_circuit::CircuitConfig {
        failure_threshold: config.circuit_failure_threshold,
        minimum_requests: config.circuit_minimum_requests,
        monitoring_period_ms: config.circuit_monitoring_period_ms,
        reset_timeout_ms: config.circuit_reset_timeout_ms,
    }
}

fn batch_config(config: &Config) -> reportwire_batch::BatchConfig {
    reportwire_batch::BatchConfig {
        enabled: config.enable_batching,
        max_size: config.batch_size,
        max_payload_size: config.max_batch_payload_size,
        max_wait_ms: config.batch_timeout_ms as i64,
    }
}

fn queue_config(config: &Config) -> reportwire_queue::QueueConfig {
    reportwire_queue::QueueConfig {
        max_queue_size: config.max_offline_queue_size,
        max_age_ms: config.offline_queue_max_age_ms,
    }
}

fn retry_config(config: &Config) -> reportwire_retry::RetryConfig {
    reportwire_retry::RetryConfig {
        max_retries: config.max_retries,
        initial_delay: std::time::Duration::from_millis(config.initial_retry_delay_ms),
        max_delay: std::time::Duration::from_millis(config.max_retry_delay_ms),
        multiplier: config.retry_multiplier,
    }
}

impl Coordinator {
    /// Constructs a Coordinator from `config`. A configuration validation
    /// failure is not fatal to construction: it is logged once and the
    /// SDK comes up disabled, so every capture call becomes a no-op — the
    /// "fatal failure" path of the error-handling design.
    pub fn new(
        config: Config,
        store: Arc<dyn DurableStore>,
        transport: Arc<dyn Transport>,
        network: Arc<dyn NetworkStatus>,
        now: DateTime<Utc>,
    ) -> Self {
        let enabled = match config.validate_config() {
            Ok(()) => config.enabled,
            Err(error) => {
                tracing::error!(%error, "configuration invalid at startup, SDK constructed disabled");
                false
            }
        };

        let coordinator = Self {
            redactor: reportwire_redact::Redactor::new(),
            rate_limiter: reportwire_ratelimit::RateLimiter::new(rate_limiter_config(&config)),
            quota: reportwire_quota::QuotaAccountant::load(quota_config(&config), store.clone(), now),
            circuit: reportwire_circuit::CircuitBreaker::new(circuit_config(&config), now),
            batch: reportwire_batch::BatchAggregator::new(batch_config(&config)),
            queue: reportwire_queue::OfflineQueue::load(queue_config(&config), store, transport.clone()),
            health: reportwire_health::HealthMonitor::new(now),
            state: Mutex::new(MutableState {
                config,
                breadcrumbs: VecDeque::new(),
                user: None,
                context: None,
            }),
            enabled: AtomicBool::new(enabled),
            session_id: Uuid::new_v4(),
            transport,
            network,
        };

        coordinator
    }

    /// Captures a thrown exception. Builds an `ErrorReport` from `message`/
    /// `exception_class`/`stack_trace`, merges `context` (call-site wins
    /// over accumulated) into the report, and runs it through every stage.
    pub async fn capture_exception(
        &self,
        message: impl Into<String>,
        exception_class: impl Into<String>,
        stack_trace: impl Into<String>,
        context: Option<serde_json::Value>,
    ) -> CaptureOutcome {
        self.capture(message.into(), exception_class.into(), stack_trace.into(), context).await
    }

    /// Captures an explicit message, tagged with a severity level. Modeled
    /// as an `ErrorReport` with `exception_class = "Message"` and the level
    /// folded into `context.level`.
    pub async fn capture_message(
        &self,
        text: impl Into<String>,
        level: Option<BreadcrumbLevel>,
        context: Option<serde_json::Value>,
    ) -> CaptureOutcome {
        let mut merged = context.unwrap_or_else(|| serde_json::json!({}));
        if let Some(level) = level {
            if let Some(object) = merged.as_object_mut() {
                let _ = object.insert("level".to_string(), serde_json::json!(level));
            }
        }
        self.capture(text.into(), "Message".to_string(), String::new(), Some(merged)).await
    }

    async fn capture(&self, message: String, exception_class: String, stack_trace: String, call_context: Option<serde_json::Value>) -> CaptureOutcome {
        if !self.enabled.load(Ordering::Acquire) {
            return CaptureOutcome::Dropped(DropReason::SdkDisabled);
        }

        let now = Utc::now();
        let mut report = self.format(message, exception_class, stack_trace, call_context);

        let max_payload_size = self.state.lock().config.max_payload_size;
        if let Err(error) = reportwire_redact::validate(&report, max_payload_size) {
            tracing::debug!(%error, "report failed validation");
            self.health.record_suppressed(DropReason::ValidationFailed);
            return CaptureOutcome::Dropped(DropReason::ValidationFailed);
        }

        let warnings = self.redactor.redact_report(&mut report);
        for label in warnings {
            tracing::warn!(pattern = label, "sensitive pattern detected in captured report");
        }

        let before_send = self.state.lock().config.before_send.clone();
        if let Some(hook) = before_send {
            match hook(report) {
                Some(filtered) => report = filtered,
                None => {
                    self.health.record_suppressed(DropReason::FilteredByUser);
                    return CaptureOutcome::Dropped(DropReason::FilteredByUser);
                }
            }
        }

        let rate_decision = self.rate_limiter.check(&report, now);
        if !rate_decision.allowed {
            let reason = if rate_decision.reason == Some("Duplicate error") {
                DropReason::DuplicateSuppressed
            } else {
                DropReason::RateLimited
            };
            self.health.record_suppressed(reason);
            return CaptureOutcome::Dropped(reason);
        }

        if let Err(reason) = self.quota.check(report.serialized_size(), now) {
            self.health.record_suppressed(reason);
            return CaptureOutcome::Dropped(reason);
        }

        self.rate_limiter.mark(&report, now);
        self.quota.charge(now);
        self.health.record_reported();

        self.dispatch(report, now).await
    }

    fn format(&self, message: String, exception_class: String, stack_trace: String, call_context: Option<serde_json::Value>) -> ErrorReport {
        let (file, line) = format::parse_stack_frame(&stack_trace);
        let mut state = self.state.lock();

        let context = match (state.context.clone(), call_context) {
            (Some(mut base), Some(overlay)) => {
                if let (Some(base_obj), Some(overlay_obj)) = (base.as_object_mut(), overlay.as_object()) {
                    for (key, value) in overlay_obj {
                        let _ = base_obj.insert(key.clone(), value.clone());
                    }
                }
                Some(base)
            }
            (None, Some(overlay)) => Some(overlay),
            (base, None) => base,
        };

        ErrorReport {
            message,
            exception_class,
            stack_trace,
            file,
            line,
            project: state.config.project_name.clone(),
            environment: state.config.environment.clone(),
            timestamp: Utc::now(),
            session_id: self.session_id,
            user: state.user.clone(),
            context,
            breadcrumbs: state.breadcrumbs.iter().cloned().collect(),
            browser: None,
            request: None,
            commit_hash: None,
            version: None,
            custom_data: None,
        }
    }

    // Batching-enabled and batching-disabled are the same code path here:
    // BatchAggregator::enqueue returns an immediate single-report envelope
    // when batching is off, so dispatch only ever reacts to `Some`.
    async fn dispatch(&self, report: ErrorReport, now: DateTime<Utc>) -> CaptureOutcome {
        let flushed = self.batch.enqueue(report, now);
        match flushed {
            Some(envelope) => self.dispatch_envelope(envelope, now).await,
            None => CaptureOutcome::Delivered,
        }
    }

    // Circuit gating happens here, at the point an envelope is actually
    // dispatched, so a batched flush is gated the same way a direct send is.
    // A known-offline host skips the transport attempt entirely, the same
    // way OfflineQueue::handle_error's `online` flag does.
    async fn dispatch_envelope(&self, envelope: BatchEnvelope, now: DateTime<Utc>) -> CaptureOutcome {
        if !self.network.is_online() || !self.circuit.can_execute(now) {
            return self.divert_to_offline_queue(envelope, now).await;
        }

        let enable_offline_support = self.state.lock().config.enable_offline_support;
        let retry_cfg = retry_config(&self.state.lock().config);
        let transport = self.transport.clone();
        let outcome = reportwire_retry::execute(&retry_cfg, || {
            let transport = transport.clone();
            let envelope = envelope.clone();
            async move { transport.send(&envelope).await }
        })
        .await;

        for _ in 0..outcome.attempts.saturating_sub(1) {
            self.health.record_retry_attempt();
        }

        if outcome.success {
            self.circuit.on_success(now);
            CaptureOutcome::Delivered
        } else {
            self.circuit.on_failure(now);
            if enable_offline_support {
                self.enqueue_envelope(envelope, now).await;
                CaptureOutcome::Queued
            } else {
                tracing::warn!("transport delivery failed and offline support is disabled; report silently dropped");
                CaptureOutcome::Delivered
            }
        }
    }

    async fn divert_to_offline_queue(&self, envelope: BatchEnvelope, now: DateTime<Utc>) -> CaptureOutcome {
        let enable_offline_support = self.state.lock().config.enable_offline_support;
        if !enable_offline_support {
            return CaptureOutcome::Dropped(DropReason::CircuitOpenOfflineDisabled);
        }
        self.enqueue_envelope(envelope, now).await;
        CaptureOutcome::Queued
    }

    async fn enqueue_envelope(&self, envelope: BatchEnvelope, now: DateTime<Utc>) {
        for report in envelope.reports {
            let _ = self.queue.handle_error(report, now, false).await;
        }
    }

    /// Flushes the current batch unconditionally, dispatching it if
    /// non-empty. Intended for explicit `flush()` calls and teardown.
    pub async fn flush(&self) {
        let now = Utc::now();
        if let Some(envelope) = self.batch.flush(now) {
            let _ = self.dispatch_envelope(envelope, now).await;
        }
    }

    /// Checks whether the current batch has been open past its timeout,
    /// flushing and dispatching it if so. Intended to be polled from a
    /// timer owned by the caller (the runtime that also owns the
    /// coordinator).
    pub async fn poll_batch_timeout(&self) {
        let now = Utc::now();
        if let Some(envelope) = self.batch.check_timeout(now) {
            let _ = self.dispatch_envelope(envelope, now).await;
        }
    }

    /// Flushes the offline queue, attempting delivery of every entry.
    /// A no-op (never touches the transport) when the queue is empty.
    pub async fn flush_queue(&self) -> reportwire_queue::FlushStats {
        self.queue.process_queue(Utc::now()).await
    }

    /// Attempts an offline-queue flush only if the network-status signal
    /// currently reports online. Intended to be called on the online
    /// reconnection edge.
    pub async fn flush_queue_if_online(&self) -> Option<reportwire_queue::FlushStats> {
        if self.network.is_online() {
            Some(self.flush_queue().await)
        } else {
            None
        }
    }

    /// Appends a breadcrumb to the accumulated ring buffer, evicting the
    /// oldest entry once `max_breadcrumbs` is exceeded.
    pub fn add_breadcrumb(&self, breadcrumb: Breadcrumb) {
        let mut state = self.state.lock();
        let max = state.config.max_breadcrumbs as usize;
        state.breadcrumbs.push_back(breadcrumb);
        while state.breadcrumbs.len() > max {
            let _ = state.breadcrumbs.pop_front();
        }
    }

    /// Clears every accumulated breadcrumb.
    pub fn clear_breadcrumbs(&self) {
        self.state.lock().breadcrumbs.clear();
    }

    /// Sets (or clears, with `None`) the reporting user attached to every
    /// subsequent report.
    pub fn set_user(&self, user: Option<serde_json::Value>) {
        self.state.lock().user = user;
    }

    /// Merges `key: value` into the accumulated context object attached
    /// to every subsequent report.
    pub fn set_context(&self, key: impl Into<String>, value: serde_json::Value) {
        let mut state = self.state.lock();
        let context = state.context.get_or_insert_with(|| serde_json::json!({}));
        if let Some(object) = context.as_object_mut() {
            let _ = object.insert(key.into(), value);
        }
    }

    /// Removes `key` from the accumulated context object, if present.
    pub fn remove_context(&self, key: &str) {
        let mut state = self.state.lock();
        if let Some(context) = state.context.as_mut().and_then(|c| c.as_object_mut()) {
            let _ = context.remove(key);
        }
    }

    /// Replaces the coordinator-level toggles (`enabled`, `environment`,
    /// `project_name`, `before_send`, `debug`) with those from `config`.
    /// Per-component configuration (rate limiter window, quota limits,
    /// circuit thresholds, batch/retry tuning) is fixed at construction
    /// and is not hot-swapped by this call.
    pub fn update_config(&self, config: Config) {
        let enabled = config.enabled;
        let mut state = self.state.lock();
        state.config = config;
        self.enabled.store(enabled, Ordering::Release);
    }

    /// A snapshot of the pipeline's performance counters.
    pub fn get_stats(&self) -> Stats {
        self.health.stats(self.queue.len(), None, Utc::now())
    }

    /// A scored health assessment derived from the current counters.
    pub fn get_sdk_health(&self) -> HealthAssessment {
        self.health.assess(self.queue.len(), None, Utc::now())
    }

    /// Whether the SDK is currently enabled (capture calls are not no-ops).
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Disables the SDK permanently; all subsequent capture calls become
    /// no-ops. Does not flush any pending batch or queue.
    pub fn destroy(&self) {
        self.enabled.store(false, Ordering::Release);
    }
}
