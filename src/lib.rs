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

//! The reportwire client-side error telemetry SDK.
//!
//! This crate is a thin ambient-global binding over [`reportwire_pipeline::
//! Coordinator`]: [`init`] constructs one and stores it behind a process-wide
//! handle, and every other function here looks the handle up and forwards to
//! it, no-opping (or reporting [`reportwire_model::DropReason::NotInitialized`])
//! when absent. This replaces the host framework's own global reporter
//! reference with a single `OnceLock`-guarded slot, per the design note on
//! ambient globals: every stateful decision still lives on the Coordinator
//! and its siblings, re-exported below for embedders that want direct access
//! instead of the free-function surface.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;

pub use reportwire_batch::{BatchAggregator, BatchConfig};
pub use reportwire_circuit::{CircuitBreaker, CircuitConfig, State as CircuitState};
pub use reportwire_config::{BeforeSend, Config};
pub use reportwire_model::{
    AlwaysOnline, BatchEnvelope, Breadcrumb, BreadcrumbLevel, CaptureOutcome, DropReason, DurableStore, ErrorReport,
    FileStore, InMemoryStore, NetworkStatus, QuotaLimit, WatchNetworkStatus,
};
pub use reportwire_pipeline::{Coordinator, HealthAssessment, Stats};
pub use reportwire_queue::FlushStats;
pub use reportwire_transport::{HttpTransport, Transport, TransportConfig};

/// Errors raised while initializing the ambient SDK instance.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The HTTP transport could not be constructed from the given config.
    #[error("failed to build the HTTP transport: {0}")]
    Transport(#[from] reportwire_transport::Error),
}

static HANDLE: OnceLock<Mutex<Option<Arc<Coordinator>>>> = OnceLock::new();

fn handle() -> &'static Mutex<Option<Arc<Coordinator>>> {
    HANDLE.get_or_init(|| Mutex::new(None))
}

fn current() -> Option<Arc<Coordinator>> {
    handle().lock().clone()
}

fn transport_config(config: &Config) -> TransportConfig {
    TransportConfig {
        webhook_url: config.webhook_url.clone(),
        timeout: Duration::from_millis(config.timeout_ms),
        compress: reportwire_compress::CompressConfig {
            enabled: config.enable_compression,
            threshold: config.compression_threshold_bytes,
        },
        user_agent: format!("reportwire-rust/{}", env!("CARGO_PKG_VERSION")),
    }
}

/// Builds a Coordinator from `config` and installs it as the ambient
/// instance every free function in this module forwards to, replacing
/// whichever instance (if any) was previously installed.
///
/// Configuration validation failures are not reported here: per the
/// "fatal failure" design, an invalid `config` still produces a
/// constructed-but-disabled Coordinator (every capture becomes a no-op)
/// rather than failing `init` outright. This `Result` instead reports
/// construction failures in the transport itself (e.g. the underlying
/// HTTP client failing to build).
pub fn init(config: Config, store: Arc<dyn DurableStore>, network: Arc<dyn NetworkStatus>) -> Result<(), Error> {
    let transport = Arc::new(HttpTransport::new(transport_config(&config))?);
    let coordinator = Arc::new(Coordinator::new(config, store, transport, network, Utc::now()));
    *handle().lock() = Some(coordinator);
    Ok(())
}

/// Captures a thrown exception through the ambient instance. Reports
/// [`DropReason::NotInitialized`] if [`init`] has not been called.
pub async fn capture_exception(
    message: impl Into<String>,
    exception_class: impl Into<String>,
    stack_trace: impl Into<String>,
    context: Option<serde_json::Value>,
) -> CaptureOutcome {
    match current() {
        Some(coordinator) => coordinator.capture_exception(message, exception_class, stack_trace, context).await,
        None => CaptureOutcome::Dropped(DropReason::NotInitialized),
    }
}

/// Captures an explicit message through the ambient instance. Reports
/// [`DropReason::NotInitialized`] if [`init`] has not been called.
pub async fn capture_message(
    text: impl Into<String>,
    level: Option<BreadcrumbLevel>,
    context: Option<serde_json::Value>,
) -> CaptureOutcome {
    match current() {
        Some(coordinator) => coordinator.capture_message(text, level, context).await,
        None => CaptureOutcome::Dropped(DropReason::NotInitialized),
    }
}

/// Appends a breadcrumb to the ambient instance. A no-op if uninitialized.
pub fn add_breadcrumb(breadcrumb: Breadcrumb) {
    if let Some(coordinator) = current() {
        coordinator.add_breadcrumb(breadcrumb);
    }
}

/// Sets the reporting user on the ambient instance. A no-op if uninitialized.
pub fn set_user(user: Option<serde_json::Value>) {
    if let Some(coordinator) = current() {
        coordinator.set_user(user);
    }
}

/// Merges a key into the ambient instance's accumulated context. A no-op
/// if uninitialized.
pub fn set_context(key: impl Into<String>, value: serde_json::Value) {
    if let Some(coordinator) = current() {
        coordinator.set_context(key, value);
    }
}

/// Removes a key from the ambient instance's accumulated context. A no-op
/// if uninitialized.
pub fn remove_context(key: &str) {
    if let Some(coordinator) = current() {
        coordinator.remove_context(key);
    }
}

/// Clears every breadcrumb accumulated on the ambient instance. A no-op
/// if uninitialized.
pub fn clear_breadcrumbs() {
    if let Some(coordinator) = current() {
        coordinator.clear_breadcrumbs();
    }
}

/// Flushes the ambient instance's offline queue. Returns `None` if
/// uninitialized, rather than a zeroed [`FlushStats`], since no flush was
/// actually attempted.
pub async fn flush_queue() -> Option<FlushStats> {
    match current() {
        Some(coordinator) => Some(coordinator.flush_queue().await),
        None => None,
    }
}

/// Replaces the ambient instance's coordinator-level configuration. A
/// no-op if uninitialized.
pub fn update_config(config: Config) {
    if let Some(coordinator) = current() {
        coordinator.update_config(config);
    }
}

/// A snapshot of the ambient instance's performance counters. `None` if
/// uninitialized.
pub fn get_stats() -> Option<Stats> {
    current().map(|coordinator| coordinator.get_stats())
}

/// A scored health assessment of the ambient instance. `None` if
/// uninitialized.
pub fn get_sdk_health() -> Option<HealthAssessment> {
    current().map(|coordinator| coordinator.get_sdk_health())
}

/// Whether the ambient instance is currently enabled. `false` if
/// uninitialized.
pub fn is_enabled() -> bool {
    current().map(|coordinator| coordinator.is_enabled()).unwrap_or(false)
}

/// Disables the ambient instance and releases the handle, so a
/// subsequent [`init`] starts from a clean slate. A no-op if
/// uninitialized.
pub fn destroy() {
    if let Some(coordinator) = handle().lock().take() {
        coordinator.destroy();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use reportwire_model::InMemoryStore;

    fn reset() {
        destroy();
    }

    #[test]
    fn uninitialized_reports_are_no_ops() {
        reset();
        assert!(!is_enabled());
        assert!(get_stats().is_none());
        assert!(get_sdk_health().is_none());
        add_breadcrumb(Breadcrumb::new("noop", "test", BreadcrumbLevel::Info, Utc::now()));
        set_user(None);
        set_context("k", serde_json::json!("v"));
        remove_context("k");
        clear_breadcrumbs();
    }

    #[tokio::test]
    async fn uninitialized_capture_reports_not_initialized() {
        reset();
        let outcome = capture_exception("boom", "Error", "at fn (a.ts:1:1)", None).await;
        assert_eq!(outcome, CaptureOutcome::Dropped(DropReason::NotInitialized));
    }

    #[tokio::test]
    async fn uninitialized_flush_queue_returns_none() {
        reset();
        assert!(flush_queue().await.is_none());
    }

    #[test]
    fn init_installs_an_enabled_instance() {
        reset();
        let config = Config::new("https://example.com/hook", "proj");
        let result = init(config, Arc::new(InMemoryStore::new()), Arc::new(AlwaysOnline));
        assert!(result.is_ok());
        assert!(is_enabled());
        destroy();
        assert!(!is_enabled());
    }
}
