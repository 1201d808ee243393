//! End-to-end scenarios exercising the full Coordinator against a recording
//! transport double, mirroring the documented pipeline behaviors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use reportwire_config::Config;
use reportwire_model::{AlwaysOnline, CaptureOutcome, DropReason, InMemoryStore, NetworkStatus};
use reportwire_pipeline::Coordinator;
use reportwire_transport::testing::RecordingTransport;

struct ToggleNetwork {
    online: AtomicBool,
}

impl ToggleNetwork {
    fn new(online: bool) -> Self {
        Self { online: AtomicBool::new(online) }
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }
}

impl NetworkStatus for ToggleNetwork {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }
}

fn config() -> Config {
    Config::new("https://example.com/hook", "proj").with_environment("development")
}

fn coordinator_with(config: Config, transport: Arc<RecordingTransport>, network: Arc<dyn NetworkStatus>) -> Coordinator {
    Coordinator::new(config, Arc::new(InMemoryStore::new()), transport, network, chrono::Utc::now())
}

#[tokio::test]
async fn deduplication_suppresses_a_repeat_within_the_window_then_admits_after_it_expires() {
    let config = Config {
        duplicate_error_window_ms: 50,
        ..config()
    };
    let transport = Arc::new(RecordingTransport::new());
    let coordinator = coordinator_with(config, transport.clone(), Arc::new(AlwaysOnline));

    let first = coordinator.capture_exception("boom", "Error", "at fn (file.ts:10:1)", None).await;
    assert_eq!(first, CaptureOutcome::Delivered);

    let second = coordinator.capture_exception("boom", "Error", "at fn (file.ts:10:1)", None).await;
    assert_eq!(second, CaptureOutcome::Dropped(DropReason::DuplicateSuppressed));

    tokio::time::sleep(StdDuration::from_millis(70)).await;

    let third = coordinator.capture_exception("boom", "Error", "at fn (file.ts:10:1)", None).await;
    assert_eq!(third, CaptureOutcome::Delivered);

    assert_eq!(transport.send_count(), 2);
}

#[tokio::test]
async fn offline_signal_queues_captures_then_online_flush_delivers_them_in_order() {
    let network = Arc::new(ToggleNetwork::new(false));
    let transport = Arc::new(RecordingTransport::new());
    let coordinator = coordinator_with(
        Config { enable_batching: false, ..config() },
        transport.clone(),
        network.clone() as Arc<dyn NetworkStatus>,
    );

    let first = coordinator.capture_exception("a", "Error", "at fn (a.ts:1:1)", None).await;
    let second = coordinator.capture_exception("b", "Error", "at fn (b.ts:2:1)", None).await;
    assert_eq!(first, CaptureOutcome::Queued);
    assert_eq!(second, CaptureOutcome::Queued);
    assert_eq!(transport.send_count(), 0);

    network.set_online(true);
    let stats = coordinator.flush_queue().await;
    assert_eq!(stats.delivered, 2);
    assert_eq!(stats.remaining, 0);

    let sent = transport.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].reports[0].message, "a");
    assert_eq!(sent[1].reports[0].message, "b");
}

#[tokio::test]
async fn eleventh_distinct_capture_within_the_window_is_rate_limited() {
    let config = Config {
        max_requests_per_minute: 10,
        duplicate_error_window_ms: 0,
        enable_batching: false,
        ..config()
    };
    let transport = Arc::new(RecordingTransport::new());
    let coordinator = coordinator_with(config, transport.clone(), Arc::new(AlwaysOnline));

    for i in 0..10 {
        let outcome = coordinator
            .capture_exception(format!("err-{i}"), "Error", format!("at fn (file.ts:{i}:1)"), None)
            .await;
        assert_eq!(outcome, CaptureOutcome::Delivered, "capture {i} should admit");
    }

    let eleventh = coordinator.capture_exception("err-10", "Error", "at fn (file.ts:10:1)", None).await;
    assert_eq!(eleventh, CaptureOutcome::Dropped(DropReason::RateLimited));
    assert_eq!(transport.send_count(), 10);
}

#[tokio::test]
async fn circuit_trips_after_consecutive_failures_then_recovers_via_half_open_trial() {
    let config = Config {
        circuit_failure_threshold: 1.0,
        circuit_minimum_requests: 3,
        circuit_reset_timeout_ms: 30,
        duplicate_error_window_ms: 0,
        enable_batching: false,
        enable_offline_support: true,
        max_retries: 0,
        ..config()
    };
    let outcomes = (0..5).map(|_| Err(reportwire_transport::Error::status(500))).collect();
    let transport = Arc::new(RecordingTransport::with_outcomes(outcomes));
    let coordinator = coordinator_with(config, transport.clone(), Arc::new(AlwaysOnline));

    for i in 0..5 {
        let outcome = coordinator
            .capture_exception(format!("fail-{i}"), "Error", format!("at fn (file.ts:{i}:1)"), None)
            .await;
        assert_eq!(outcome, CaptureOutcome::Queued, "capture {i} should queue after transport failure");
    }

    let before_trip = transport.send_count();

    let diverted = coordinator.capture_exception("diverted", "Error", "at fn (file.ts:6:1)", None).await;
    assert_eq!(diverted, CaptureOutcome::Queued);
    assert_eq!(transport.send_count(), before_trip, "circuit should be open; no new transport call");

    tokio::time::sleep(StdDuration::from_millis(40)).await;

    let trial = coordinator.capture_exception("trial", "Error", "at fn (file.ts:7:1)", None).await;
    assert!(matches!(trial, CaptureOutcome::Delivered | CaptureOutcome::Queued));
    assert_eq!(transport.send_count(), before_trip + 1, "half-open trial should hit the transport exactly once");
}

#[tokio::test]
async fn redaction_scrubs_the_password_before_it_ever_reaches_the_transport() {
    let transport = Arc::new(RecordingTransport::new());
    let coordinator = coordinator_with(Config { enable_batching: false, ..config() }, transport.clone(), Arc::new(AlwaysOnline));

    let outcome = coordinator
        .capture_exception(
            "login failed",
            "Error",
            "at fn (auth.ts:5:1)",
            Some(serde_json::json!({"password": "hunter2", "email": "a@b.c"})),
        )
        .await;
    assert_eq!(outcome, CaptureOutcome::Delivered);

    let sent = transport.sent();
    let report = &sent[0].reports[0];
    let serialized = serde_json::to_string(report).unwrap();
    assert!(!serialized.contains("hunter2"));
    assert_eq!(report.context.as_ref().unwrap()["password"], serde_json::json!("[REDACTED]"));
}

#[tokio::test]
async fn five_rapid_captures_flush_a_single_batch_of_five() {
    let config = Config {
        enable_batching: true,
        batch_size: 5,
        batch_timeout_ms: 5000,
        duplicate_error_window_ms: 0,
        ..config()
    };
    let transport = Arc::new(RecordingTransport::new());
    let coordinator = coordinator_with(config, transport.clone(), Arc::new(AlwaysOnline));

    for i in 0..5 {
        let outcome = coordinator
            .capture_exception(format!("batch-{i}"), "Error", format!("at fn (file.ts:{i}:1)"), None)
            .await;
        assert_eq!(outcome, CaptureOutcome::Delivered);
    }

    assert_eq!(transport.send_count(), 1);
    assert_eq!(transport.sent()[0].count, 5);
}

#[tokio::test]
async fn two_captures_then_idle_flush_on_the_batch_timer() {
    let config = Config {
        enable_batching: true,
        batch_size: 5,
        batch_timeout_ms: 30,
        duplicate_error_window_ms: 0,
        ..config()
    };
    let transport = Arc::new(RecordingTransport::new());
    let coordinator = coordinator_with(config, transport.clone(), Arc::new(AlwaysOnline));

    let _ = coordinator.capture_exception("one", "Error", "at fn (file.ts:1:1)", None).await;
    let _ = coordinator.capture_exception("two", "Error", "at fn (file.ts:2:1)", None).await;
    assert_eq!(transport.send_count(), 0);

    tokio::time::sleep(StdDuration::from_millis(40)).await;
    coordinator.poll_batch_timeout().await;

    assert_eq!(transport.send_count(), 1);
    assert_eq!(transport.sent()[0].count, 2);
}
