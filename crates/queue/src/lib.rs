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

//! The offline queue: a durable FIFO bounded by entry count and age,
//! flushed on reconnection or on an explicit `flush_queue` call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use reportwire_model::{BatchEnvelope, DurableStore, QueuedItem};
use reportwire_transport::Transport;

/// The fixed key under which the queue is persisted.
pub const STORE_KEY: &str = "reportwire.offline_queue.v1";

/// Delivery failures a queued item tolerates before it is retired.
const MAX_ATTEMPTS: u32 = 3;

/// Configuration for the offline queue.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Maximum number of entries retained; oldest entries beyond this are
    /// dropped.
    pub max_queue_size: usize,
    /// Entries older than this are pruned before being considered for
    /// flush.
    pub max_age_ms: i64,
}

/// The outcome of [`OfflineQueue::handle_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The report was sent directly, without touching the queue.
    DeliveredDirectly,
    /// The report was appended to the durable queue for later delivery.
    Queued,
}

/// The outcome of one [`OfflineQueue::process_queue`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Items successfully delivered this pass.
    pub delivered: usize,
    /// Items retired after exhausting their delivery attempts.
    pub retired: usize,
    /// Items still queued after this pass (neither delivered nor retired).
    pub remaining: usize,
}

struct FlushGuard<'a> {
    flushing: &'a AtomicBool,
}

impl<'a> FlushGuard<'a> {
    fn try_acquire(flushing: &'a AtomicBool) -> Option<Self> {
        flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|()| Self { flushing })
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.flushing.store(false, Ordering::Release);
    }
}

/// A durable FIFO of reports awaiting delivery, bounded by
/// [`QueueConfig::max_queue_size`] and [`QueueConfig::max_age_ms`].
pub struct OfflineQueue {
    config: QueueConfig,
    store: Arc<dyn DurableStore>,
    transport: Arc<dyn Transport>,
    items: Mutex<Vec<QueuedItem>>,
    flushing: AtomicBool,
}

impl OfflineQueue {
    /// Loads the queue from `store`, or starts empty if absent or
    /// unparseable.
    pub fn load(config: QueueConfig, store: Arc<dyn DurableStore>, transport: Arc<dyn Transport>) -> Self {
        let items = match store.get(STORE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<QueuedItem>>(&raw) {
                Ok(items) => items,
                Err(error) => {
                    tracing::warn!(%error, "offline queue failed to parse, starting empty");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(error) => {
                tracing::warn!(%error, "offline queue store read failed, starting empty");
                Vec::new()
            }
        };

        Self {
            config,
            store,
            transport,
            items: Mutex::new(items),
            flushing: AtomicBool::new(false),
        }
    }

    /// Handles a report that has fallen through to the offline path:
    /// if `online`, attempts one direct send; on success, returns without
    /// ever touching the queue. Otherwise (offline, or the direct send
    /// failed) appends the report to the durable queue.
    pub async fn handle_error(&self, report: reportwire_model::ErrorReport, now: DateTime<Utc>, online: bool) -> EnqueueOutcome {
        if online {
            let envelope = BatchEnvelope::single(report.clone(), now);
            if self.transport.send(&envelope).await.is_ok() {
                return EnqueueOutcome::DeliveredDirectly;
            }
        }

        self.enqueue(report, now);
        EnqueueOutcome::Queued
    }

    fn enqueue(&self, report: reportwire_model::ErrorReport, now: DateTime<Utc>) {
        let mut items = self.items.lock();
        items.push(QueuedItem::new(report, now));
        self.prune_expired_locked(&mut items, now);
        self.cap_size_locked(&mut items);
        self.persist_locked(&items);
    }

    fn prune_expired_locked(&self, items: &mut Vec<QueuedItem>, now: DateTime<Utc>) {
        let max_age = Duration::milliseconds(self.config.max_age_ms);
        items.retain(|item| !item.is_expired(now, max_age));
    }

    fn cap_size_locked(&self, items: &mut Vec<QueuedItem>) {
        if items.len() <= self.config.max_queue_size {
            return;
        }
        items.sort_by_key(|item| item.enqueued_at);
        let drop_count = items.len() - self.config.max_queue_size;
        let _ = items.drain(0..drop_count);
    }

    /// Flushes the queue: attempts to deliver every entry, retiring ones
    /// that succeed or exhaust their attempt budget, and leaving the rest
    /// for the next flush. Concurrent calls are collapsed to one in-flight
    /// pass via an in-progress guard.
    pub async fn process_queue(&self, now: DateTime<Utc>) -> FlushStats {
        let Some(_guard) = FlushGuard::try_acquire(&self.flushing) else {
            return FlushStats::default();
        };

        let snapshot = {
            let mut items = self.items.lock();
            self.prune_expired_locked(&mut items, now);
            items.clone()
        };

        let mut delivered = 0;
        let mut retired = 0;
        let mut keep = Vec::with_capacity(snapshot.len());

        for mut item in snapshot {
            let envelope = BatchEnvelope::single(item.report.clone(), now);
            match self.transport.send(&envelope).await {
                Ok(()) => {
                    delivered += 1;
                }
                Err(error) => {
                    item.attempts += 1;
                    if item.attempts >= MAX_ATTEMPTS {
                        tracing::warn!(%error, attempts = item.attempts, "offline queue item retired after exhausting delivery attempts");
                        retired += 1;
                    } else {
                        keep.push(item);
                    }
                }
            }
        }

        let remaining = keep.len();
        {
            let mut items = self.items.lock();
            *items = keep;
            self.persist_locked(&items);
        }

        FlushStats { delivered, retired, remaining }
    }

    /// The number of items currently queued.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether the queue currently holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist_locked(&self, items: &[QueuedItem]) {
        match serde_json::to_string(items) {
            Ok(raw) => {
                if let Err(error) = self.store.set(STORE_KEY, &raw) {
                    tracing::warn!(%error, "failed to persist offline queue");
                }
            }
            Err(error) => tracing::warn!(%error, "failed to serialize offline queue"),
        }
    }
}
