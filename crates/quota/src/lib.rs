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

//! Daily/monthly/burst quota accounting, persisted across process restarts
//! via a [`reportwire_model::DurableStore`].

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc};
use parking_lot::Mutex;
use reportwire_model::{DropReason, DurableStore, QuotaLimit};
use serde::{Deserialize, Serialize};

/// The fixed key under which the quota ledger is persisted.
pub const STORE_KEY: &str = "reportwire.quota_ledger.v1";

/// Errors raised while loading or persisting the quota ledger. Never fatal:
/// callers log once and continue with an in-memory-only ledger.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The durable store rejected a read or write.
    #[error("durable store error: {0}")]
    Store(#[from] reportwire_model::StoreError),
}

/// Configuration for the quota accountant.
#[derive(Debug, Clone, Copy)]
pub struct QuotaConfig {
    /// Maximum serialized payload size, in bytes.
    pub max_payload_size: usize,
    /// Maximum admitted reports per UTC day.
    pub daily_limit: u64,
    /// Maximum admitted reports per UTC month.
    pub monthly_limit: u64,
    /// Maximum admitted reports per rolling burst window.
    pub burst_limit: u64,
    /// Width of the rolling burst window.
    pub burst_window_ms: i64,
}

/// The day/month/burst counters, persisted verbatim to the durable store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QuotaLedger {
    /// Reports admitted so far today (UTC).
    pub daily_count: u64,
    /// Reports admitted so far this month (UTC).
    pub monthly_count: u64,
    /// Timestamps of reports admitted within the burst window.
    pub burst_timestamps: Vec<DateTime<Utc>>,
    /// The UTC date key (`YYYY-MM-DD`) the daily counter was last reset for.
    pub last_day_key: String,
    /// The UTC year-month key (`YYYY-MM`) the monthly counter was last reset
    /// for.
    pub last_month_key: String,
}

fn day_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

fn month_key(now: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", now.year(), now.month())
}

/// The outcome of a quota admission check.
pub type QuotaDecision = Result<(), DropReason>;

/// Tracks and enforces daily/monthly/burst usage quotas, persisting the
/// ledger to a durable store on every charge.
pub struct QuotaAccountant {
    config: QuotaConfig,
    store: Arc<dyn DurableStore>,
    ledger: Mutex<QuotaLedger>,
}

impl QuotaAccountant {
    /// Loads the ledger from `store`, or starts from zero (keeping today's
    /// key) if the stored value is absent or fails to parse.
    pub fn load(config: QuotaConfig, store: Arc<dyn DurableStore>, now: DateTime<Utc>) -> Self {
        let ledger = match store.get(STORE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<QuotaLedger>(&raw) {
                Ok(ledger) => ledger,
                Err(error) => {
                    tracing::warn!(%error, "quota ledger failed to parse, starting from zero");
                    QuotaLedger {
                        last_day_key: day_key(now),
                        last_month_key: month_key(now),
                        ..QuotaLedger::default()
                    }
                }
            },
            Ok(None) => QuotaLedger {
                last_day_key: day_key(now),
                last_month_key: month_key(now),
                ..QuotaLedger::default()
            },
            Err(error) => {
                tracing::warn!(%error, "quota ledger store read failed, starting from zero");
                QuotaLedger {
                    last_day_key: day_key(now),
                    last_month_key: month_key(now),
                    ..QuotaLedger::default()
                }
            }
        };

        let accountant = Self {
            config,
            store,
            ledger: Mutex::new(ledger),
        };
        accountant.reconcile(now);
        accountant
    }

    /// Resets day/month counters on key rollover and prunes burst
    /// timestamps outside the window. Called on every admission check and
    /// every charge.
    fn reconcile(&self, now: DateTime<Utc>) {
        let mut ledger = self.ledger.lock();
        self.reconcile_locked(&mut ledger, now);
    }

    fn reconcile_locked(&self, ledger: &mut QuotaLedger, now: DateTime<Utc>) {
        let today = day_key(now);
        if ledger.last_day_key != today {
            ledger.daily_count = 0;
            ledger.last_day_key = today;
        }

        let this_month = month_key(now);
        if ledger.last_month_key != this_month {
            ledger.monthly_count = 0;
            ledger.last_month_key = this_month;
        }

        let window = Duration::milliseconds(self.config.burst_window_ms);
        ledger
            .burst_timestamps
            .retain(|ts| now.signed_duration_since(*ts) < window);
    }

    /// Checks whether a report of `payload_size` bytes may be admitted at
    /// `now`, without charging the quota. Checked in the documented order:
    /// payload size, burst, daily, monthly; the first failure wins.
    pub fn check(&self, payload_size: usize, now: DateTime<Utc>) -> QuotaDecision {
        if payload_size > self.config.max_payload_size {
            return Err(DropReason::QuotaExceeded(QuotaLimit::PayloadSize));
        }

        let mut ledger = self.ledger.lock();
        self.reconcile_locked(&mut ledger, now);

        if ledger.burst_timestamps.len() as u64 >= self.config.burst_limit {
            return Err(DropReason::QuotaExceeded(QuotaLimit::Burst));
        }
        if ledger.daily_count >= self.config.daily_limit {
            return Err(DropReason::QuotaExceeded(QuotaLimit::Daily));
        }
        if ledger.monthly_count >= self.config.monthly_limit {
            return Err(DropReason::QuotaExceeded(QuotaLimit::Monthly));
        }

        Ok(())
    }

    /// Charges the quota for an admitted report and persists the ledger.
    /// Must only be called after every later stage has also admitted the
    /// report, so dropped items never consume quota.
    pub fn charge(&self, now: DateTime<Utc>) {
        {
            let mut ledger = self.ledger.lock();
            self.reconcile_locked(&mut ledger, now);
            ledger.daily_count += 1;
            ledger.monthly_count += 1;
            ledger.burst_timestamps.push(now);
        }
        self.persist();
    }

    /// Returns a snapshot of the current ledger.
    pub fn snapshot(&self) -> QuotaLedger {
        self.ledger.lock().clone()
    }

    /// Resets every counter to zero, as if the ledger had just rolled over,
    /// and persists the reset.
    pub fn reset(&self, now: DateTime<Utc>) {
        {
            let mut ledger = self.ledger.lock();
            *ledger = QuotaLedger {
                last_day_key: day_key(now),
                last_month_key: month_key(now),
                ..QuotaLedger::default()
            };
        }
        self.persist();
    }

    fn persist(&self) {
        let ledger = self.ledger.lock().clone();
        match serde_json::to_string(&ledger) {
            Ok(raw) => {
                if let Err(error) = self.store.set(STORE_KEY, &raw) {
                    tracing::warn!(%error, "failed to persist quota ledger");
                }
            }
            Err(error) => tracing::warn!(%error, "failed to serialize quota ledger"),
        }
    }
}
