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

//! Configuration surface for the reportwire pipeline.
//!
//! `Config` carries every pipeline-relevant option with the defaults
//! documented in the system's configuration surface, and is validated with
//! the `validator` crate the way the teacher's `config` crate validates
//! receiver/processor/exporter configuration.

use std::{fmt, sync::Arc};

use reportwire_model::ErrorReport;
use validator::{Validate, ValidationError};

/// All the errors that can occur while building or validating a `Config`.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// One or more fields failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    /// `webhook_url` is not an absolute `https://` URL while `require_https`
    /// is set.
    #[error("webhook_url must use https:// (project: {project}, url: {url})")]
    InsecureWebhook {
        /// The configured project name.
        project: String,
        /// The offending URL.
        url: String,
    },
}

/// A synchronous transformer from report to report-or-drop-signal, invoked
/// as the last user-controllable stage before rate limiting. Returning
/// `None` drops the report.
pub type BeforeSend = Arc<dyn Fn(ErrorReport) -> Option<ErrorReport> + Send + Sync>;

fn validate_webhook_url(url: &str) -> Result<(), ValidationError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        let mut err = ValidationError::new("webhook_url");
        err.message = Some("must be an absolute http(s) URL".into());
        Err(err)
    }
}

/// The pipeline's configuration. All fields are optional except
/// `webhook_url` and `project_name`; every other field has a documented
/// default, applied by [`Config::new`].
#[derive(Clone, Validate)]
pub struct Config {
    /// Ingestion endpoint the transport POSTs to.
    #[validate(custom(function = "validate_webhook_url"))]
    pub webhook_url: String,
    /// Configured project name, attached to every report.
    #[validate(length(min = 1))]
    pub project_name: String,

    /// Master gate; capture calls are no-ops when `false`.
    pub enabled: bool,
    /// Free-form deployment label (e.g. `"production"`, `"staging"`).
    pub environment: String,

    /// Maximum breadcrumbs retained by the (external) breadcrumb recorder.
    #[validate(range(min = 1))]
    pub max_breadcrumbs: u32,
    /// Maximum serialized payload size, in bytes, admitted by the validator.
    #[validate(range(min = 1))]
    pub max_payload_size: usize,
    /// Per-request transport timeout.
    #[validate(range(min = 1))]
    pub timeout_ms: u64,

    /// Maximum admitted requests per rolling window.
    #[validate(range(min = 1))]
    pub max_requests_per_minute: u32,
    /// Duplicate-suppression window for identical fingerprints.
    #[validate(range(min = 0))]
    pub duplicate_error_window_ms: i64,

    /// Maximum retry attempts after the initial send.
    #[validate(range(max = 20))]
    pub max_retries: u32,
    /// Initial backoff delay before the first retry.
    #[validate(range(min = 1))]
    pub initial_retry_delay_ms: u64,
    /// Upper bound on backoff delay.
    #[validate(range(min = 1))]
    pub max_retry_delay_ms: u64,
    /// Backoff growth factor applied per attempt.
    #[validate(range(min = 1.0))]
    pub retry_multiplier: f64,

    /// Whether failed/offline sends are durably queued for later retry.
    pub enable_offline_support: bool,
    /// Maximum number of entries retained in the offline queue.
    #[validate(range(min = 1))]
    pub max_offline_queue_size: usize,
    /// Maximum age of a queued item before it is pruned, unsent.
    #[validate(range(min = 1))]
    pub offline_queue_max_age_ms: i64,

    /// Require `webhook_url` to use `https://`. Defaults to `true` iff
    /// `environment == "production"`.
    pub require_https: bool,

    /// Maximum admitted reports per UTC day.
    #[validate(range(min = 1))]
    pub daily_limit: u64,
    /// Maximum admitted reports per UTC month.
    #[validate(range(min = 1))]
    pub monthly_limit: u64,
    /// Maximum admitted reports per rolling burst window.
    #[validate(range(min = 1))]
    pub burst_limit: u64,
    /// Width of the rolling burst window.
    #[validate(range(min = 1))]
    pub burst_window_ms: i64,

    /// Whether oversize envelopes are gzip-compressed before transport.
    pub enable_compression: bool,
    /// Minimum serialized size, in bytes, before compression is applied.
    #[validate(range(min = 0))]
    pub compression_threshold_bytes: usize,

    /// Whether admitted reports are grouped into batches before transport.
    pub enable_batching: bool,
    /// Maximum reports per batch.
    #[validate(range(min = 1))]
    pub batch_size: usize,
    /// Maximum time an incomplete batch is held before it is flushed.
    #[validate(range(min = 1))]
    pub batch_timeout_ms: u64,
    /// Maximum estimated serialized size of a batch before it is flushed.
    #[validate(range(min = 1))]
    pub max_batch_payload_size: usize,

    /// Fraction in `[0, 1]` of observed requests that must fail within the
    /// monitoring period for the breaker to trip.
    #[validate(range(min = 0.0, max = 1.0))]
    pub circuit_failure_threshold: f64,
    /// Minimum number of observed requests before the failure rate is
    /// evaluated.
    #[validate(range(min = 1))]
    pub circuit_minimum_requests: u32,
    /// Width of the sliding window used to evaluate the failure rate.
    #[validate(range(min = 1))]
    pub circuit_monitoring_period_ms: i64,
    /// Time after entering `OPEN` before a trial request is allowed.
    #[validate(range(min = 1))]
    pub circuit_reset_timeout_ms: i64,

    /// User filter hook, invoked with the redacted report.
    #[validate(skip)]
    pub before_send: Option<BeforeSend>,
    /// Enables stage-level diagnostic logging.
    pub debug: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("webhook_url", &self.webhook_url)
            .field("project_name", &self.project_name)
            .field("enabled", &self.enabled)
            .field("environment", &self.environment)
            .field("max_payload_size", &self.max_payload_size)
            .field("before_send", &self.before_send.as_ref().map(|_| "<closure>"))
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Creates a configuration for `project_name` shipping to `webhook_url`,
    /// with every other field set to its documented default.
    pub fn new(webhook_url: impl Into<String>, project_name: impl Into<String>) -> Self {
        let environment = "development".to_string();
        let require_https = environment == "production";
        Self {
            webhook_url: webhook_url.into(),
            project_name: project_name.into(),
            enabled: true,
            environment,
            max_breadcrumbs: 50,
            max_payload_size: 1024 * 1024,
            timeout_ms: 5000,
            max_requests_per_minute: 10,
            duplicate_error_window_ms: 5000,
            max_retries: 3,
            initial_retry_delay_ms: 1000,
            max_retry_delay_ms: 30_000,
            retry_multiplier: 2.0,
            enable_offline_support: true,
            max_offline_queue_size: 50,
            offline_queue_max_age_ms: 86_400_000,
            require_https,
            daily_limit: 1000,
            monthly_limit: 10_000,
            burst_limit: 50,
            burst_window_ms: 60_000,
            enable_compression: true,
            compression_threshold_bytes: 1024,
            enable_batching: true,
            batch_size: 5,
            batch_timeout_ms: 5000,
            max_batch_payload_size: 102_400,
            circuit_failure_threshold: 0.5,
            circuit_minimum_requests: 10,
            circuit_monitoring_period_ms: 60_000,
            circuit_reset_timeout_ms: 30_000,
            before_send: None,
            debug: false,
        }
    }

    /// Sets the deployment environment, re-deriving `require_https` from it
    /// unless it has already been set explicitly via [`Config::with_require_https`].
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self.require_https = self.environment == "production";
        self
    }

    /// Explicitly overrides `require_https`, taking precedence over the
    /// environment-derived default.
    #[must_use]
    pub fn with_require_https(mut self, require_https: bool) -> Self {
        self.require_https = require_https;
        self
    }

    /// Sets the `beforeSend` user filter hook.
    #[must_use]
    pub fn with_before_send(mut self, hook: BeforeSend) -> Self {
        self.before_send = Some(hook);
        self
    }

    /// Validates the configuration, returning the first batch of
    /// validation failures. A failure here is the "fatal failure" path of
    /// the error handling design: the SDK is constructed disabled and every
    /// capture call becomes a no-op.
    pub fn validate_config(&self) -> Result<(), Error> {
        self.validate()?;

        if self.require_https && !self.webhook_url.starts_with("https://") {
            return Err(Error::InsecureWebhook {
                project: self.project_name.clone(),
                url: self.webhook_url.clone(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::new("https://example.com/hook", "proj");
        assert_eq!(config.max_requests_per_minute, 10);
        assert_eq!(config.daily_limit, 1000);
        assert_eq!(config.monthly_limit, 10_000);
        assert_eq!(config.burst_limit, 50);
        assert_eq!(config.max_payload_size, 1_048_576);
        assert!(config.enable_batching);
        assert!(config.enable_compression);
        assert!(config.enable_offline_support);
        assert!(config.validate_config().is_ok());
    }

    #[test]
    fn production_environment_requires_https_by_default() {
        let config = Config::new("http://example.com/hook", "proj").with_environment("production");
        assert!(config.require_https);
        assert!(matches!(config.validate_config(), Err(Error::InsecureWebhook { .. })));
    }

    #[test]
    fn explicit_require_https_overrides_environment_default() {
        let config = Config::new("http://example.com/hook", "proj")
            .with_environment("production")
            .with_require_https(false);
        assert!(config.validate_config().is_ok());
    }

    #[test]
    fn rejects_malformed_webhook_url() {
        let config = Config::new("not-a-url", "proj");
        assert!(config.validate_config().is_err());
    }

    #[test]
    fn rejects_empty_project_name() {
        let config = Config::new("https://example.com/hook", "");
        assert!(config.validate_config().is_err());
    }

    #[test]
    fn before_send_is_not_printed_in_debug_output() {
        let config = Config::new("https://example.com/hook", "proj").with_before_send(Arc::new(|r| Some(r)));
        let debug = format!("{config:?}");
        assert!(debug.contains("<closure>"));
    }
}
