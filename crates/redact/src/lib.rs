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

//! The redaction pass and the validator.
//!
//! Both share a single ordered table of sensitive-pattern matchers: the
//! redactor replaces matches with `"[REDACTED]"`, the validator only
//! detects them, surfacing a warning to the Health Monitor without ever
//! failing the report on their account.

use reportwire_model::ErrorReport;

mod patterns;

pub use patterns::{PatternKind, SensitivePattern};

const MAX_TRAVERSAL_DEPTH: usize = 10;

/// Names containing any of these substrings (case-insensitive) cause the
/// whole value, regardless of type, to be replaced with `"[REDACTED]"`.
const SENSITIVE_KEY_SUBSTRINGS: &[&str] = &["password", "token", "secret", "key", "auth", "credential"];

fn is_sensitive_key(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SENSITIVE_KEY_SUBSTRINGS.iter().any(|needle| lower.contains(needle))
}

/// Scrubs sensitive patterns from text and object trees, and performs
/// key-name based wholesale redaction.
pub struct Redactor {
    patterns: Vec<SensitivePattern>,
}

impl Redactor {
    /// Builds a redactor with the default sensitive-pattern table (§4.4).
    pub fn new() -> Self {
        Self {
            patterns: patterns::default_table(),
        }
    }

    /// Returns the labels of every pattern that matches `text`, without
    /// modifying it. Used for the validator's warning-only detection pass.
    pub fn scan(&self, text: &str) -> Vec<&'static str> {
        self.patterns
            .iter()
            .filter(|pattern| pattern.regex.is_match(text))
            .map(|pattern| pattern.label)
            .collect()
    }

    /// Replaces every sensitive-pattern match in `text` with `"[REDACTED]"`.
    pub fn redact_text(&self, text: &str) -> String {
        let mut out = text.to_string();
        for pattern in &self.patterns {
            out = pattern.regex.replace_all(&out, "[REDACTED]").into_owned();
        }
        out
    }

    /// Runs the full redaction pass over `report`, mutating `message`,
    /// `stack_trace`, `context`, `user`, and every breadcrumb's `data` in
    /// place, per the stage-3 ordering of the pipeline. Returns the labels
    /// of every sensitive pattern detected, scanned *before* replacement,
    /// for the caller to forward to the Health Monitor.
    pub fn redact_report(&self, report: &mut ErrorReport) -> Vec<&'static str> {
        let mut warnings = Vec::new();

        warnings.extend(self.scan(&report.message));
        report.message = self.redact_text(&report.message);

        warnings.extend(self.scan(&report.stack_trace));
        report.stack_trace = self.redact_text(&report.stack_trace);

        if let Some(context) = report.context.as_mut() {
            self.scrub_value(context, 0, &mut warnings);
        }
        if let Some(user) = report.user.as_mut() {
            self.scrub_value(user, 0, &mut warnings);
        }
        for breadcrumb in &mut report.breadcrumbs {
            if let Some(data) = breadcrumb.data.as_mut() {
                self.scrub_value(data, 0, &mut warnings);
            }
        }

        warnings
    }

    /// Recursively scrubs a JSON value: objects are walked key-wise (a
    /// sensitive key name replaces its whole value regardless of type),
    /// arrays element-wise, strings pattern-matched. `serde_json::Value`
    /// is a tree with owned children, so true reference cycles cannot
    /// occur; the depth bound still guards against pathologically deep
    /// nesting, collapsing it to a sentinel rather than recursing further.
    fn scrub_value(&self, value: &mut serde_json::Value, depth: usize, warnings: &mut Vec<&'static str>) {
        if depth > MAX_TRAVERSAL_DEPTH {
            *value = serde_json::Value::String("[Max Depth]".to_string());
            return;
        }

        match value {
            serde_json::Value::Object(map) => {
                for (key, entry) in map.iter_mut() {
                    if is_sensitive_key(key) {
                        *entry = serde_json::Value::String("[REDACTED]".to_string());
                    } else {
                        self.scrub_value(entry, depth + 1, warnings);
                    }
                }
            }
            serde_json::Value::Array(items) => {
                for item in items.iter_mut() {
                    self.scrub_value(item, depth + 1, warnings);
                }
            }
            serde_json::Value::String(text) => {
                warnings.extend(self.scan(text));
                *text = self.redact_text(text);
            }
            serde_json::Value::Null | serde_json::Value::Bool(_) | serde_json::Value::Number(_) => {}
        }
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors returned by [`validate`].
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A required field was empty.
    #[error("required field `{field}` is empty")]
    MissingField {
        /// The empty field's name.
        field: &'static str,
    },

    /// The serialized report exceeds the configured payload limit.
    #[error("payload size {size} exceeds max_payload_size {max}")]
    TooLarge {
        /// The serialized size, in bytes.
        size: usize,
        /// The configured limit.
        max: usize,
    },
}

/// Validates `report` against the required-fields and size checks (§4.4).
/// Sensitive-pattern matches are warning-only and never cause a failure
/// here; callers should run [`Redactor::scan`] (or inspect the warnings
/// returned by [`Redactor::redact_report`]) to surface them separately.
pub fn validate(report: &ErrorReport, max_payload_size: usize) -> Result<(), Error> {
    if report.message.trim().is_empty() {
        return Err(Error::MissingField { field: "message" });
    }
    if report.project.trim().is_empty() {
        return Err(Error::MissingField { field: "project" });
    }
    if report.environment.trim().is_empty() {
        return Err(Error::MissingField { field: "environment" });
    }

    let size = report.serialized_size();
    if size > max_payload_size {
        return Err(Error::TooLarge { size, max: max_payload_size });
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use serde_json::json;
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

    #[test]
    fn sensitive_key_name_is_wholesale_redacted_regardless_of_value_type() {
        let redactor = Redactor::new();
        let mut report = report();
        report.context = Some(json!({"password": "hunter2", "retries": 3}));
        let _ = redactor.redact_report(&mut report);
        let context = report.context.unwrap();
        assert_eq!(context["password"], json!("[REDACTED]"));
        assert_eq!(context["retries"], json!(3));
    }

    #[test]
    fn email_pattern_is_redacted_and_surfaces_a_warning() {
        let redactor = Redactor::new();
        let mut report = report();
        report.message = "contact a@b.com for help".into();
        let warnings = redactor.redact_report(&mut report);
        assert!(!report.message.contains("a@b.com"));
        assert!(warnings.contains(&"email"));
    }

    #[test]
    fn redacting_an_already_redacted_report_is_a_fixpoint() {
        let redactor = Redactor::new();
        let mut report = report();
        report.message = "card 4111-1111-1111-1111".into();
        let _ = redactor.redact_report(&mut report);
        let once = report.message.clone();
        let _ = redactor.redact_report(&mut report);
        assert_eq!(once, report.message);
    }

    #[test]
    fn deeply_nested_object_collapses_to_max_depth_sentinel() {
        let redactor = Redactor::new();
        let mut value = json!("leaf");
        for _ in 0..20 {
            value = json!({ "nested": value });
        }
        let mut warnings = Vec::new();
        redactor.scrub_value(&mut value, 0, &mut warnings);

        let mut cursor = &value;
        let mut depth = 0;
        while let Some(next) = cursor.get("nested") {
            cursor = next;
            depth += 1;
        }
        assert!(depth <= MAX_TRAVERSAL_DEPTH + 1);
        assert_eq!(*cursor, json!("[Max Depth]"));
    }

    #[test]
    fn validate_rejects_empty_message() {
        let mut report = report();
        report.message = String::new();
        assert!(matches!(validate(&report, 10_000), Err(Error::MissingField { field: "message" })));
    }

    #[test]
    fn validate_rejects_oversized_payload() {
        let mut report = report();
        report.message = "x".repeat(1000);
        assert!(matches!(validate(&report, 10), Err(Error::TooLarge { .. })));
    }

    #[test]
    fn validate_ignores_sensitive_patterns() {
        let mut report = report();
        report.message = "ssn 123-45-6789".into();
        assert!(validate(&report, 10_000).is_ok());
    }
}
