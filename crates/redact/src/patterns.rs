//! The sensitive-pattern table (§4.4): one ordered list, shared by the
//! redactor's replace pass and the validator's warning-only detect pass.

use regex::Regex;

/// The kind of sensitive data a pattern matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PatternKind {
    /// A credit card number.
    CreditCard,
    /// A US Social Security Number.
    Ssn,
    /// An email address.
    Email,
    /// A phone number.
    Phone,
    /// An IPv4 address.
    Ipv4,
    /// A JSON Web Token.
    Jwt,
    /// An API key embedded in free text.
    ApiKey,
    /// A password assigned in a quoted key/value pair.
    PasswordKv,
    /// An access token embedded in free text.
    AccessToken,
}

/// One entry in the sensitive-pattern table.
pub struct SensitivePattern {
    /// The kind of data this pattern detects.
    pub kind: PatternKind,
    /// The compiled matcher.
    pub regex: Regex,
    /// A short label surfaced in warnings (e.g. to the Health Monitor).
    pub label: &'static str,
}

/// Builds the default sensitive-pattern table. Every quantifier is
/// explicitly bounded to avoid catastrophic backtracking on attacker
/// controlled input.
pub fn default_table() -> Vec<SensitivePattern> {
    let entries: &[(PatternKind, &str, &str)] = &[
        (PatternKind::CreditCard, r"\b\d{4}[- ]\d{4}[- ]\d{4}[- ]\d{4}\b", "credit_card"),
        (PatternKind::Ssn, r"\b\d{3}-\d{2}-\d{4}\b", "ssn"),
        (PatternKind::Email, r"\b[A-Za-z0-9._%+-]{1,64}@[A-Za-z0-9.-]{1,255}\.[A-Za-z]{2,24}\b", "email"),
        (PatternKind::Phone, r"\b\d{3}[-.]\d{3}[-.]\d{4}\b", "phone"),
        (PatternKind::Ipv4, r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b", "ipv4"),
        (PatternKind::Jwt, r"\beyJ[A-Za-z0-9_-]{1,512}\.[A-Za-z0-9_-]{1,512}\.[A-Za-z0-9_-]{1,512}\b", "jwt"),
        (PatternKind::ApiKey, r"(?i)\bapi[-_]?key[^a-zA-Z0-9]{0,3}[A-Za-z0-9_-]{20,64}\b", "api_key"),
        (PatternKind::PasswordKv, r#"(?i)password["']?\s*[:=]\s*["'][^"']{0,128}["']"#, "password_kv"),
        (PatternKind::AccessToken, r"(?i)\baccess[-_]?token[^a-zA-Z0-9]{0,3}[A-Za-z0-9_-]{20,64}\b", "access_token"),
    ];

    entries
        .iter()
        .map(|(kind, pattern, label)| SensitivePattern {
            kind: *kind,
            regex: Regex::new(pattern).expect("built-in pattern must compile"),
            label,
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_default_pattern_compiles() {
        assert_eq!(default_table().len(), 9);
    }

    #[test]
    fn ssn_pattern_matches_expected_shape() {
        let table = default_table();
        let ssn = table.iter().find(|p| p.kind == PatternKind::Ssn).unwrap();
        assert!(ssn.regex.is_match("123-45-6789"));
        assert!(!ssn.regex.is_match("1234-5-6789"));
    }
}
