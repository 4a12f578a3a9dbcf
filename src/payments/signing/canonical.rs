//! Pipe-joined canonical form of a flat parameter map.
//!
//! The string produced here is what gets hashed. Its shape is fixed per
//! gateway by [`CanonicalRules`]; two requests that carry the same key/value
//! set always canonicalize to the same bytes regardless of insertion order.

use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrder {
    /// Compare lowercased keys; identical lowercased keys fall back to byte order.
    CaseInsensitive,
    /// Plain byte order.
    CaseSensitive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretBoundary {
    /// `...|value|secret`
    Bare,
    /// `...|value|secret|`
    Terminated,
}

#[derive(Debug, Clone, Copy)]
pub struct CanonicalRules {
    pub excluded_keys: &'static [&'static str],
    pub key_order: KeyOrder,
    pub secret_boundary: SecretBoundary,
}

impl CanonicalRules {
    fn is_excluded(&self, key: &str) -> bool {
        self.excluded_keys
            .iter()
            .any(|excluded| excluded.eq_ignore_ascii_case(key))
    }

    fn compare(&self, a: &str, b: &str) -> Ordering {
        match self.key_order {
            KeyOrder::CaseSensitive => a.cmp(b),
            KeyOrder::CaseInsensitive => a
                .to_lowercase()
                .cmp(&b.to_lowercase())
                .then_with(|| a.cmp(b)),
        }
    }
}

/// Escape backslashes first, then pipes.
pub fn escape_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('|', "\\|")
}

/// Keys that take part in the signature, in signing order.
pub fn signing_keys<'a>(
    params: &'a BTreeMap<String, String>,
    rules: &CanonicalRules,
) -> Vec<&'a str> {
    let mut keys: Vec<&str> = params
        .keys()
        .map(String::as_str)
        .filter(|key| !rules.is_excluded(key))
        .collect();
    keys.sort_by(|a, b| rules.compare(a, b));
    keys
}

/// Build the string that gets hashed.
pub fn canonicalize(
    params: &BTreeMap<String, String>,
    secret: &str,
    rules: &CanonicalRules,
) -> String {
    let mut out = String::new();
    for key in signing_keys(params, rules) {
        if let Some(value) = params.get(key) {
            out.push_str(&escape_value(value));
            out.push('|');
        }
    }
    out.push_str(&escape_value(secret));
    if rules.secret_boundary == SecretBoundary::Terminated {
        out.push('|');
    }
    out
}
