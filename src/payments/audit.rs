//! Audit trail of gateway traffic, and the place later calls recover stashed
//! references from once the in-memory context is gone.

use crate::payments::error::PaymentResult;
use crate::payments::types::ProviderName;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tokio::sync::RwLock;

/// Stash field names read back by capture, cancel, refund and status.
pub mod fields {
    pub const CARD_TOKEN: &str = "card_token";
    pub const REFERENCE_NUMBER: &str = "reference_number";
    pub const SESSION_ID: &str = "session_id";
    pub const TRANSACTION_ID: &str = "transaction_id";
    pub const ENVIRONMENT: &str = "environment";
    pub const PHONE: &str = "phone";
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Request,
    Response,
    Callback,
    Stash,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::Request => "request",
            AuditKind::Response => "response",
            AuditKind::Callback => "callback",
            AuditKind::Stash => "stash",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub provider: ProviderName,
    pub kind: AuditKind,
    pub payment_id: String,
    pub payload: JsonValue,
    pub log_id: String,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Payloads are redacted before they are persisted.
    async fn record(
        &self,
        provider: ProviderName,
        kind: AuditKind,
        payment_id: &str,
        payload: JsonValue,
        log_id: &str,
    ) -> PaymentResult<()>;

    /// Latest recorded value of a top-level payload field.
    async fn field_from_log(
        &self,
        provider: ProviderName,
        payment_id: &str,
        field: &str,
    ) -> PaymentResult<Option<String>>;
}

const CARD_KEYS: &[&str] = &["cardnumber", "pan", "number"];
const SECRET_KEYS: &[&str] = &[
    "cvv",
    "cv2",
    "cvc",
    "password",
    "secretcode",
    "storekey",
    "securitytoken",
];

fn normalized_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Masks card numbers to their last four digits and blanks CVVs and credentials.
pub fn redact(payload: JsonValue) -> JsonValue {
    match payload {
        JsonValue::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                let normalized = normalized_key(&key);
                let value = if CARD_KEYS.contains(&normalized.as_str()) {
                    match value {
                        JsonValue::String(s) => {
                            JsonValue::String(crate::logging::mask_card_number(&s))
                        }
                        other => redact(other),
                    }
                } else if SECRET_KEYS.contains(&normalized.as_str()) {
                    JsonValue::String("***".to_string())
                } else {
                    redact(value)
                };
                out.insert(key, value);
            }
            JsonValue::Object(out)
        }
        JsonValue::Array(items) => JsonValue::Array(items.into_iter().map(redact).collect()),
        other => other,
    }
}

pub(crate) fn field_as_string(payload: &JsonValue, field: &str) -> Option<String> {
    match payload.get(field)? {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Process-local audit log, used in tests and when no database is configured.
#[derive(Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }

    pub async fn entries_for(&self, payment_id: &str) -> Vec<AuditEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.payment_id == payment_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn record(
        &self,
        provider: ProviderName,
        kind: AuditKind,
        payment_id: &str,
        payload: JsonValue,
        log_id: &str,
    ) -> PaymentResult<()> {
        self.entries.write().await.push(AuditEntry {
            provider,
            kind,
            payment_id: payment_id.to_string(),
            payload: redact(payload),
            log_id: log_id.to_string(),
            recorded_at: Utc::now(),
        });
        Ok(())
    }

    async fn field_from_log(
        &self,
        provider: ProviderName,
        payment_id: &str,
        field: &str,
    ) -> PaymentResult<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .rev()
            .filter(|e| e.provider == provider && e.payment_id == payment_id)
            .find_map(|e| field_as_string(&e.payload, field)))
    }
}
