use crate::database::error::DatabaseError;
use crate::payments::audit::{redact, AuditKind, AuditLog};
use crate::payments::error::PaymentResult;
use crate::payments::types::ProviderName;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use tracing::debug;

/// Row of `gateway_audit_log`
#[derive(Debug, Clone, FromRow)]
pub struct AuditLogRow {
    pub id: i64,
    pub provider: String,
    pub kind: String,
    pub payment_id: String,
    pub payload: JsonValue,
    pub log_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Postgres-backed audit log
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Every row recorded for a payment, oldest first
    pub async fn entries_for(&self, payment_id: &str) -> Result<Vec<AuditLogRow>, DatabaseError> {
        sqlx::query_as::<_, AuditLogRow>(
            "SELECT id, provider, kind, payment_id, payload, log_id, created_at
             FROM gateway_audit_log
             WHERE payment_id = $1
             ORDER BY id ASC",
        )
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

#[async_trait]
impl AuditLog for PgAuditLog {
    async fn record(
        &self,
        provider: ProviderName,
        kind: AuditKind,
        payment_id: &str,
        payload: JsonValue,
        log_id: &str,
    ) -> PaymentResult<()> {
        sqlx::query(
            "INSERT INTO gateway_audit_log (provider, kind, payment_id, payload, log_id)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(provider.as_str())
        .bind(kind.as_str())
        .bind(payment_id)
        .bind(redact(payload))
        .bind(log_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        debug!(provider = %provider, kind = kind.as_str(), payment_id = %payment_id, "audit entry recorded");
        Ok(())
    }

    async fn field_from_log(
        &self,
        provider: ProviderName,
        payment_id: &str,
        field: &str,
    ) -> PaymentResult<Option<String>> {
        let value = sqlx::query_scalar::<_, Option<String>>(
            "SELECT payload ->> $3
             FROM gateway_audit_log
             WHERE provider = $1 AND payment_id = $2 AND payload ->> $3 IS NOT NULL
               AND payload ->> $3 <> ''
             ORDER BY id DESC
             LIMIT 1",
        )
        .bind(provider.as_str())
        .bind(payment_id)
        .bind(field)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(value.flatten())
    }
}
