//! Token-addressed transaction context that survives the bank redirect.
//!
//! A token is the only credential the returning browser presents, so it is a
//! random UUID v4 encoded base64url, never anything derived from the payment.

pub mod memory;
#[cfg(feature = "cache")]
pub mod redis_store;

pub use memory::InMemoryCallbackStore;
#[cfg(feature = "cache")]
pub use redis_store::RedisCallbackStore;

use crate::payments::error::{PaymentError, PaymentResult, StateErrorKind};
use crate::payments::types::{ProviderName, TransactionContext};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Path segment the web layer mounts the re-entry endpoint under.
pub const CALLBACK_PATH: &str = "/api/payments/callback";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackHandle {
    pub token: String,
    pub url: String,
}

impl CallbackHandle {
    /// Fresh token and URL. Nothing is stored yet; gateways that sign the
    /// return URL need it before the context exists.
    pub fn generate(public_base_url: &str, provider: ProviderName) -> Self {
        let token = URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes());
        let url = format!(
            "{}{}/{}/{}",
            public_base_url.trim_end_matches('/'),
            CALLBACK_PATH,
            provider,
            token
        );
        Self { token, url }
    }
}

/// Stored form of a context. `expires_at` is checked on every read, so an
/// entry the backend has not evicted yet still reports expired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredContext {
    pub context: TransactionContext,
    pub expires_at: DateTime<Utc>,
}

impl StoredContext {
    pub fn new(context: TransactionContext, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            context,
            expires_at: Utc::now() + ttl,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Past expiry by more than `retention`: safe to forget.
    pub fn is_purgeable_at(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        let retention =
            chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::zero());
        now >= self.expires_at + retention
    }

    pub fn into_context(self, token: &str) -> PaymentResult<TransactionContext> {
        if self.is_expired_at(Utc::now()) {
            return Err(expired(token));
        }
        Ok(self.context)
    }
}

pub(crate) fn not_found(token: &str) -> PaymentError {
    PaymentError::state(
        StateErrorKind::TokenNotFound,
        format!(
            "no callback state for token {}",
            crate::logging::mask_token(token)
        ),
    )
}

pub(crate) fn expired(token: &str) -> PaymentError {
    PaymentError::state(
        StateErrorKind::TokenExpired,
        format!(
            "callback token {} has expired",
            crate::logging::mask_token(token)
        ),
    )
}

#[async_trait]
pub trait CallbackStateStore: Send + Sync {
    fn public_base_url(&self) -> &str;

    /// Bind `context` to an already generated token.
    async fn put(&self, token: &str, context: TransactionContext) -> PaymentResult<()>;

    /// Non-destructive; resolving the same token twice yields equal contexts.
    async fn resolve(&self, token: &str) -> PaymentResult<TransactionContext>;

    /// Drop entries expired for longer than `retention`. Returns how many went.
    async fn purge_expired(&self, retention: Duration) -> PaymentResult<usize>;

    async fn create(&self, context: TransactionContext) -> PaymentResult<CallbackHandle> {
        let handle = CallbackHandle::generate(self.public_base_url(), context.provider);
        self.put(&handle.token, context).await?;
        Ok(handle)
    }
}
