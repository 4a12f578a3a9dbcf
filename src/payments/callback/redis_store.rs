use super::{not_found, CallbackStateStore, StoredContext};
use crate::cache::keys::callback::TokenKey;
use crate::cache::{CacheError, RedisPool};
use crate::config::CallbackConfig;
use crate::payments::error::PaymentResult;
use crate::payments::types::TransactionContext;
use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, warn};

/// Shared store for multi-instance deployments.
///
/// Each entry carries its own `expires_at`; the Redis key outlives it by the
/// retention window so late callbacks still get "expired" rather than
/// "unknown". Redis evicts the key itself afterwards, which is why
/// [`CallbackStateStore::purge_expired`] has nothing to do here.
pub struct RedisCallbackStore {
    pool: RedisPool,
    public_base_url: String,
    ttl: Duration,
    retention: Duration,
}

impl RedisCallbackStore {
    pub fn new(pool: RedisPool, config: &CallbackConfig) -> Self {
        Self {
            pool,
            public_base_url: config.public_base_url.clone(),
            ttl: config.ttl(),
            retention: config.retention(),
        }
    }

    fn key_ttl_secs(&self) -> u64 {
        (self.ttl + self.retention).as_secs().max(1)
    }
}

#[async_trait]
impl CallbackStateStore for RedisCallbackStore {
    fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    async fn put(&self, token: &str, context: TransactionContext) -> PaymentResult<()> {
        let key = TokenKey::new(token).to_string();
        let payload = serde_json::to_string(&StoredContext::new(context, self.ttl))
            .map_err(CacheError::from)?;

        let mut conn = self.pool.get().await.map_err(|e| {
            warn!("Failed to get Redis connection: {}", e);
            CacheError::from(e)
        })?;
        let _: () = conn
            .set_ex(&key, payload, self.key_ttl_secs())
            .await
            .map_err(|e| {
                warn!("Redis SET_EX failed for callback token: {}", e);
                CacheError::from(e)
            })?;

        debug!(
            token = %crate::logging::mask_token(token),
            key_ttl_secs = self.key_ttl_secs(),
            "callback state stored"
        );
        Ok(())
    }

    async fn resolve(&self, token: &str) -> PaymentResult<TransactionContext> {
        let key = TokenKey::new(token).to_string();
        let mut conn = self.pool.get().await.map_err(CacheError::from)?;
        let raw: Option<String> = conn.get(&key).await.map_err(CacheError::from)?;

        match raw {
            Some(json) => {
                let stored: StoredContext =
                    serde_json::from_str(&json).map_err(CacheError::from)?;
                stored.into_context(token)
            }
            None => Err(not_found(token)),
        }
    }

    async fn purge_expired(&self, _retention: Duration) -> PaymentResult<usize> {
        Ok(0)
    }
}
