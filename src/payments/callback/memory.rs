use super::{expired, not_found, CallbackStateStore, StoredContext};
use crate::config::CallbackConfig;
use crate::payments::error::PaymentResult;
use crate::payments::types::TransactionContext;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Process-local store. Entries do not survive a restart.
pub struct InMemoryCallbackStore {
    public_base_url: String,
    ttl: Duration,
    entries: RwLock<HashMap<String, StoredContext>>,
}

impl InMemoryCallbackStore {
    pub fn new(public_base_url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            public_base_url: public_base_url.into(),
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &CallbackConfig) -> Self {
        Self::new(config.public_base_url.clone(), config.ttl())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CallbackStateStore for InMemoryCallbackStore {
    fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    async fn put(&self, token: &str, context: TransactionContext) -> PaymentResult<()> {
        let stored = StoredContext::new(context, self.ttl);
        debug!(
            token = %crate::logging::mask_token(token),
            payment_id = %stored.context.payment_id,
            expires_at = %stored.expires_at,
            "callback state stored"
        );
        self.entries.write().await.insert(token.to_string(), stored);
        Ok(())
    }

    async fn resolve(&self, token: &str) -> PaymentResult<TransactionContext> {
        let entries = self.entries.read().await;
        match entries.get(token) {
            Some(stored) if stored.is_expired_at(Utc::now()) => Err(expired(token)),
            Some(stored) => Ok(stored.context.clone()),
            None => Err(not_found(token)),
        }
    }

    async fn purge_expired(&self, retention: Duration) -> PaymentResult<usize> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, stored| !stored.is_purgeable_at(now, retention));
        Ok(before - entries.len())
    }
}
