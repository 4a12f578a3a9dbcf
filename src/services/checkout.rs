//! Checkout service
//!
//! Entry point for the web layer: picks the provider, builds a
//! `ProviderSession` per call and makes callback completion idempotent.

use crate::payments::audit::AuditLog;
use crate::payments::callback::CallbackStateStore;
use crate::payments::error::{PaymentError, PaymentResult, StateErrorKind};
use crate::payments::factory::ProviderRegistry;
use crate::payments::session::ProviderSession;
use crate::payments::types::{CallContext, Money, NormalizedResult, ParameterSet, PaymentRequest, ProviderName};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

type CompletionCell = Arc<OnceCell<NormalizedResult>>;

pub struct CheckoutService {
    registry: Arc<ProviderRegistry>,
    store: Arc<dyn CallbackStateStore>,
    audit: Arc<dyn AuditLog>,
    callback_ttl: Duration,
    completions: Mutex<HashMap<String, (Instant, CompletionCell)>>,
}

impl CheckoutService {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        store: Arc<dyn CallbackStateStore>,
        audit: Arc<dyn AuditLog>,
        callback_ttl: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            audit,
            callback_ttl,
            completions: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    fn session(&self, provider: ProviderName, ctx: CallContext) -> PaymentResult<ProviderSession> {
        let provider = self.registry.get(provider)?;
        Ok(ProviderSession::new(
            provider,
            self.store.clone(),
            self.audit.clone(),
            ctx,
        ))
    }

    /// Starts a payment with `provider`, or the registry default when `None`.
    pub async fn process(
        &self,
        provider: Option<ProviderName>,
        request: PaymentRequest,
        ctx: CallContext,
    ) -> PaymentResult<NormalizedResult> {
        let provider = provider.unwrap_or_else(|| self.registry.default_provider());
        self.session(provider, ctx)?.process(request).await
    }

    /// Completes the payment behind `token`. Once the gateway has settled the
    /// payment, every later callback for it gets that same result. Unsettled
    /// outcomes (a post that failed verification, a capture that got no
    /// answer) are returned without being recorded, so the next callback runs
    /// again.
    pub async fn complete(
        &self,
        provider: ProviderName,
        token: &str,
        posted: ParameterSet,
        ctx: CallContext,
    ) -> PaymentResult<NormalizedResult> {
        let context = self.store.resolve(token).await?;
        if context.provider != provider {
            return Err(PaymentError::state(
                StateErrorKind::TokenNotFound,
                format!("callback token is not registered for {}", provider),
            ));
        }

        let cell = {
            let mut completions = self.completions.lock().await;
            completions
                .entry(context.payment_id.clone())
                .or_insert_with(|| (Instant::now(), Arc::new(OnceCell::new())))
                .1
                .clone()
        };

        if cell.initialized() {
            debug!(
                provider = %provider,
                payment_id = %context.payment_id,
                "duplicate callback, returning recorded result"
            );
        }

        let session = self.session(provider, ctx)?;
        let settled = cell
            .get_or_try_init(|| async move {
                match session.complete(context, posted).await {
                    Ok(result) if result.is_settled() => Ok(result),
                    unsettled => Err(unsettled),
                }
            })
            .await;
        match settled {
            Ok(result) => Ok(result.clone()),
            Err(unsettled) => unsettled,
        }
    }

    pub async fn cancel(
        &self,
        provider: ProviderName,
        payment_id: &str,
        ctx: CallContext,
    ) -> PaymentResult<NormalizedResult> {
        self.session(provider, ctx)?.cancel(payment_id).await
    }

    pub async fn refund(
        &self,
        provider: ProviderName,
        payment_id: &str,
        amount: Money,
        ctx: CallContext,
    ) -> PaymentResult<NormalizedResult> {
        self.session(provider, ctx)?.refund(payment_id, amount).await
    }

    pub async fn status(
        &self,
        provider: ProviderName,
        payment_id: &str,
        ctx: CallContext,
    ) -> PaymentResult<NormalizedResult> {
        self.session(provider, ctx)?.status(payment_id).await
    }

    /// Drops callback state expired for longer than `retention`, along with
    /// completion results whose token can no longer resolve.
    pub async fn sweep(&self, retention: Duration) -> PaymentResult<usize> {
        let purged = self.store.purge_expired(retention).await?;

        let horizon = self.callback_ttl + retention;
        let mut completions = self.completions.lock().await;
        let before = completions.len();
        completions.retain(|_, (created, _)| created.elapsed() < horizon);
        let dropped = before - completions.len();

        if purged > 0 || dropped > 0 {
            info!(
                purged_tokens = purged,
                dropped_completions = dropped,
                "callback state swept"
            );
        }
        Ok(purged)
    }
}
