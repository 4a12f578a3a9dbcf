//! Drives one payment through tokenize → (session → authenticate) → capture,
//! and the single round-trip follow-ups keyed by stashed references.

use crate::payments::attempt::{AttemptState, PaymentAttempt};
use crate::payments::audit::{fields, AuditKind, AuditLog};
use crate::payments::callback::{CallbackHandle, CallbackStateStore};
use crate::payments::error::{PaymentError, PaymentResult, StateErrorKind};
use crate::payments::normalizer::Operation;
use crate::payments::provider::{PaymentProvider, StashedReferences};
use crate::payments::types::{
    CallContext, CallbackVerdict, ChargeRequest, Environment, Money, NormalizedResult,
    ParameterSet, PaymentRequest, PaymentStatus, TransactionContext,
};
use chrono::Utc;
use serde_json::{json, Map, Value as JsonValue};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ProviderSession {
    provider: Arc<dyn PaymentProvider>,
    store: Arc<dyn CallbackStateStore>,
    audit: Arc<dyn AuditLog>,
    ctx: CallContext,
}

impl ProviderSession {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        store: Arc<dyn CallbackStateStore>,
        audit: Arc<dyn AuditLog>,
        ctx: CallContext,
    ) -> Self {
        Self {
            provider,
            store,
            audit,
            ctx,
        }
    }

    pub fn provider(&self) -> &Arc<dyn PaymentProvider> {
        &self.provider
    }

    /// Starts a payment. Non-3D payments come back settled; 3-D payments come
    /// back Pending with the artifact that sends the browser to the bank.
    pub async fn process(&self, request: PaymentRequest) -> PaymentResult<NormalizedResult> {
        request.validate()?;
        if !self.provider.supports_currency(request.amount.currency) {
            return Err(PaymentError::validation(
                format!(
                    "{} does not accept {}",
                    self.provider.name(),
                    request.amount.currency
                ),
                "amount.currency",
            ));
        }

        let mut attempt = PaymentAttempt::new(&request.payment_id);
        let (card, charge) = request.into_parts();
        self.record(
            AuditKind::Request,
            &charge.payment_id,
            &self.ctx.log_id,
            json!({
                "operation": if charge.three_d { "three_d_payment" } else { "payment" },
                "amount": charge.amount.decimal_string(),
                "currency": charge.amount.currency,
                "installment_count": charge.installment_count,
                "client_ip": self.ctx.client_ip,
            }),
        )
        .await?;

        let token = match self.provider.tokenize(card, &charge, &self.ctx).await {
            Ok(token) => token,
            Err(err) => return self.failed(&mut attempt, &charge, err).await,
        };
        attempt.advance(AttemptState::TokenAcquired)?;

        let mut stash = Map::new();
        stash.insert(fields::CARD_TOKEN.into(), json!(token.as_str()));
        stash.insert(fields::ENVIRONMENT.into(), json!(charge.environment));
        if let Some(phone) = &self.ctx.phone {
            stash.insert(fields::PHONE.into(), json!(phone));
        }
        self.stash(&charge.payment_id, &self.ctx.log_id, stash).await?;

        if !charge.three_d {
            let result = match self.provider.charge(&charge, &token, &self.ctx).await {
                Ok(result) => result,
                Err(err) => return self.failed(&mut attempt, &charge, err).await,
            };
            attempt.advance(AttemptState::Provisioned)?;
            attempt.settle(result.status)?;
            self.stash_references(&result, &self.ctx.log_id).await?;
            self.record_result(Operation::Charge, &result, &self.ctx.log_id)
                .await?;
            info!(
                provider = %self.provider.name(),
                payment_id = %result.payment_id,
                status = result.status.as_str(),
                attempt_state = ?attempt.state(),
                "payment processed"
            );
            return Ok(result);
        }

        let original_callback_url = charge.callback_url.clone().ok_or_else(|| {
            PaymentError::validation("callback_url is required for 3-D payments", "callback_url")
        })?;
        let handle = CallbackHandle::generate(self.store.public_base_url(), self.provider.name());

        let session = match self
            .provider
            .open_session(&charge, &token, &handle.url, &self.ctx)
            .await
        {
            Ok(session) => session,
            Err(err) => return self.failed(&mut attempt, &charge, err).await,
        };
        attempt.advance(AttemptState::SessionOpened)?;

        let artifact = match self
            .provider
            .authentication_artifact(&charge, &session, &handle.url)
        {
            Ok(artifact) => artifact,
            Err(err) => return self.failed(&mut attempt, &charge, err).await,
        };

        let context = TransactionContext {
            tenant_id: self.ctx.tenant_id.clone(),
            provider: self.provider.name(),
            payment_id: charge.payment_id.clone(),
            amount: charge.amount.amount.clone(),
            currency: charge.amount.currency,
            environment: charge.environment,
            client_ip: self.ctx.client_ip.clone(),
            original_callback_url,
            log_id: self.ctx.log_id.clone(),
            session_id: session.session_id.clone(),
            installment_count: charge.installment_count,
            created_at: Utc::now(),
        };
        self.store.put(&handle.token, context).await?;
        attempt.advance(AttemptState::AwaitingAuthentication)?;

        let mut stash = Map::new();
        stash.insert(fields::SESSION_ID.into(), json!(session.session_id));
        if let Some(reference) = &session.reference_number {
            stash.insert(fields::REFERENCE_NUMBER.into(), json!(reference));
        }
        self.stash(&charge.payment_id, &self.ctx.log_id, stash).await?;

        let mut result = NormalizedResult::new(&charge.payment_id, PaymentStatus::Pending)
            .with_money(&charge.amount);
        result.reference_number = session.reference_number;
        result.authentication = Some(artifact);
        result.callback_url = Some(handle.url);
        self.record_result(Operation::Charge, &result, &self.ctx.log_id)
            .await?;

        info!(
            provider = %self.provider.name(),
            payment_id = %charge.payment_id,
            token = %crate::logging::mask_token(&handle.token),
            "awaiting 3-D authentication"
        );
        Ok(result)
    }

    /// Finishes a 3-D payment from the fields the bank posted back.
    /// `context` comes from the callback store.
    pub async fn complete(
        &self,
        context: TransactionContext,
        posted: ParameterSet,
    ) -> PaymentResult<NormalizedResult> {
        let mut attempt =
            PaymentAttempt::resume(&context.payment_id, AttemptState::AwaitingAuthentication);
        self.record(
            AuditKind::Callback,
            &context.payment_id,
            &context.log_id,
            JsonValue::Object(
                posted
                    .iter()
                    .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
                    .collect(),
            ),
        )
        .await?;

        let (code, message, retryable) = match self.provider.verify_callback(&context, &posted)? {
            CallbackVerdict::Authenticated { fields } => {
                return self.capture(context, fields, attempt).await;
            }
            CallbackVerdict::Rejected { code, message } => (code, message, false),
            // Nothing was decided; a genuine callback for the token can still complete it.
            CallbackVerdict::Untrusted { code, message } => (code, message, true),
        };
        attempt.fail();
        warn!(
            provider = %self.provider.name(),
            payment_id = %context.payment_id,
            code = %code,
            untrusted = retryable,
            "3-D authentication rejected"
        );
        let mut result = NormalizedResult::declined(&context.payment_id, code, message)
            .with_money(&context.money());
        result.retryable = retryable;
        result.callback_url = Some(context.original_callback_url.clone());
        self.record_result(Operation::Capture, &result, &context.log_id)
            .await?;
        Ok(result)
    }

    async fn capture(
        &self,
        context: TransactionContext,
        authenticated: ParameterSet,
        mut attempt: PaymentAttempt,
    ) -> PaymentResult<NormalizedResult> {
        let log_id = context.log_id.as_str();
        attempt.advance(AttemptState::AuthenticationReceived)?;

        let stash = self.stashed_references(&context.payment_id).await?;
        let mut result = match self
            .provider
            .capture(&context, &stash, &authenticated, &self.ctx)
            .await
        {
            Ok(result) => {
                attempt.advance(AttemptState::Provisioned)?;
                attempt.settle(result.status)?;
                result
            }
            Err(err) => {
                attempt.fail();
                // No answer the gateway stands behind: the capture may be attempted again.
                let undecided = matches!(
                    err,
                    PaymentError::TransportError { .. } | PaymentError::ProviderError { .. }
                );
                let mut result = NormalizedResult::from_error(&context.payment_id, err)?
                    .with_money(&context.money());
                result.retryable |= undecided;
                result
            }
        };
        result.callback_url = Some(context.original_callback_url.clone());
        self.stash_references(&result, log_id).await?;
        self.record_result(Operation::Capture, &result, log_id)
            .await?;

        info!(
            provider = %self.provider.name(),
            payment_id = %result.payment_id,
            status = result.status.as_str(),
            attempt_state = ?attempt.state(),
            "3-D payment completed"
        );
        Ok(result)
    }

    pub async fn cancel(&self, payment_id: &str) -> PaymentResult<NormalizedResult> {
        let (reference, environment) = self.follow_up_target(payment_id).await?;
        self.record_follow_up(Operation::Cancel, payment_id, &reference, None)
            .await?;
        let outcome = self
            .provider
            .cancel(payment_id, &reference, environment, &self.ctx)
            .await;
        self.finish_follow_up(Operation::Cancel, payment_id, outcome)
            .await
    }

    pub async fn refund(&self, payment_id: &str, amount: Money) -> PaymentResult<NormalizedResult> {
        amount.validate_positive("amount")?;
        let (reference, environment) = self.follow_up_target(payment_id).await?;
        self.record_follow_up(Operation::Refund, payment_id, &reference, Some(&amount))
            .await?;
        let outcome = self
            .provider
            .refund(payment_id, &reference, &amount, environment, &self.ctx)
            .await;
        self.finish_follow_up(Operation::Refund, payment_id, outcome)
            .await
    }

    pub async fn status(&self, payment_id: &str) -> PaymentResult<NormalizedResult> {
        let (reference, environment) = self.follow_up_target(payment_id).await?;
        self.record_follow_up(Operation::Status, payment_id, &reference, None)
            .await?;
        let outcome = self
            .provider
            .status(payment_id, &reference, environment, &self.ctx)
            .await;
        self.finish_follow_up(Operation::Status, payment_id, outcome)
            .await
    }

    /// The reference number is only ever read back from the audit log.
    async fn follow_up_target(&self, payment_id: &str) -> PaymentResult<(String, Environment)> {
        let provider = self.provider.name();
        let reference = self
            .audit
            .field_from_log(provider, payment_id, fields::REFERENCE_NUMBER)
            .await?
            .ok_or_else(|| {
                PaymentError::state(
                    StateErrorKind::MissingReference,
                    format!(
                        "no {} reference number recorded for payment {}",
                        provider, payment_id
                    ),
                )
            })?;
        let environment = match self
            .audit
            .field_from_log(provider, payment_id, fields::ENVIRONMENT)
            .await?
        {
            Some(value) => Environment::from_str(&value)?,
            None => Environment::default(),
        };
        Ok((reference, environment))
    }

    async fn finish_follow_up(
        &self,
        operation: Operation,
        payment_id: &str,
        outcome: PaymentResult<NormalizedResult>,
    ) -> PaymentResult<NormalizedResult> {
        let result = match outcome {
            Ok(result) => result,
            Err(err) => NormalizedResult::from_error(payment_id, err)?,
        };
        self.record_result(operation, &result, &self.ctx.log_id)
            .await?;
        info!(
            provider = %self.provider.name(),
            payment_id = %payment_id,
            operation = operation.as_str(),
            status = result.status.as_str(),
            "follow-up call finished"
        );
        Ok(result)
    }

    async fn record_follow_up(
        &self,
        operation: Operation,
        payment_id: &str,
        reference: &str,
        amount: Option<&Money>,
    ) -> PaymentResult<()> {
        let mut payload = json!({
            "operation": operation.as_str(),
            "reference": reference,
        });
        if let Some(amount) = amount {
            payload["amount"] = json!(amount.decimal_string());
            payload["currency"] = json!(amount.currency);
        }
        self.record(AuditKind::Request, payment_id, &self.ctx.log_id, payload)
            .await
    }

    async fn stashed_references(&self, payment_id: &str) -> PaymentResult<StashedReferences> {
        let provider = self.provider.name();
        Ok(StashedReferences {
            card_token: self
                .audit
                .field_from_log(provider, payment_id, fields::CARD_TOKEN)
                .await?,
            reference_number: self
                .audit
                .field_from_log(provider, payment_id, fields::REFERENCE_NUMBER)
                .await?,
            session_id: self
                .audit
                .field_from_log(provider, payment_id, fields::SESSION_ID)
                .await?,
        })
    }

    async fn failed(
        &self,
        attempt: &mut PaymentAttempt,
        charge: &ChargeRequest,
        err: PaymentError,
    ) -> PaymentResult<NormalizedResult> {
        attempt.fail();
        warn!(
            provider = %self.provider.name(),
            payment_id = %charge.payment_id,
            error = %err,
            "payment attempt failed"
        );
        let result = NormalizedResult::from_error(&charge.payment_id, err)?.with_money(&charge.amount);
        self.record_result(Operation::Charge, &result, &self.ctx.log_id)
            .await?;
        Ok(result)
    }

    async fn stash_references(&self, result: &NormalizedResult, log_id: &str) -> PaymentResult<()> {
        let mut stash = Map::new();
        if let Some(reference) = &result.reference_number {
            stash.insert(fields::REFERENCE_NUMBER.into(), json!(reference));
        }
        if let Some(transaction_id) = &result.transaction_id {
            stash.insert(fields::TRANSACTION_ID.into(), json!(transaction_id));
        }
        if stash.is_empty() {
            return Ok(());
        }
        self.stash(&result.payment_id, log_id, stash).await
    }

    async fn stash(
        &self,
        payment_id: &str,
        log_id: &str,
        values: Map<String, JsonValue>,
    ) -> PaymentResult<()> {
        debug!(
            provider = %self.provider.name(),
            payment_id = %payment_id,
            keys = ?values.keys().collect::<Vec<_>>(),
            "stashing references"
        );
        self.record(AuditKind::Stash, payment_id, log_id, JsonValue::Object(values))
            .await
    }

    async fn record_result(
        &self,
        operation: Operation,
        result: &NormalizedResult,
        log_id: &str,
    ) -> PaymentResult<()> {
        let mut payload = serde_json::to_value(result).unwrap_or(JsonValue::Null);
        if let JsonValue::Object(map) = &mut payload {
            map.insert("operation".into(), json!(operation.as_str()));
            // The page can be large and is rebuilt on demand.
            map.remove("authentication");
            map.insert("raw".into(), result.raw.clone());
        }
        self.record(AuditKind::Response, &result.payment_id, log_id, payload)
            .await
    }

    async fn record(
        &self,
        kind: AuditKind,
        payment_id: &str,
        log_id: &str,
        payload: JsonValue,
    ) -> PaymentResult<()> {
        self.audit
            .record(self.provider.name(), kind, payment_id, payload, log_id)
            .await
    }
}
