//! Turkpay: multipart API authenticated by a two-stage credential hash.
//! Amounts travel in minor units.

use super::{decline, posted, required_env, GatewayEndpoints};
use crate::payments::error::PaymentResult;
use crate::payments::normalizer::{normalize, Operation, ResponseCodes, VendorSignals};
use crate::payments::provider::{PaymentProvider, StashedReferences};
use crate::payments::signing::policies::{self, turkpay_fields};
use crate::payments::signing::{self, SigningKeys};
use crate::payments::types::{
    AuthenticationArtifact, CallContext, CallbackVerdict, CardDetails, CardToken, ChargeRequest,
    Currency, Environment, Money, NormalizedResult, ParameterSet, ProviderName, ThreeDSession,
    TransactionContext,
};
use crate::payments::utils::{GatewayRequest, GatewayTransport, RequestBody};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, warn};

const PROVIDER: ProviderName = ProviderName::Turkpay;

pub const CODES: ResponseCodes = ResponseCodes {
    approved: &["0000"],
    pending: &["1001"],
};

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Clone)]
pub struct TurkpayConfig {
    pub username: String,
    pub password: String,
    pub secret_code: String,
    pub endpoints: GatewayEndpoints,
}

impl TurkpayConfig {
    pub fn from_env() -> PaymentResult<Self> {
        Ok(Self {
            username: required_env("TURKPAY_USERNAME")?,
            password: required_env("TURKPAY_PASSWORD")?,
            secret_code: required_env("TURKPAY_SECRET_CODE")?,
            endpoints: GatewayEndpoints::from_env(
                "TURKPAY",
                "https://test.turkpay.io",
                "https://api.turkpay.io",
            ),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TurkpayResponse {
    result_code: Option<String>,
    result_message: Option<String>,
    transaction_id: Option<String>,
    reference_no: Option<String>,
    session_id: Option<String>,
    gateway_html: Option<String>,
    card_token: Option<String>,
    status: Option<String>,
}

impl TurkpayResponse {
    fn is_approved(&self) -> bool {
        self.result_code
            .as_deref()
            .is_some_and(|c| CODES.approved.contains(&c.trim()))
    }
}

pub struct TurkpayProvider {
    config: TurkpayConfig,
    transport: Arc<dyn GatewayTransport>,
}

impl TurkpayProvider {
    pub fn new(config: TurkpayConfig, transport: Arc<dyn GatewayTransport>) -> Self {
        Self { config, transport }
    }

    pub fn from_env(transport: Arc<dyn GatewayTransport>) -> PaymentResult<Self> {
        Ok(Self::new(TurkpayConfig::from_env()?, transport))
    }

    fn keys(&self) -> SigningKeys {
        SigningKeys::new(self.config.secret_code.clone())
            .with_material(turkpay_fields::USERNAME, self.config.username.clone())
            .with_material(turkpay_fields::PASSWORD, self.config.password.clone())
            .with_material(turkpay_fields::SECRET_CODE, self.config.secret_code.clone())
    }

    fn hash(&self, transaction_id: &str, timestamp: &str) -> PaymentResult<String> {
        let mut params = ParameterSet::new();
        params.insert(
            turkpay_fields::TRANSACTION_ID.to_string(),
            transaction_id.to_string(),
        );
        params.insert(turkpay_fields::TIMESTAMP.to_string(), timestamp.to_string());
        signing::sign(&policies::TURKPAY, &params, &self.keys())
    }

    /// Every call carries `username`, `transactionid`, `timestamp` and `hash`.
    fn signed_request(
        &self,
        environment: Environment,
        path: &str,
        transaction_id: &str,
        extra: ParameterSet,
    ) -> PaymentResult<GatewayRequest> {
        let timestamp = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        let hash = self.hash(transaction_id, &timestamp)?;

        let mut fields = vec![
            ("username".to_string(), self.config.username.clone()),
            ("transactionid".to_string(), transaction_id.to_string()),
            ("timestamp".to_string(), timestamp),
            ("hash".to_string(), hash),
        ];
        fields.extend(extra);
        Ok(GatewayRequest::post(
            self.config.endpoints.url(environment, path),
            RequestBody::Multipart(fields),
        ))
    }

    async fn send(&self, request: GatewayRequest) -> PaymentResult<(TurkpayResponse, JsonValue)> {
        let response = self.transport.send(request).await?;
        let parsed: TurkpayResponse = response.json(PROVIDER.as_str())?;
        Ok((parsed, response.raw_json()))
    }

    fn result(
        payment_id: &str,
        operation: Operation,
        response: &TurkpayResponse,
        raw: JsonValue,
    ) -> NormalizedResult {
        let signals = VendorSignals::new(operation)
            .response_code(response.result_code.as_deref())
            .status_text(response.status.as_deref());
        let mut result = normalize(payment_id, &signals, &CODES);
        result.transaction_id = response.transaction_id.clone();
        result.reference_number = response.reference_no.clone();
        result.message = response.result_message.clone();
        result.with_raw(raw)
    }

    fn amount_fields(amount: &Money) -> ParameterSet {
        let mut fields = ParameterSet::new();
        fields.insert("amount".to_string(), amount.minor_units_string());
        fields.insert(
            "currency".to_string(),
            amount.currency.numeric_code().to_string(),
        );
        fields
    }
}

#[async_trait]
impl PaymentProvider for TurkpayProvider {
    fn name(&self) -> ProviderName {
        PROVIDER
    }

    fn supported_currencies(&self) -> &'static [Currency] {
        &[Currency::Try]
    }

    async fn tokenize(
        &self,
        card: CardDetails,
        charge: &ChargeRequest,
        _ctx: &CallContext,
    ) -> PaymentResult<CardToken> {
        let mut extra = ParameterSet::new();
        extra.insert("cardholder".to_string(), card.holder_name.clone());
        extra.insert("cardnumber".to_string(), card.number.clone());
        extra.insert("expirymonth".to_string(), card.month_2());
        extra.insert("expiryyear".to_string(), card.year_2());
        extra.insert("cvv".to_string(), card.cvv.clone());
        drop(card);

        let request = self.signed_request(
            charge.environment,
            "/api/tokenize",
            &charge.payment_id,
            extra,
        )?;
        let (response, _) = self.send(request).await?;
        match response.card_token.as_deref() {
            Some(token) if response.is_approved() && !token.is_empty() => {
                Ok(CardToken(token.to_string()))
            }
            _ => Err(decline(
                PROVIDER,
                response.result_code.as_deref(),
                response.result_message.as_deref(),
                "tokenize_failed",
            )),
        }
    }

    async fn charge(
        &self,
        charge: &ChargeRequest,
        card: &CardToken,
        _ctx: &CallContext,
    ) -> PaymentResult<NormalizedResult> {
        let mut extra = Self::amount_fields(&charge.amount);
        extra.insert("cardtoken".to_string(), card.as_str().to_string());
        extra.insert(
            "installment".to_string(),
            charge.installment_count.to_string(),
        );

        let request = self.signed_request(
            charge.environment,
            "/api/sale",
            &charge.payment_id,
            extra,
        )?;
        let (response, raw) = self.send(request).await?;
        Ok(Self::result(&charge.payment_id, Operation::Charge, &response, raw)
            .with_money(&charge.amount))
    }

    async fn open_session(
        &self,
        charge: &ChargeRequest,
        card: &CardToken,
        callback_url: &str,
        _ctx: &CallContext,
    ) -> PaymentResult<ThreeDSession> {
        let mut extra = Self::amount_fields(&charge.amount);
        extra.insert("cardtoken".to_string(), card.as_str().to_string());
        extra.insert(
            "installment".to_string(),
            charge.installment_count.to_string(),
        );
        extra.insert("callbackurl".to_string(), callback_url.to_string());

        let request = self.signed_request(
            charge.environment,
            "/api/3d/init",
            &charge.payment_id,
            extra,
        )?;
        let (response, _) = self.send(request).await?;
        let html = response
            .gateway_html
            .as_deref()
            .filter(|h| !h.trim().is_empty());
        match (response.session_id.as_deref(), html) {
            (Some(session_id), Some(html)) if response.is_approved() => Ok(ThreeDSession {
                session_id: session_id.to_string(),
                reference_number: response.reference_no.clone(),
                redirect_url: None,
                gateway_html: Some(html.to_string()),
            }),
            _ => Err(decline(
                PROVIDER,
                response.result_code.as_deref(),
                response.result_message.as_deref(),
                "session_failed",
            )),
        }
    }

    fn authentication_artifact(
        &self,
        _charge: &ChargeRequest,
        session: &ThreeDSession,
        _callback_url: &str,
    ) -> PaymentResult<AuthenticationArtifact> {
        let html = session
            .gateway_html
            .clone()
            .ok_or_else(|| decline(PROVIDER, None, Some("session has no gateway page"), "session_failed"))?;
        Ok(AuthenticationArtifact::GatewayHtml { html })
    }

    fn verify_callback(
        &self,
        context: &TransactionContext,
        fields: &ParameterSet,
    ) -> PaymentResult<CallbackVerdict> {
        let transaction_id = posted(fields, "TransactionId").unwrap_or("");
        let timestamp = posted(fields, "Timestamp").unwrap_or("");
        let presented = posted(fields, "Hash").unwrap_or("");

        let expected = self.hash(transaction_id, timestamp)?;
        if presented.is_empty()
            || !crate::payments::utils::secure_eq(expected.as_bytes(), presented.trim().as_bytes())
        {
            warn!(provider = %PROVIDER, payment_id = %context.payment_id, "callback hash mismatch");
            return Ok(CallbackVerdict::Untrusted {
                code: "invalid_signature".to_string(),
                message: "callback signature does not match".to_string(),
            });
        }

        if transaction_id != context.payment_id
            || posted(fields, "SessionId") != Some(context.session_id.as_str())
        {
            return Ok(CallbackVerdict::Untrusted {
                code: "session_mismatch".to_string(),
                message: "callback belongs to a different transaction".to_string(),
            });
        }

        let result_code = posted(fields, "ResultCode").unwrap_or("").trim();
        if !CODES.approved.contains(&result_code) {
            return Ok(CallbackVerdict::Rejected {
                code: if result_code.is_empty() {
                    "authentication_failed".to_string()
                } else {
                    result_code.to_string()
                },
                message: posted(fields, "ResultMessage")
                    .unwrap_or("3-D authentication failed")
                    .to_string(),
            });
        }

        debug!(provider = %PROVIDER, payment_id = %context.payment_id, "callback hash verified");
        Ok(CallbackVerdict::Authenticated {
            fields: fields.clone(),
        })
    }

    async fn capture(
        &self,
        context: &TransactionContext,
        stash: &StashedReferences,
        _fields: &ParameterSet,
        _ctx: &CallContext,
    ) -> PaymentResult<NormalizedResult> {
        let money = context.money();
        let mut extra = Self::amount_fields(&money);
        extra.insert("cardtoken".to_string(), stash.card_token()?.to_string());
        extra.insert(
            "sessionid".to_string(),
            stash
                .session_id()
                .unwrap_or(context.session_id.as_str())
                .to_string(),
        );
        if let Ok(reference) = stash.reference_number() {
            extra.insert("referenceno".to_string(), reference.to_string());
        }

        let request = self.signed_request(
            context.environment,
            "/api/3d/complete",
            &context.payment_id,
            extra,
        )?;
        let (response, raw) = self.send(request).await?;
        Ok(Self::result(&context.payment_id, Operation::Capture, &response, raw).with_money(&money))
    }

    async fn cancel(
        &self,
        payment_id: &str,
        reference: &str,
        environment: Environment,
        _ctx: &CallContext,
    ) -> PaymentResult<NormalizedResult> {
        let mut extra = ParameterSet::new();
        extra.insert("referenceno".to_string(), reference.to_string());
        let request = self
            .signed_request(environment, "/api/cancel", payment_id, extra)?
            .idempotent();
        let (response, raw) = self.send(request).await?;
        Ok(Self::result(payment_id, Operation::Cancel, &response, raw))
    }

    async fn refund(
        &self,
        payment_id: &str,
        reference: &str,
        amount: &Money,
        environment: Environment,
        _ctx: &CallContext,
    ) -> PaymentResult<NormalizedResult> {
        let mut extra = Self::amount_fields(amount);
        extra.insert("referenceno".to_string(), reference.to_string());
        let request = self
            .signed_request(environment, "/api/refund", payment_id, extra)?
            .idempotent();
        let (response, raw) = self.send(request).await?;
        Ok(Self::result(payment_id, Operation::Refund, &response, raw).with_money(amount))
    }

    async fn status(
        &self,
        payment_id: &str,
        reference: &str,
        environment: Environment,
        _ctx: &CallContext,
    ) -> PaymentResult<NormalizedResult> {
        let mut extra = ParameterSet::new();
        extra.insert("referenceno".to_string(), reference.to_string());
        let request = self
            .signed_request(environment, "/api/inquiry", payment_id, extra)?
            .idempotent();
        let (response, raw) = self.send(request).await?;
        Ok(Self::result(payment_id, Operation::Status, &response, raw))
    }
}
