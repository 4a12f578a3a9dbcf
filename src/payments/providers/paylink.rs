//! Paylink: JSON API signed through request headers. The 3-D return carries
//! no signature, so the synchronous completion call is the trust anchor.

use super::{decline, posted, required_env, GatewayEndpoints};
use crate::payments::error::PaymentResult;
use crate::payments::normalizer::{normalize, Operation, ResponseCodes, VendorSignals};
use crate::payments::provider::{PaymentProvider, StashedReferences};
use crate::payments::signing::{self, policies, SigningKeys};
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
use tracing::{info, warn};

const PROVIDER: ProviderName = ProviderName::Paylink;

/// Paylink only sends `errorCode` when something went wrong.
pub const CODES: ResponseCodes = ResponseCodes {
    approved: &[],
    pending: &[],
};

const AUTHENTICATED: &str = "AUTHENTICATED";

#[derive(Debug, Clone)]
pub struct PaylinkConfig {
    pub api_key: String,
    pub api_secret: String,
    pub endpoints: GatewayEndpoints,
}

impl PaylinkConfig {
    pub fn from_env() -> PaymentResult<Self> {
        Ok(Self {
            api_key: required_env("PAYLINK_API_KEY")?,
            api_secret: required_env("PAYLINK_API_SECRET")?,
            endpoints: GatewayEndpoints::from_env(
                "PAYLINK",
                "https://sandbox-api.paylink.dev",
                "https://api.paylink.dev",
            ),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaylinkResponse {
    success: Option<bool>,
    status: Option<String>,
    error_code: Option<String>,
    error_message: Option<String>,
    transaction_id: Option<String>,
    reference_number: Option<String>,
    redirect_url: Option<String>,
    card_token: Option<String>,
    session_id: Option<String>,
}

impl PaylinkResponse {
    fn redirect(&self) -> Option<&str> {
        self.redirect_url.as_deref().filter(|u| !u.trim().is_empty())
    }
}

pub struct PaylinkProvider {
    config: PaylinkConfig,
    transport: Arc<dyn GatewayTransport>,
}

impl PaylinkProvider {
    pub fn new(config: PaylinkConfig, transport: Arc<dyn GatewayTransport>) -> Self {
        Self { config, transport }
    }

    pub fn from_env(transport: Arc<dyn GatewayTransport>) -> PaymentResult<Self> {
        Ok(Self::new(PaylinkConfig::from_env()?, transport))
    }

    /// The JSON body carries the exact strings the signature was computed over.
    fn signed_request(
        &self,
        environment: Environment,
        path: &str,
        mut body: ParameterSet,
    ) -> PaymentResult<GatewayRequest> {
        let timestamp = Utc::now().timestamp().to_string();
        body.insert("apiKey".to_string(), self.config.api_key.clone());
        body.insert("timestamp".to_string(), timestamp.clone());
        let signature = signing::sign(
            &policies::PAYLINK,
            &body,
            &SigningKeys::new(self.config.api_secret.clone()),
        )?;

        let json = JsonValue::Object(
            body.into_iter()
                .map(|(k, v)| (k, JsonValue::String(v)))
                .collect(),
        );
        Ok(GatewayRequest::post(
            self.config.endpoints.url(environment, path),
            RequestBody::Json(json),
        )
        .header("x-api-key", self.config.api_key.clone())
        .header("x-timestamp", timestamp)
        .header("x-signature", signature))
    }

    async fn send(&self, request: GatewayRequest) -> PaymentResult<(PaylinkResponse, JsonValue)> {
        let response = self.transport.send(request).await?;
        let parsed: PaylinkResponse = response.json(PROVIDER.as_str())?;
        Ok((parsed, response.raw_json()))
    }

    fn result(
        payment_id: &str,
        operation: Operation,
        response: &PaylinkResponse,
        raw: JsonValue,
    ) -> NormalizedResult {
        let signals = VendorSignals::new(operation)
            .success_flag(response.success)
            .response_code(response.error_code.as_deref())
            .status_text(response.status.as_deref())
            .redirect(response.redirect().is_some());
        let mut result = normalize(payment_id, &signals, &CODES);
        result.transaction_id = response.transaction_id.clone();
        result.reference_number = response.reference_number.clone();
        result.message = response.error_message.clone();
        if let Some(url) = response.redirect() {
            result.authentication = Some(AuthenticationArtifact::Redirect {
                url: url.to_string(),
            });
        }
        result.with_raw(raw)
    }

    fn payment_body(payment_id: &str, amount: &Money) -> ParameterSet {
        let mut body = ParameterSet::new();
        body.insert("merchantOrderId".to_string(), payment_id.to_string());
        body.insert("amount".to_string(), amount.decimal_string());
        body.insert("currency".to_string(), amount.currency.as_str().to_string());
        body
    }
}

#[async_trait]
impl PaymentProvider for PaylinkProvider {
    fn name(&self) -> ProviderName {
        PROVIDER
    }

    fn supported_currencies(&self) -> &'static [Currency] {
        &[Currency::Try, Currency::Usd, Currency::Eur]
    }

    async fn tokenize(
        &self,
        card: CardDetails,
        charge: &ChargeRequest,
        _ctx: &CallContext,
    ) -> PaymentResult<CardToken> {
        let mut body = ParameterSet::new();
        body.insert("cardHolderName".to_string(), card.holder_name.clone());
        body.insert("cardNumber".to_string(), card.number.clone());
        body.insert("expiryMonth".to_string(), card.month_2());
        body.insert("expiryYear".to_string(), card.expiry_year.to_string());
        body.insert("cvv".to_string(), card.cvv.clone());
        drop(card);

        let request = self.signed_request(charge.environment, "/v1/cards/tokenize", body)?;
        let (response, _) = self.send(request).await?;
        match response.card_token.as_deref() {
            Some(token) if response.success == Some(true) && !token.is_empty() => {
                Ok(CardToken(token.to_string()))
            }
            _ => Err(decline(
                PROVIDER,
                response.error_code.as_deref(),
                response.error_message.as_deref(),
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
        let mut body = Self::payment_body(&charge.payment_id, &charge.amount);
        body.insert("cardToken".to_string(), card.as_str().to_string());
        body.insert(
            "installment".to_string(),
            charge.installment_count.to_string(),
        );

        let request = self.signed_request(charge.environment, "/v1/payments", body)?;
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
        let mut body = Self::payment_body(&charge.payment_id, &charge.amount);
        body.insert("cardToken".to_string(), card.as_str().to_string());
        body.insert(
            "installment".to_string(),
            charge.installment_count.to_string(),
        );
        body.insert("callbackUrl".to_string(), callback_url.to_string());

        let request = self.signed_request(charge.environment, "/v1/3ds/sessions", body)?;
        let (response, _) = self.send(request).await?;
        match (response.session_id.as_deref(), response.redirect()) {
            (Some(session_id), Some(url))
                if response.success != Some(false) && response.error_code.is_none() =>
            {
                Ok(ThreeDSession {
                    session_id: session_id.to_string(),
                    reference_number: response.reference_number.clone(),
                    redirect_url: Some(url.to_string()),
                    gateway_html: None,
                })
            }
            _ => Err(decline(
                PROVIDER,
                response.error_code.as_deref(),
                response.error_message.as_deref(),
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
        let url = session
            .redirect_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| decline(PROVIDER, None, Some("session has no redirect URL"), "session_failed"))?;
        Ok(AuthenticationArtifact::Redirect { url })
    }

    fn verify_callback(
        &self,
        context: &TransactionContext,
        fields: &ParameterSet,
    ) -> PaymentResult<CallbackVerdict> {
        if posted(fields, "sessionId") != Some(context.session_id.as_str()) {
            warn!(provider = %PROVIDER, payment_id = %context.payment_id, "callback session mismatch");
            return Ok(CallbackVerdict::Untrusted {
                code: "session_mismatch".to_string(),
                message: "callback belongs to a different session".to_string(),
            });
        }

        let status = posted(fields, "status").unwrap_or("").trim();
        if !status.eq_ignore_ascii_case(AUTHENTICATED) {
            return Ok(CallbackVerdict::Rejected {
                code: posted(fields, "errorCode")
                    .filter(|c| !c.trim().is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        if status.is_empty() {
                            "authentication_failed".to_string()
                        } else {
                            status.to_lowercase()
                        }
                    }),
                message: posted(fields, "errorMessage")
                    .unwrap_or("3-D authentication failed")
                    .to_string(),
            });
        }

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
        let session_id = stash
            .session_id()
            .unwrap_or(context.session_id.as_str())
            .to_string();
        let mut body = Self::payment_body(&context.payment_id, &money);
        body.insert("sessionId".to_string(), session_id);
        body.insert("cardToken".to_string(), stash.card_token()?.to_string());

        info!(
            provider = %PROVIDER,
            payment_id = %context.payment_id,
            trust_anchor = "capture",
            "completing unsigned 3-D return through synchronous capture"
        );
        let request = self.signed_request(context.environment, "/v1/3ds/complete", body)?;
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
        let mut body = ParameterSet::new();
        body.insert("merchantOrderId".to_string(), payment_id.to_string());
        let request = self
            .signed_request(
                environment,
                &format!("/v1/payments/{}/cancel", reference),
                body,
            )?
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
        let request = self
            .signed_request(
                environment,
                &format!("/v1/payments/{}/refund", reference),
                Self::payment_body(payment_id, amount),
            )?
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
        let mut body = ParameterSet::new();
        body.insert("merchantOrderId".to_string(), payment_id.to_string());
        let request = self
            .signed_request(
                environment,
                &format!("/v1/payments/{}/inquiry", reference),
                body,
            )?
            .idempotent();
        let (response, raw) = self.send(request).await?;
        Ok(Self::result(payment_id, Operation::Status, &response, raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::test_support::{card, charge, context, ScriptedTransport};
    use crate::payments::types::PaymentStatus;
    use serde_json::json;

    fn provider(transport: Arc<ScriptedTransport>) -> PaylinkProvider {
        PaylinkProvider::new(
            PaylinkConfig {
                api_key: "pk_test_1".to_string(),
                api_secret: "sk_test_secret".to_string(),
                endpoints: GatewayEndpoints::new("https://sandbox.paylink.test", "https://paylink.test"),
            },
            transport,
        )
    }

    fn header<'a>(request: &'a GatewayRequest, name: &str) -> Option<&'a str> {
        request
            .headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[tokio::test]
    async fn charge_body_and_signature_header_agree() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply(200, json!({"success": true, "status": "APPROVED", "transactionId": "TX-1", "referenceNumber": "R-1"}));
        let result = provider(transport.clone())
            .charge(
                &charge("PAY-42", "100.50"),
                &CardToken("tok_abc123".to_string()),
                &CallContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(result.status, PaymentStatus::Successful);
        assert_eq!(result.reference_number.as_deref(), Some("R-1"));

        let sent = &transport.sent()[0];
        assert_eq!(sent.url, "https://sandbox.paylink.test/v1/payments");
        let body: ParameterSet = sent.fields().into_iter().collect();
        assert_eq!(body["amount"], "100.50");
        assert_eq!(body["installment"], "1");
        assert_eq!(header(sent, "x-timestamp"), Some(body["timestamp"].as_str()));
        let signature = header(sent, "x-signature").unwrap();
        assert!(signing::verify(
            &policies::PAYLINK,
            &body,
            &SigningKeys::new("sk_test_secret"),
            signature
        )
        .unwrap());
    }

    #[tokio::test]
    async fn redirect_with_success_flag_is_pending() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply(200, json!({"success": true, "redirectUrl": "https://acs.bank.test/challenge"}));
        let result = provider(transport)
            .charge(&charge("PAY-43", "5.00"), &CardToken("tok".to_string()), &CallContext::default())
            .await
            .unwrap();
        assert_eq!(result.status, PaymentStatus::Pending);
        assert!(!result.success);
        assert_eq!(
            result.authentication,
            Some(AuthenticationArtifact::Redirect {
                url: "https://acs.bank.test/challenge".to_string()
            })
        );
    }

    #[tokio::test]
    async fn tokenize_decline_carries_error_code() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply(422, json!({"success": false, "errorCode": "CARD_EXPIRED", "errorMessage": "expired"}));
        let err = provider(transport)
            .tokenize(card(), &charge("PAY-44", "5.00"), &CallContext::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::payments::error::PaymentError::VendorDeclineError { ref code, .. } if code == "CARD_EXPIRED"
        ));
    }

    #[test]
    fn callback_must_name_the_stored_session() {
        let paylink = provider(Arc::new(ScriptedTransport::new()));
        let ctx = context(ProviderName::Paylink, "PAY-45", "sess-45");
        let fields = |session: &str, status: &str| -> ParameterSet {
            [("sessionId", session), ("status", status)]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };

        assert!(matches!(
            paylink.verify_callback(&ctx, &fields("sess-45", "AUTHENTICATED")).unwrap(),
            CallbackVerdict::Authenticated { .. }
        ));
        assert!(matches!(
            paylink.verify_callback(&ctx, &fields("sess-other", "AUTHENTICATED")).unwrap(),
            CallbackVerdict::Untrusted { ref code, .. } if code == "session_mismatch"
        ));
        assert!(matches!(
            paylink.verify_callback(&ctx, &fields("sess-45", "FAILED")).unwrap(),
            CallbackVerdict::Rejected { ref code, .. } if code == "failed"
        ));
    }

    #[tokio::test]
    async fn refund_uses_reference_in_path() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply(200, json!({"success": true}));
        let amount = charge("PAY-46", "20.00").amount;
        let result = provider(transport.clone())
            .refund("PAY-46", "R-46", &amount, Environment::Sandbox, &CallContext::default())
            .await
            .unwrap();
        assert_eq!(result.status, PaymentStatus::Refunded);
        let sent = &transport.sent()[0];
        assert_eq!(sent.url, "https://sandbox.paylink.test/v1/payments/R-46/refund");
        assert!(sent.idempotent);
    }
}
