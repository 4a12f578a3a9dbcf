//! Estpos: form-posting bank gateway with store-key hashing and a
//! browser-side 3-D form.

use super::{decline, posted, required_env, GatewayEndpoints};
use crate::payments::error::PaymentResult;
use crate::payments::normalizer::{normalize, Operation, ResponseCodes, VendorSignals};
use crate::payments::provider::{PaymentProvider, StashedReferences};
use crate::payments::redirect::auto_submit_form;
use crate::payments::signing::{self, policies, SigningKeys};
use crate::payments::types::{
    AuthenticationArtifact, CallContext, CallbackVerdict, CardDetails, CardToken, ChargeRequest,
    Currency, Environment, Money, NormalizedResult, ParameterSet, ProviderName, ThreeDSession,
    TransactionContext,
};
use crate::payments::utils::{GatewayRequest, GatewayTransport, RequestBody};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{info, warn};

const PROVIDER: ProviderName = ProviderName::Estpos;

pub const CODES: ResponseCodes = ResponseCodes {
    approved: &["00"],
    pending: &[],
};

/// `mdStatus` values the ACS uses for a completed authentication.
const AUTHENTICATED_MD_STATUS: &[&str] = &["1", "2", "3", "4"];

const TOKENS_PATH: &str = "/fim/api/tokens";
const API_PATH: &str = "/fim/api";
const SESSION_PATH: &str = "/fim/est3Dgate/session";
const FORM_ACTION_PATH: &str = "/fim/est3Dgate";

#[derive(Debug, Clone)]
pub struct EstposConfig {
    pub client_id: String,
    pub api_user: String,
    pub api_password: String,
    pub store_key: String,
    pub lang: String,
    pub endpoints: GatewayEndpoints,
}

impl EstposConfig {
    pub fn from_env() -> PaymentResult<Self> {
        Ok(Self {
            client_id: required_env("ESTPOS_CLIENT_ID")?,
            api_user: required_env("ESTPOS_API_USER")?,
            api_password: required_env("ESTPOS_API_PASSWORD")?,
            store_key: required_env("ESTPOS_STORE_KEY")?,
            lang: std::env::var("ESTPOS_LANG").unwrap_or_else(|_| "tr".to_string()),
            endpoints: GatewayEndpoints::from_env(
                "ESTPOS",
                "https://sandbox.estpos.net",
                "https://vpos.estpos.net",
            ),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EstposResponse {
    response: Option<String>,
    proc_return_code: Option<String>,
    err_msg: Option<String>,
    trans_id: Option<String>,
    host_ref_num: Option<String>,
    trans_status: Option<String>,
    session_id: Option<String>,
    #[serde(alias = "cardToken")]
    token: Option<String>,
}

impl EstposResponse {
    fn is_approved(&self) -> bool {
        self.response
            .as_deref()
            .is_some_and(|r| r.eq_ignore_ascii_case("approved"))
    }
}

fn instalment(count: u8) -> String {
    if count <= 1 {
        String::new()
    } else {
        count.to_string()
    }
}

pub struct EstposProvider {
    config: EstposConfig,
    transport: Arc<dyn GatewayTransport>,
}

impl EstposProvider {
    pub fn new(config: EstposConfig, transport: Arc<dyn GatewayTransport>) -> Self {
        Self { config, transport }
    }

    pub fn from_env(transport: Arc<dyn GatewayTransport>) -> PaymentResult<Self> {
        Ok(Self::new(EstposConfig::from_env()?, transport))
    }

    fn keys(&self) -> SigningKeys {
        SigningKeys::new(self.config.store_key.clone())
    }

    /// Adds `hash` over exactly the strings that go on the wire.
    fn signed_fields(&self, mut fields: ParameterSet) -> PaymentResult<Vec<(String, String)>> {
        let hash = signing::sign(&policies::ESTPOS, &fields, &self.keys())?;
        fields.insert("hash".to_string(), hash);
        Ok(fields.into_iter().collect())
    }

    fn api_fields(&self, tran_type: &str, order_id: &str) -> ParameterSet {
        let mut fields = ParameterSet::new();
        fields.insert("Name".to_string(), self.config.api_user.clone());
        fields.insert("Password".to_string(), self.config.api_password.clone());
        fields.insert("ClientId".to_string(), self.config.client_id.clone());
        fields.insert("Type".to_string(), tran_type.to_string());
        fields.insert("OrderId".to_string(), order_id.to_string());
        fields
    }

    async fn post(
        &self,
        environment: Environment,
        path: &str,
        fields: ParameterSet,
        idempotent: bool,
    ) -> PaymentResult<(EstposResponse, JsonValue)> {
        let mut request = GatewayRequest::post(
            self.config.endpoints.url(environment, path),
            RequestBody::Form(self.signed_fields(fields)?),
        );
        if idempotent {
            request = request.idempotent();
        }
        let response = self.transport.send(request).await?;
        let parsed: EstposResponse = response.json(PROVIDER.as_str())?;
        Ok((parsed, response.raw_json()))
    }

    fn result(
        payment_id: &str,
        operation: Operation,
        response: &EstposResponse,
        raw: JsonValue,
    ) -> NormalizedResult {
        let signals = VendorSignals::new(operation)
            .response_code(response.proc_return_code.as_deref())
            .status_text(
                response
                    .trans_status
                    .as_deref()
                    .or(response.response.as_deref()),
            );
        let mut result = normalize(payment_id, &signals, &CODES);
        result.transaction_id = response.trans_id.clone();
        result.reference_number = response.host_ref_num.clone();
        result.message = response.err_msg.clone().filter(|m| !m.trim().is_empty());
        result.with_raw(raw)
    }
}

#[async_trait]
impl PaymentProvider for EstposProvider {
    fn name(&self) -> ProviderName {
        PROVIDER
    }

    fn supported_currencies(&self) -> &'static [Currency] {
        &[Currency::Try, Currency::Usd, Currency::Eur, Currency::Gbp]
    }

    async fn tokenize(
        &self,
        card: CardDetails,
        charge: &ChargeRequest,
        _ctx: &CallContext,
    ) -> PaymentResult<CardToken> {
        let mut fields = ParameterSet::new();
        fields.insert("clientid".to_string(), self.config.client_id.clone());
        fields.insert("pan".to_string(), card.number.clone());
        fields.insert("Ecom_Payment_Card_ExpDate_Month".to_string(), card.month_2());
        fields.insert("Ecom_Payment_Card_ExpDate_Year".to_string(), card.year_2());
        fields.insert("cv2".to_string(), card.cvv.clone());
        fields.insert("cardHolderName".to_string(), card.holder_name.clone());
        fields.insert("rnd".to_string(), uuid::Uuid::new_v4().simple().to_string());
        fields.insert("hashAlgorithm".to_string(), "ver3".to_string());
        drop(card);

        let (response, _) = self
            .post(charge.environment, TOKENS_PATH, fields, false)
            .await?;
        match response.token.as_deref() {
            Some(token) if response.is_approved() && !token.is_empty() => {
                Ok(CardToken(token.to_string()))
            }
            _ => Err(decline(
                PROVIDER,
                response.proc_return_code.as_deref(),
                response.err_msg.as_deref(),
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
        let mut fields = self.api_fields("Auth", &charge.payment_id);
        fields.insert("Total".to_string(), charge.amount.decimal_string());
        fields.insert(
            "Currency".to_string(),
            charge.amount.currency.numeric_code().to_string(),
        );
        fields.insert("Instalment".to_string(), instalment(charge.installment_count));
        fields.insert("cardToken".to_string(), card.as_str().to_string());

        let (response, raw) = self.post(charge.environment, API_PATH, fields, false).await?;
        info!(
            provider = %PROVIDER,
            payment_id = %charge.payment_id,
            proc_return_code = ?response.proc_return_code,
            "estpos auth answered"
        );
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
        let mut fields = ParameterSet::new();
        fields.insert("clientid".to_string(), self.config.client_id.clone());
        fields.insert("oid".to_string(), charge.payment_id.clone());
        fields.insert("amount".to_string(), charge.amount.decimal_string());
        fields.insert(
            "currency".to_string(),
            charge.amount.currency.numeric_code().to_string(),
        );
        fields.insert("cardToken".to_string(), card.as_str().to_string());
        fields.insert("okUrl".to_string(), callback_url.to_string());
        fields.insert("failUrl".to_string(), callback_url.to_string());
        fields.insert("rnd".to_string(), uuid::Uuid::new_v4().simple().to_string());
        fields.insert("storetype".to_string(), "3d".to_string());
        fields.insert("hashAlgorithm".to_string(), "ver3".to_string());

        let (response, _) = self
            .post(charge.environment, SESSION_PATH, fields, false)
            .await?;
        match response.session_id.as_deref() {
            Some(session_id) if response.is_approved() && !session_id.is_empty() => {
                Ok(ThreeDSession {
                    session_id: session_id.to_string(),
                    reference_number: response.host_ref_num.clone(),
                    redirect_url: None,
                    gateway_html: None,
                })
            }
            _ => Err(decline(
                PROVIDER,
                response.proc_return_code.as_deref(),
                response.err_msg.as_deref(),
                "session_failed",
            )),
        }
    }

    fn authentication_artifact(
        &self,
        charge: &ChargeRequest,
        session: &ThreeDSession,
        callback_url: &str,
    ) -> PaymentResult<AuthenticationArtifact> {
        let mut fields = ParameterSet::new();
        fields.insert("clientid".to_string(), self.config.client_id.clone());
        fields.insert("storetype".to_string(), "3d".to_string());
        fields.insert("sessionid".to_string(), session.session_id.clone());
        fields.insert("oid".to_string(), charge.payment_id.clone());
        fields.insert("amount".to_string(), charge.amount.decimal_string());
        fields.insert(
            "currency".to_string(),
            charge.amount.currency.numeric_code().to_string(),
        );
        fields.insert("okUrl".to_string(), callback_url.to_string());
        fields.insert("failUrl".to_string(), callback_url.to_string());
        fields.insert("rnd".to_string(), uuid::Uuid::new_v4().simple().to_string());
        fields.insert("hashAlgorithm".to_string(), "ver3".to_string());
        fields.insert("lang".to_string(), self.config.lang.clone());
        fields.insert("TranType".to_string(), "Auth".to_string());
        fields.insert("Instalment".to_string(), instalment(charge.installment_count));

        let action = self
            .config
            .endpoints
            .url(charge.environment, FORM_ACTION_PATH);
        Ok(auto_submit_form(&action, self.signed_fields(fields)?))
    }

    fn verify_callback(
        &self,
        context: &TransactionContext,
        fields: &ParameterSet,
    ) -> PaymentResult<CallbackVerdict> {
        let Some(presented) = posted(fields, "hash").filter(|h| !h.trim().is_empty()) else {
            warn!(provider = %PROVIDER, payment_id = %context.payment_id, "callback carried no hash");
            return Ok(CallbackVerdict::Untrusted {
                code: "invalid_signature".to_string(),
                message: "callback is not signed".to_string(),
            });
        };
        if !signing::verify(&policies::ESTPOS, fields, &self.keys(), presented)? {
            warn!(provider = %PROVIDER, payment_id = %context.payment_id, "callback hash mismatch");
            return Ok(CallbackVerdict::Untrusted {
                code: "invalid_signature".to_string(),
                message: "callback signature does not match".to_string(),
            });
        }

        if posted(fields, "oid") != Some(context.payment_id.as_str()) {
            return Ok(CallbackVerdict::Untrusted {
                code: "order_mismatch".to_string(),
                message: "callback belongs to a different order".to_string(),
            });
        }

        let md_status = posted(fields, "mdStatus").unwrap_or("").trim();
        if !AUTHENTICATED_MD_STATUS.contains(&md_status) {
            let message = posted(fields, "mdErrorMsg")
                .or_else(|| posted(fields, "ErrMsg"))
                .filter(|m| !m.trim().is_empty())
                .unwrap_or("3-D authentication failed");
            return Ok(CallbackVerdict::Rejected {
                code: if md_status.is_empty() {
                    "authentication_failed".to_string()
                } else {
                    md_status.to_string()
                },
                message: message.to_string(),
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
        fields: &ParameterSet,
        _ctx: &CallContext,
    ) -> PaymentResult<NormalizedResult> {
        let money = context.money();
        let mut request = self.api_fields("Auth", &context.payment_id);
        request.insert("Total".to_string(), money.decimal_string());
        request.insert(
            "Currency".to_string(),
            money.currency.numeric_code().to_string(),
        );
        request.insert("Instalment".to_string(), instalment(context.installment_count));
        request.insert("cardToken".to_string(), stash.card_token()?.to_string());
        for (posted_name, wire_name) in [
            ("xid", "PayerTxnId"),
            ("eci", "PayerSecurityLevel"),
            ("cavv", "PayerAuthenticationCode"),
            ("md", "md"),
        ] {
            if let Some(value) = posted(fields, posted_name) {
                request.insert(wire_name.to_string(), value.to_string());
            }
        }

        let (response, raw) = self
            .post(context.environment, API_PATH, request, false)
            .await?;
        Ok(Self::result(&context.payment_id, Operation::Capture, &response, raw).with_money(&money))
    }

    async fn cancel(
        &self,
        payment_id: &str,
        reference: &str,
        environment: Environment,
        _ctx: &CallContext,
    ) -> PaymentResult<NormalizedResult> {
        let mut fields = self.api_fields("Void", payment_id);
        fields.insert("HostRefNum".to_string(), reference.to_string());
        let (response, raw) = self.post(environment, API_PATH, fields, true).await?;
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
        let mut fields = self.api_fields("Credit", payment_id);
        fields.insert("HostRefNum".to_string(), reference.to_string());
        fields.insert("Total".to_string(), amount.decimal_string());
        fields.insert(
            "Currency".to_string(),
            amount.currency.numeric_code().to_string(),
        );
        let (response, raw) = self.post(environment, API_PATH, fields, true).await?;
        Ok(Self::result(payment_id, Operation::Refund, &response, raw).with_money(amount))
    }

    async fn status(
        &self,
        payment_id: &str,
        reference: &str,
        environment: Environment,
        _ctx: &CallContext,
    ) -> PaymentResult<NormalizedResult> {
        let mut fields = self.api_fields("OrderInquiry", payment_id);
        fields.insert("HostRefNum".to_string(), reference.to_string());
        let (response, raw) = self.post(environment, API_PATH, fields, true).await?;
        Ok(Self::result(payment_id, Operation::Status, &response, raw))
    }
}
