//! Shared fixtures for the integration tests: a scripted gateway transport and
//! an Estpos-backed checkout wired to in-memory storage.
#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use posgate_backend::payments::audit::InMemoryAuditLog;
use posgate_backend::payments::callback::InMemoryCallbackStore;
use posgate_backend::payments::error::{PaymentError, PaymentResult};
use posgate_backend::payments::providers::estpos::{EstposConfig, EstposProvider};
use posgate_backend::payments::providers::GatewayEndpoints;
use posgate_backend::payments::signing::{self, policies, SigningKeys};
use posgate_backend::payments::types::{
    CardDetails, Currency, Environment, Money, ParameterSet, PaymentRequest, ProviderName,
};
use posgate_backend::payments::utils::{GatewayRequest, GatewayResponse, GatewayTransport};
use posgate_backend::payments::ProviderRegistry;
use posgate_backend::services::CheckoutService;
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const STORE_KEY: &str = "TRPS0200";
pub const PUBLIC_BASE_URL: &str = "https://pay.shop.example";
pub const MERCHANT_RETURN_URL: &str = "https://shop.example/return";

#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<PaymentResult<GatewayResponse>>>,
    sent: Mutex<Vec<GatewayRequest>>,
}

impl ScriptedTransport {
    pub fn reply(&self, status: u16, body: serde_json::Value) -> &Self {
        self.replies.lock().unwrap().push_back(Ok(GatewayResponse {
            status,
            body: body.to_string(),
        }));
        self
    }

    pub fn fail(&self, err: PaymentError) -> &Self {
        self.replies.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn sent(&self) -> Vec<GatewayRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl GatewayTransport for ScriptedTransport {
    async fn send(&self, request: GatewayRequest) -> PaymentResult<GatewayResponse> {
        self.sent.lock().unwrap().push(request.clone());
        let reply = self.replies.lock().unwrap().pop_front();
        reply.unwrap_or_else(|| panic!("no scripted reply for {}", request.url))
    }
}

pub struct Harness {
    pub transport: Arc<ScriptedTransport>,
    pub store: Arc<InMemoryCallbackStore>,
    pub audit: Arc<InMemoryAuditLog>,
    pub checkout: Arc<CheckoutService>,
}

pub fn estpos_harness() -> Harness {
    let transport = Arc::new(ScriptedTransport::default());
    let estpos = EstposProvider::new(
        EstposConfig {
            client_id: "700655000200".to_string(),
            api_user: "apiuser".to_string(),
            api_password: "apipass".to_string(),
            store_key: STORE_KEY.to_string(),
            lang: "tr".to_string(),
            endpoints: GatewayEndpoints::new("https://sandbox.estpos.test", "https://live.estpos.test"),
        },
        transport.clone(),
    );
    let mut registry = ProviderRegistry::new(ProviderName::Estpos);
    registry.register(Arc::new(estpos));

    let store = Arc::new(InMemoryCallbackStore::new(
        PUBLIC_BASE_URL,
        Duration::from_secs(900),
    ));
    let audit = Arc::new(InMemoryAuditLog::new());
    let checkout = Arc::new(CheckoutService::new(
        Arc::new(registry),
        store.clone(),
        audit.clone(),
        Duration::from_secs(900),
    ));
    Harness {
        transport,
        store,
        audit,
        checkout,
    }
}

pub fn test_card() -> CardDetails {
    CardDetails {
        holder_name: "Ayse Yilmaz".to_string(),
        number: "4355084355084358".to_string(),
        expiry_month: 12,
        expiry_year: 2030,
        cvv: "000".to_string(),
    }
}

pub fn payment_request(payment_id: &str, amount: &str, three_d: bool) -> PaymentRequest {
    PaymentRequest {
        payment_id: payment_id.to_string(),
        amount: Money::new(BigDecimal::from_str(amount).unwrap(), Currency::Try),
        card: test_card(),
        installment_count: 1,
        three_d,
        callback_url: three_d.then(|| MERCHANT_RETURN_URL.to_string()),
        environment: Environment::Sandbox,
    }
}

/// Bank fields signed with the store key, as the 3-D gate posts them.
pub fn signed_bank_fields(pairs: &[(&str, &str)]) -> ParameterSet {
    let mut fields: ParameterSet = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let hash = signing::sign(&policies::ESTPOS, &fields, &SigningKeys::new(STORE_KEY)).unwrap();
    fields.insert("HASH".to_string(), hash);
    fields
}

pub fn token_from(callback_url: &str) -> String {
    callback_url.rsplit('/').next().unwrap().to_string()
}
