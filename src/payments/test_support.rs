//! Scripted gateway transport for unit tests.

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::{CardDetails, ChargeRequest, Currency, Environment, Money};
use crate::payments::utils::{GatewayRequest, GatewayResponse, GatewayTransport};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Mutex;

#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<PaymentResult<GatewayResponse>>>,
    sent: Mutex<Vec<GatewayRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

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
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("no scripted reply for {}", request.url))
    }
}

pub fn card() -> CardDetails {
    CardDetails {
        holder_name: "Ayse Yilmaz".to_string(),
        number: "4355084355084358".to_string(),
        expiry_month: 12,
        expiry_year: 2030,
        cvv: "000".to_string(),
    }
}

pub fn charge(payment_id: &str, amount: &str) -> ChargeRequest {
    ChargeRequest {
        payment_id: payment_id.to_string(),
        amount: Money::new(BigDecimal::from_str(amount).unwrap(), Currency::Try),
        installment_count: 1,
        three_d: false,
        environment: Environment::Sandbox,
        callback_url: None,
    }
}

pub fn context(
    provider: crate::payments::types::ProviderName,
    payment_id: &str,
    session_id: &str,
) -> crate::payments::types::TransactionContext {
    crate::payments::types::TransactionContext {
        tenant_id: "tenant-1".to_string(),
        provider,
        payment_id: payment_id.to_string(),
        amount: BigDecimal::from_str("100.50").unwrap(),
        currency: Currency::Try,
        environment: Environment::Sandbox,
        client_ip: "203.0.113.7".to_string(),
        original_callback_url: "https://shop.example/return".to_string(),
        log_id: "log-1".to_string(),
        session_id: session_id.to_string(),
        installment_count: 1,
        created_at: chrono::Utc::now(),
    }
}
