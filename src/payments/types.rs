use crate::payments::error::PaymentError;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::OnceLock;

/// Flat string map posted back by the bank or sent to a gateway.
pub type ParameterSet = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderName {
    Estpos,
    Paylink,
    Turkpay,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Estpos => "estpos",
            ProviderName::Paylink => "paylink",
            ProviderName::Turkpay => "turkpay",
        }
    }

    pub fn all() -> [ProviderName; 3] {
        [
            ProviderName::Estpos,
            ProviderName::Paylink,
            ProviderName::Turkpay,
        ]
    }
}

impl std::fmt::Display for ProviderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "estpos" | "est" => Ok(ProviderName::Estpos),
            "paylink" => Ok(ProviderName::Paylink),
            "turkpay" => Ok(ProviderName::Turkpay),
            _ => Err(PaymentError::ValidationError {
                message: format!("unsupported provider: {}", value),
                field: Some("provider".to_string()),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Try,
    Usd,
    Eur,
    Gbp,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Try => "TRY",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
        }
    }

    /// ISO 4217 numeric code, used by form-based bank gateways.
    pub fn numeric_code(&self) -> &'static str {
        match self {
            Currency::Try => "949",
            Currency::Usd => "840",
            Currency::Eur => "978",
            Currency::Gbp => "826",
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Currency {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "TRY" | "TL" | "949" => Ok(Currency::Try),
            "USD" | "840" => Ok(Currency::Usd),
            "EUR" | "978" => Ok(Currency::Eur),
            "GBP" | "826" => Ok(Currency::Gbp),
            _ => Err(PaymentError::validation(
                format!("unsupported currency: {}", value),
                "currency",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Sandbox,
    Production,
}

impl FromStr for Environment {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "sandbox" | "test" => Ok(Environment::Sandbox),
            "production" | "prod" | "live" => Ok(Environment::Production),
            _ => Err(PaymentError::validation(
                format!("unknown environment: {}", value),
                "environment",
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Money {
    pub amount: BigDecimal,
    pub currency: Currency,
}

impl Money {
    pub fn new(amount: BigDecimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    pub fn validate_positive(&self, field: &str) -> Result<(), PaymentError> {
        if self.amount <= BigDecimal::from(0) {
            return Err(PaymentError::ValidationError {
                message: "amount must be greater than zero".to_string(),
                field: Some(field.to_string()),
            });
        }
        if self.amount.with_scale(2) != self.amount {
            return Err(PaymentError::ValidationError {
                message: format!("amount has more than two decimals: {}", self.amount),
                field: Some(field.to_string()),
            });
        }
        Ok(())
    }

    /// `100.5` renders as `"100.50"`.
    pub fn decimal_string(&self) -> String {
        self.amount.with_scale(2).to_string()
    }

    /// `100.50` renders as `"10050"`.
    pub fn minor_units_string(&self) -> String {
        (&self.amount * BigDecimal::from(100)).with_scale(0).to_string()
    }
}

fn pan_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]{12,19}$").expect("static regex"))
}

fn cvv_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]{3,4}$").expect("static regex"))
}

/// Raw card data. Only lives until the tokenization call consumes it.
#[derive(Clone, Deserialize)]
pub struct CardDetails {
    pub holder_name: String,
    pub number: String,
    pub expiry_month: u8,
    pub expiry_year: u16,
    pub cvv: String,
}

impl std::fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardDetails")
            .field("number", &crate::logging::mask_card_number(&self.number))
            .field("expiry_month", &self.expiry_month)
            .field("expiry_year", &self.expiry_year)
            .finish_non_exhaustive()
    }
}

impl CardDetails {
    pub fn validate(&self) -> Result<(), PaymentError> {
        if !pan_pattern().is_match(&self.number) {
            return Err(PaymentError::validation(
                "card number must be 12-19 digits",
                "card.number",
            ));
        }
        if !luhn_valid(&self.number) {
            return Err(PaymentError::validation(
                "card number failed checksum",
                "card.number",
            ));
        }
        if !(1..=12).contains(&self.expiry_month) {
            return Err(PaymentError::validation(
                "expiry month must be 1-12",
                "card.expiry_month",
            ));
        }
        if self.expiry_year < 2000 {
            return Err(PaymentError::validation(
                "expiry year must be four digits",
                "card.expiry_year",
            ));
        }
        if !cvv_pattern().is_match(&self.cvv) {
            return Err(PaymentError::validation("cvv must be 3-4 digits", "card.cvv"));
        }
        if self.holder_name.trim().is_empty() {
            return Err(PaymentError::validation(
                "card holder name is required",
                "card.holder_name",
            ));
        }
        Ok(())
    }

    /// `MM`
    pub fn month_2(&self) -> String {
        format!("{:02}", self.expiry_month)
    }

    /// `YY`
    pub fn year_2(&self) -> String {
        format!("{:02}", self.expiry_year % 100)
    }
}

fn luhn_valid(number: &str) -> bool {
    let mut sum = 0u32;
    for (idx, ch) in number.chars().rev().enumerate() {
        let Some(mut digit) = ch.to_digit(10) else {
            return false;
        };
        if idx % 2 == 1 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }
    sum % 10 == 0
}

/// Single-use card reference returned by a gateway's vault.
#[derive(Clone, PartialEq, Eq)]
pub struct CardToken(pub String);

impl CardToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for CardToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CardToken({})", crate::logging::mask_token(&self.0))
    }
}

/// Per-call scratch data threaded through every provider method.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CallContext {
    pub tenant_id: String,
    pub client_ip: String,
    pub log_id: String,
    pub phone: Option<String>,
}

impl CallContext {
    pub fn new(tenant_id: impl Into<String>, client_ip: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_ip: client_ip.into(),
            log_id: uuid::Uuid::new_v4().to_string(),
            phone: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    pub payment_id: String,
    pub amount: Money,
    pub card: CardDetails,
    #[serde(default = "default_installments")]
    pub installment_count: u8,
    #[serde(default)]
    pub three_d: bool,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub environment: Environment,
}

fn default_installments() -> u8 {
    1
}

impl PaymentRequest {
    pub fn validate(&self) -> Result<(), PaymentError> {
        if self.payment_id.trim().is_empty() {
            return Err(PaymentError::validation(
                "payment_id is required",
                "payment_id",
            ));
        }
        self.amount.validate_positive("amount")?;
        self.card.validate()?;
        if self.installment_count == 0 || self.installment_count > 12 {
            return Err(PaymentError::validation(
                "installment_count must be between 1 and 12",
                "installment_count",
            ));
        }
        if self.three_d {
            let callback = self.callback_url.as_deref().unwrap_or("").trim();
            if !callback.starts_with("https://") && !callback.starts_with("http://") {
                return Err(PaymentError::validation(
                    "callback_url must be an absolute http(s) URL for 3-D payments",
                    "callback_url",
                ));
            }
        }
        Ok(())
    }
}

/// The card-free half of a [`PaymentRequest`]; this is what flows past tokenization.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub payment_id: String,
    pub amount: Money,
    pub installment_count: u8,
    pub three_d: bool,
    pub environment: Environment,
    pub callback_url: Option<String>,
}

impl PaymentRequest {
    /// Split off the card so it can be dropped right after tokenization.
    pub fn into_parts(self) -> (CardDetails, ChargeRequest) {
        let charge = ChargeRequest {
            payment_id: self.payment_id,
            amount: self.amount,
            installment_count: self.installment_count,
            three_d: self.three_d,
            environment: self.environment,
            callback_url: self.callback_url,
        };
        (self.card, charge)
    }
}

/// Everything needed to finish a 3-D payment once the browser comes back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionContext {
    pub tenant_id: String,
    pub provider: ProviderName,
    pub payment_id: String,
    pub amount: BigDecimal,
    pub currency: Currency,
    pub environment: Environment,
    pub client_ip: String,
    pub original_callback_url: String,
    pub log_id: String,
    pub session_id: String,
    pub installment_count: u8,
    pub created_at: DateTime<Utc>,
}

impl TransactionContext {
    pub fn money(&self) -> Money {
        Money::new(self.amount.clone(), self.currency)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Successful,
    Pending,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Successful => "successful",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

/// What the browser must be handed to reach the bank's authentication page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthenticationArtifact {
    AutoSubmitForm {
        action: String,
        fields: Vec<(String, String)>,
        html: String,
    },
    Redirect {
        url: String,
    },
    GatewayHtml {
        html: String,
    },
}

impl AuthenticationArtifact {
    pub fn is_empty(&self) -> bool {
        match self {
            AuthenticationArtifact::AutoSubmitForm { html, .. } => html.trim().is_empty(),
            AuthenticationArtifact::Redirect { url } => url.trim().is_empty(),
            AuthenticationArtifact::GatewayHtml { html } => html.trim().is_empty(),
        }
    }
}

/// A 3-D session opened at the gateway, before the browser is redirected.
#[derive(Debug, Clone)]
pub struct ThreeDSession {
    pub session_id: String,
    pub reference_number: Option<String>,
    pub redirect_url: Option<String>,
    pub gateway_html: Option<String>,
}

/// Outcome of checking the fields the bank posted back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackVerdict {
    Authenticated { fields: ParameterSet },
    /// The bank answered and authentication failed.
    Rejected { code: String, message: String },
    /// The post cannot be attributed to this payment's bank: bad or missing
    /// signature, or fields belonging to another order. The bank may still
    /// post a genuine callback for the same token.
    Untrusted { code: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedResult {
    pub success: bool,
    pub status: PaymentStatus,
    pub payment_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<BigDecimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default)]
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthenticationArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    /// Vendor payload, kept for audit only.
    #[serde(default, skip_serializing)]
    pub raw: JsonValue,
}

impl NormalizedResult {
    pub fn new(payment_id: impl Into<String>, status: PaymentStatus) -> Self {
        Self {
            success: matches!(
                status,
                PaymentStatus::Successful | PaymentStatus::Cancelled | PaymentStatus::Refunded
            ),
            status,
            payment_id: payment_id.into(),
            transaction_id: None,
            reference_number: None,
            amount: None,
            currency: None,
            message: None,
            error_code: None,
            retryable: false,
            authentication: None,
            callback_url: None,
            raw: JsonValue::Null,
        }
    }

    /// Failed result carrying the vendor's own code.
    pub fn declined(
        payment_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut result = Self::new(payment_id, PaymentStatus::Failed);
        result.error_code = Some(code.into());
        result.message = Some(message.into());
        result
    }

    /// True once the gateway has decided the payment and asking again
    /// cannot change the answer.
    pub fn is_settled(&self) -> bool {
        self.status != PaymentStatus::Pending && !self.retryable
    }

    pub fn with_money(mut self, money: &Money) -> Self {
        self.amount = Some(money.amount.clone());
        self.currency = Some(money.currency);
        self
    }

    pub fn with_raw(mut self, raw: JsonValue) -> Self {
        self.raw = raw;
        self
    }

    /// Turns declines and transport failures into a Failed result; other
    /// errors are returned unchanged.
    pub fn from_error(payment_id: &str, err: PaymentError) -> Result<Self, PaymentError> {
        match err {
            PaymentError::VendorDeclineError { code, message, .. } => {
                Ok(Self::declined(payment_id, code, message))
            }
            PaymentError::TransportError {
                message,
                retryable,
                timed_out,
            } => {
                let mut result = Self::declined(
                    payment_id,
                    if timed_out { "timeout" } else { "transport" },
                    message,
                );
                result.retryable = retryable;
                Ok(result)
            }
            PaymentError::ProviderError { message, .. } => {
                Ok(Self::declined(payment_id, "invalid_response", message))
            }
            other => Err(other),
        }
    }
}
