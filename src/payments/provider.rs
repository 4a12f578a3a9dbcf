use crate::payments::audit::fields;
use crate::payments::error::{PaymentError, PaymentResult, StateErrorKind};
use crate::payments::types::{
    AuthenticationArtifact, CallContext, CallbackVerdict, CardDetails, CardToken, ChargeRequest,
    Currency, Environment, Money, NormalizedResult, ParameterSet, ProviderName, ThreeDSession,
    TransactionContext,
};
use async_trait::async_trait;

/// References recovered from the audit log before a follow-up call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StashedReferences {
    pub card_token: Option<String>,
    pub reference_number: Option<String>,
    pub session_id: Option<String>,
}

impl StashedReferences {
    fn required<'a>(value: &'a Option<String>, field: &str) -> PaymentResult<&'a str> {
        value
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                PaymentError::state(
                    StateErrorKind::MissingReference,
                    format!("no '{}' recorded for this payment", field),
                )
            })
    }

    pub fn card_token(&self) -> PaymentResult<&str> {
        Self::required(&self.card_token, fields::CARD_TOKEN)
    }

    pub fn reference_number(&self) -> PaymentResult<&str> {
        Self::required(&self.reference_number, fields::REFERENCE_NUMBER)
    }

    pub fn session_id(&self) -> PaymentResult<&str> {
        Self::required(&self.session_id, fields::SESSION_ID)
    }
}

/// One acquiring gateway's wire protocol. Implementations build and sign
/// requests and map answers; sequencing lives in
/// [`ProviderSession`](crate::payments::session::ProviderSession).
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn name(&self) -> ProviderName;

    fn supported_currencies(&self) -> &'static [Currency];

    fn supports_currency(&self, currency: Currency) -> bool {
        self.supported_currencies().contains(&currency)
    }

    /// Exchanges raw card data for a vault token. `card` is consumed.
    async fn tokenize(
        &self,
        card: CardDetails,
        charge: &ChargeRequest,
        ctx: &CallContext,
    ) -> PaymentResult<CardToken>;

    /// Single-step authorization without 3-D authentication.
    async fn charge(
        &self,
        charge: &ChargeRequest,
        card: &CardToken,
        ctx: &CallContext,
    ) -> PaymentResult<NormalizedResult>;

    async fn open_session(
        &self,
        charge: &ChargeRequest,
        card: &CardToken,
        callback_url: &str,
        ctx: &CallContext,
    ) -> PaymentResult<ThreeDSession>;

    /// What the browser is handed to reach the bank.
    fn authentication_artifact(
        &self,
        charge: &ChargeRequest,
        session: &ThreeDSession,
        callback_url: &str,
    ) -> PaymentResult<AuthenticationArtifact>;

    /// Checks the fields the bank posted back against the stored context.
    fn verify_callback(
        &self,
        context: &TransactionContext,
        fields: &ParameterSet,
    ) -> PaymentResult<CallbackVerdict>;

    async fn capture(
        &self,
        context: &TransactionContext,
        stash: &StashedReferences,
        fields: &ParameterSet,
        ctx: &CallContext,
    ) -> PaymentResult<NormalizedResult>;

    async fn cancel(
        &self,
        payment_id: &str,
        reference: &str,
        environment: Environment,
        ctx: &CallContext,
    ) -> PaymentResult<NormalizedResult>;

    async fn refund(
        &self,
        payment_id: &str,
        reference: &str,
        amount: &Money,
        environment: Environment,
        ctx: &CallContext,
    ) -> PaymentResult<NormalizedResult>;

    async fn status(
        &self,
        payment_id: &str,
        reference: &str,
        environment: Environment,
        ctx: &CallContext,
    ) -> PaymentResult<NormalizedResult>;
}
