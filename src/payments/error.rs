use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

/// Why a callback token or stored reference could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateErrorKind {
    TokenNotFound,
    TokenExpired,
    MissingReference,
    InvalidTransition,
}

impl StateErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateErrorKind::TokenNotFound => "token_not_found",
            StateErrorKind::TokenExpired => "token_expired",
            StateErrorKind::MissingReference => "missing_reference",
            StateErrorKind::InvalidTransition => "invalid_transition",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    /// A signature could not be produced or checked. Always an implementation bug.
    #[error("Signing error: provider={provider}, message={message}")]
    SigningError { provider: String, message: String },

    #[error("Transport error: {message}")]
    TransportError {
        message: String,
        retryable: bool,
        timed_out: bool,
    },

    #[error("Declined by {provider}: code={code}, message={message}")]
    VendorDeclineError {
        provider: String,
        code: String,
        message: String,
    },

    #[error("State error ({}): {message}", kind.as_str())]
    StateError {
        kind: StateErrorKind,
        message: String,
    },

    #[error("Provider error: provider={provider}, message={message}")]
    ProviderError { provider: String, message: String },
}

impl PaymentError {
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        PaymentError::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn state(kind: StateErrorKind, message: impl Into<String>) -> Self {
        PaymentError::StateError {
            kind,
            message: message.into(),
        }
    }

    pub fn signing(provider: impl Into<String>, message: impl Into<String>) -> Self {
        PaymentError::SigningError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::ValidationError { .. } => false,
            PaymentError::SigningError { .. } => false,
            PaymentError::TransportError { retryable, .. } => *retryable,
            PaymentError::VendorDeclineError { .. } => false,
            PaymentError::StateError { .. } => false,
            PaymentError::ProviderError { .. } => false,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::ValidationError { .. } => 400,
            PaymentError::SigningError { .. } => 500,
            PaymentError::TransportError { timed_out: true, .. } => 504,
            PaymentError::TransportError { .. } => 503,
            PaymentError::VendorDeclineError { .. } => 402,
            PaymentError::StateError {
                kind: StateErrorKind::TokenExpired,
                ..
            } => 410,
            PaymentError::StateError {
                kind: StateErrorKind::InvalidTransition,
                ..
            } => 409,
            PaymentError::StateError { .. } => 404,
            PaymentError::ProviderError { .. } => 502,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PaymentError::ValidationError { message, .. } => message.clone(),
            PaymentError::SigningError { .. } => {
                "Payment request could not be signed".to_string()
            }
            PaymentError::TransportError { .. } => {
                "Payment provider is temporarily unavailable".to_string()
            }
            PaymentError::VendorDeclineError { .. } => {
                "Payment was declined by the provider".to_string()
            }
            PaymentError::StateError { kind, .. } => match kind {
                StateErrorKind::TokenNotFound => "Unknown payment session".to_string(),
                StateErrorKind::TokenExpired => "Payment session has expired".to_string(),
                StateErrorKind::MissingReference => {
                    "No provider reference recorded for this payment".to_string()
                }
                StateErrorKind::InvalidTransition => {
                    "Payment is not in a state that allows this operation".to_string()
                }
            },
            PaymentError::ProviderError { .. } => "Payment provider returned an error".to_string(),
        }
    }
}

impl From<PaymentError> for crate::error::AppError {
    fn from(err: PaymentError) -> Self {
        crate::error::AppError::new(crate::error::AppErrorKind::Payment(err))
    }
}
