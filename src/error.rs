//! Application error type for the web layer
//!
//! Wraps the payment taxonomy and startup failures with HTTP status mapping,
//! user-facing messages and stable error codes.

use crate::config::ConfigError;
use crate::payments::error::{PaymentError, StateErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling by clients
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
    #[serde(rename = "PAYMENT_DECLINED")]
    PaymentDeclined,
    #[serde(rename = "PAYMENT_SESSION_NOT_FOUND")]
    PaymentSessionNotFound,
    #[serde(rename = "PAYMENT_SESSION_EXPIRED")]
    PaymentSessionExpired,
    #[serde(rename = "MISSING_PROVIDER_REFERENCE")]
    MissingProviderReference,
    #[serde(rename = "INVALID_PAYMENT_STATE")]
    InvalidPaymentState,

    #[serde(rename = "SIGNING_ERROR")]
    SigningError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    #[serde(rename = "PAYMENT_PROVIDER_ERROR")]
    PaymentProviderError,
    #[serde(rename = "PROVIDER_UNAVAILABLE")]
    ProviderUnavailable,
    #[serde(rename = "EXTERNAL_SERVICE_TIMEOUT")]
    ExternalServiceTimeout,

    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Payment(PaymentError),
    Configuration(String),
    Internal(String),
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Internal(message.into()))
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Payment(err) => err.http_status_code(),
            AppErrorKind::Configuration(_) => 500,
            AppErrorKind::Internal(_) => 500,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Payment(err) => match err {
                PaymentError::ValidationError { .. } => ErrorCode::ValidationError,
                PaymentError::SigningError { .. } => ErrorCode::SigningError,
                PaymentError::TransportError {
                    timed_out: true, ..
                } => ErrorCode::ExternalServiceTimeout,
                PaymentError::TransportError { .. } => ErrorCode::ProviderUnavailable,
                PaymentError::VendorDeclineError { .. } => ErrorCode::PaymentDeclined,
                PaymentError::StateError { kind, .. } => match kind {
                    StateErrorKind::TokenNotFound => ErrorCode::PaymentSessionNotFound,
                    StateErrorKind::TokenExpired => ErrorCode::PaymentSessionExpired,
                    StateErrorKind::MissingReference => ErrorCode::MissingProviderReference,
                    StateErrorKind::InvalidTransition => ErrorCode::InvalidPaymentState,
                },
                PaymentError::ProviderError { .. } => ErrorCode::PaymentProviderError,
            },
            AppErrorKind::Configuration(_) => ErrorCode::ConfigurationError,
            AppErrorKind::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Payment(err) => err.user_message(),
            AppErrorKind::Configuration(_) | AppErrorKind::Internal(_) => {
                "An internal server error occurred. Please try again later.".to_string()
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Payment(err) => err.is_retryable(),
            AppErrorKind::Configuration(_) => false,
            AppErrorKind::Internal(_) => false,
        }
    }

    /// The offending request field, when there is one.
    pub fn field(&self) -> Option<&str> {
        match &self.kind {
            AppErrorKind::Payment(PaymentError::ValidationError { field, .. }) => field.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AppErrorKind::Payment(err) => write!(f, "{}", err),
            AppErrorKind::Configuration(message) => write!(f, "Configuration error: {}", message),
            AppErrorKind::Internal(message) => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for AppError {}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::new(AppErrorKind::Configuration(err.to_string()))
    }
}

pub type AppResult<T> = Result<T, AppError>;
