pub mod estpos;
pub mod paylink;
pub mod turkpay;

pub use estpos::{EstposConfig, EstposProvider};
pub use paylink::{PaylinkConfig, PaylinkProvider};
pub use turkpay::{TurkpayConfig, TurkpayProvider};

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::{Environment, ProviderName};

/// Sandbox and production roots of one gateway.
#[derive(Debug, Clone)]
pub struct GatewayEndpoints {
    pub sandbox_base_url: String,
    pub production_base_url: String,
}

impl GatewayEndpoints {
    pub fn new(sandbox: impl Into<String>, production: impl Into<String>) -> Self {
        Self {
            sandbox_base_url: sandbox.into(),
            production_base_url: production.into(),
        }
    }

    /// Reads `{PREFIX}_SANDBOX_URL` and `{PREFIX}_PRODUCTION_URL`, falling back to the defaults.
    pub fn from_env(prefix: &str, sandbox: &str, production: &str) -> Self {
        Self::new(
            std::env::var(format!("{}_SANDBOX_URL", prefix)).unwrap_or_else(|_| sandbox.to_string()),
            std::env::var(format!("{}_PRODUCTION_URL", prefix))
                .unwrap_or_else(|_| production.to_string()),
        )
    }

    pub fn url(&self, environment: Environment, path: &str) -> String {
        let base = match environment {
            Environment::Sandbox => &self.sandbox_base_url,
            Environment::Production => &self.production_base_url,
        };
        format!("{}{}", base.trim_end_matches('/'), path)
    }
}

pub(crate) fn required_env(name: &str) -> PaymentResult<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| PaymentError::ValidationError {
            message: format!("{} environment variable is required", name),
            field: Some(name.to_string()),
        })
}

/// Vendor refusal, keeping its own code where it sent one.
pub(crate) fn decline(
    provider: ProviderName,
    code: Option<&str>,
    message: Option<&str>,
    fallback_code: &str,
) -> PaymentError {
    PaymentError::VendorDeclineError {
        provider: provider.to_string(),
        code: code
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(fallback_code)
            .to_string(),
        message: message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or("declined by gateway")
            .to_string(),
    }
}

/// Case-insensitive lookup in posted bank fields.
pub(crate) fn posted<'a>(
    fields: &'a crate::payments::types::ParameterSet,
    name: &str,
) -> Option<&'a str> {
    fields
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::ParameterSet;

    #[test]
    fn endpoints_pick_environment_root() {
        let endpoints = GatewayEndpoints::new("https://sandbox.gw/", "https://live.gw");
        assert_eq!(
            endpoints.url(Environment::Sandbox, "/v1/payments"),
            "https://sandbox.gw/v1/payments"
        );
        assert_eq!(
            endpoints.url(Environment::Production, "/v1/payments"),
            "https://live.gw/v1/payments"
        );
    }

    #[test]
    fn decline_falls_back_when_vendor_sends_no_code() {
        let err = decline(ProviderName::Turkpay, Some(" "), None, "session_failed");
        match err {
            PaymentError::VendorDeclineError { code, provider, .. } => {
                assert_eq!(code, "session_failed");
                assert_eq!(provider, "turkpay");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn posted_fields_match_any_case() {
        let mut fields = ParameterSet::new();
        fields.insert("HASH".to_string(), "abc".to_string());
        assert_eq!(posted(&fields, "hash"), Some("abc"));
        assert_eq!(posted(&fields, "mdStatus"), None);
    }
}
