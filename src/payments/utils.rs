use crate::payments::error::{PaymentError, PaymentResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, warn};

/// Wire body of an outbound gateway call. Values are already rendered
/// strings; nothing here reformats them.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(JsonValue),
    Form(Vec<(String, String)>),
    Multipart(Vec<(String, String)>),
}

#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub method: reqwest::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    /// Only idempotent calls (status, cancel, refund) may be retried.
    pub idempotent: bool,
}

impl GatewayRequest {
    pub fn post(url: impl Into<String>, body: RequestBody) -> Self {
        Self {
            method: reqwest::Method::POST,
            url: url.into(),
            headers: Vec::new(),
            body,
            idempotent: false,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    /// Body fields as a flat list, for audit records and tests.
    pub fn fields(&self) -> Vec<(String, String)> {
        match &self.body {
            RequestBody::Form(fields) | RequestBody::Multipart(fields) => fields.clone(),
            RequestBody::Json(JsonValue::Object(map)) => map
                .iter()
                .map(|(k, v)| {
                    let value = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
                    (k.clone(), value)
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<String> {
        self.fields()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }
}

#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: u16,
    pub body: String,
}

impl GatewayResponse {
    /// Parses the body whatever the HTTP status; declines often arrive in 4xx bodies.
    pub fn json<T: DeserializeOwned>(&self, provider: &str) -> PaymentResult<T> {
        serde_json::from_str::<T>(&self.body).map_err(|e| PaymentError::ProviderError {
            provider: provider.to_string(),
            message: format!("invalid provider JSON response (HTTP {}): {}", self.status, e),
        })
    }

    pub fn raw_json(&self) -> JsonValue {
        serde_json::from_str(&self.body).unwrap_or_else(|_| JsonValue::String(self.body.clone()))
    }
}

/// Outbound HTTP seam between the payment core and the network.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn send(&self, request: GatewayRequest) -> PaymentResult<GatewayResponse>;
}

#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    timeout: Duration,
    max_retries: u32,
}

impl PaymentHttpClient {
    pub fn new(timeout: Duration, max_retries: u32) -> PaymentResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| PaymentError::TransportError {
                    message: format!("failed to initialize HTTP client: {}", e),
                    retryable: false,
                    timed_out: false,
                })?;

        Ok(Self {
            client,
            timeout,
            max_retries: max_retries.min(crate::config::MAX_GATEWAY_RETRIES),
        })
    }

    fn build(&self, request: &GatewayRequest) -> PaymentResult<reqwest::RequestBuilder> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .timeout(self.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(payload) => builder.json(payload),
            RequestBody::Form(fields) => builder.form(fields),
            RequestBody::Multipart(fields) => {
                let mut form = reqwest::multipart::Form::new();
                for (name, value) in fields {
                    form = form.text(name.clone(), value.clone());
                }
                builder.multipart(form)
            }
        };
        Ok(builder)
    }
}

#[async_trait]
impl GatewayTransport for PaymentHttpClient {
    async fn send(&self, request: GatewayRequest) -> PaymentResult<GatewayResponse> {
        let attempts = if request.idempotent {
            self.max_retries
        } else {
            0
        };
        let mut last_error = None;

        for attempt in 0..=attempts {
            let result = self.build(&request)?.send().await;

            match result {
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.map_err(|e| PaymentError::TransportError {
                        message: format!("failed to read provider response: {}", e),
                        retryable: request.idempotent,
                        timed_out: e.is_timeout(),
                    })?;

                    if status.is_server_error() && attempt < attempts {
                        warn!(
                            status = %status,
                            attempt = attempt + 1,
                            url = %request.url,
                            "provider server error, retrying"
                        );
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }

                    debug!(status = %status, url = %request.url, "provider responded");
                    return Ok(GatewayResponse {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(e) => {
                    let timed_out = e.is_timeout();
                    last_error = Some(PaymentError::TransportError {
                        message: format!("provider request failed: {}", e),
                        retryable: timed_out || request.idempotent,
                        timed_out,
                    });
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(PaymentError::TransportError {
            message: "provider request failed".to_string(),
            retryable: request.idempotent,
            timed_out: false,
        }))
    }
}

pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_eq_behaves_correctly() {
        assert!(secure_eq(b"abc", b"abc"));
        assert!(!secure_eq(b"abc", b"abd"));
        assert!(!secure_eq(b"abc", b"ab"));
    }

    #[test]
    fn client_clamps_retry_count() {
        let client = PaymentHttpClient::new(Duration::from_secs(5), 64).unwrap();
        assert_eq!(client.max_retries, crate::config::MAX_GATEWAY_RETRIES);
    }

    #[test]
    fn declines_in_error_bodies_still_parse() {
        let response = GatewayResponse {
            status: 400,
            body: r#"{"success":false,"errorCode":"51"}"#.to_string(),
        };
        let parsed: JsonValue = response.json("paylink").expect("body is JSON");
        assert_eq!(parsed["errorCode"], "51");
    }

    #[test]
    fn non_json_body_is_a_provider_error() {
        let response = GatewayResponse {
            status: 502,
            body: "<html>bad gateway</html>".to_string(),
        };
        let err = response.json::<JsonValue>("estpos").unwrap_err();
        assert!(matches!(err, PaymentError::ProviderError { .. }));
        assert_eq!(
            response.raw_json(),
            JsonValue::String("<html>bad gateway</html>".to_string())
        );
    }

    #[test]
    fn request_fields_flatten_every_body_kind() {
        let form = GatewayRequest::post(
            "https://gw/api",
            RequestBody::Form(vec![("oid".to_string(), "A1".to_string())]),
        );
        assert_eq!(form.field("oid").as_deref(), Some("A1"));

        let json = GatewayRequest::post(
            "https://gw/api",
            RequestBody::Json(serde_json::json!({"amount": "1.00", "installment": 1})),
        );
        assert_eq!(json.field("amount").as_deref(), Some("1.00"));
        assert_eq!(json.field("installment").as_deref(), Some("1"));
        assert!(!json.idempotent);
        assert!(json.clone().idempotent().idempotent);
    }
}
