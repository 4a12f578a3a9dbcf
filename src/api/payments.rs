use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use reqwest::Url;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::AppError;
use crate::middleware::error::get_request_id_from_headers;
use crate::payments::error::PaymentError;
use crate::payments::types::{
    CallContext, Money, NormalizedResult, ParameterSet, PaymentRequest, ProviderName,
};
use crate::services::CheckoutService;

#[derive(Clone)]
pub struct PaymentsState {
    pub checkout: Arc<CheckoutService>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderQuery {
    pub provider: Option<String>,
}

type ApiResult<T> = Result<T, AppError>;

/// Per-call context from the inbound headers. The request id doubles as the
/// audit log id so log lines and audit rows can be joined.
fn call_context(headers: &HeaderMap) -> CallContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let mut ctx = CallContext::new(
        header("x-tenant-id").unwrap_or_else(|| "default".to_string()),
        header("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
            .unwrap_or_else(|| "0.0.0.0".to_string()),
    );
    if let Some(request_id) = header("x-request-id") {
        ctx.log_id = request_id;
    }
    ctx.phone = header("x-customer-phone");
    ctx
}

fn provider(value: &str, request_id: &Option<String>) -> ApiResult<ProviderName> {
    ProviderName::from_str(value).map_err(|e| AppError::from(e).with_request_id(request_id.clone()))
}

fn app_error(request_id: &Option<String>) -> impl Fn(PaymentError) -> AppError + '_ {
    move |e| AppError::from(e).with_request_id(request_id.clone())
}

/// POST /api/payments
pub async fn create_payment(
    State(state): State<PaymentsState>,
    Query(query): Query<ProviderQuery>,
    headers: HeaderMap,
    Json(request): Json<PaymentRequest>,
) -> ApiResult<Json<NormalizedResult>> {
    let request_id = get_request_id_from_headers(&headers);
    let provider = query
        .provider
        .as_deref()
        .map(|p| provider(p, &request_id))
        .transpose()?;

    info!(
        payment_id = %request.payment_id,
        provider = ?provider,
        three_d = request.three_d,
        "payment requested"
    );

    let result = state
        .checkout
        .process(provider, request, call_context(&headers))
        .await
        .map_err(app_error(&request_id))?;
    Ok(Json(result))
}

/// POST /api/payments/callback/{provider}/{token}
///
/// The bank posts the browser here. On success the browser is sent back to
/// the merchant's original callback URL.
pub async fn handle_callback(
    State(state): State<PaymentsState>,
    Path((provider_name, token)): Path<(String, String)>,
    headers: HeaderMap,
    Form(posted): Form<ParameterSet>,
) -> ApiResult<Response> {
    let request_id = get_request_id_from_headers(&headers);
    let provider = provider(&provider_name, &request_id)?;

    let result = state
        .checkout
        .complete(provider, &token, posted, call_context(&headers))
        .await
        .map_err(app_error(&request_id))?;

    let target = merchant_redirect(&result).map_err(app_error(&request_id))?;
    info!(
        provider = %provider,
        payment_id = %result.payment_id,
        status = result.status.as_str(),
        "callback handled, redirecting to merchant"
    );
    Ok(Redirect::to(target.as_str()).into_response())
}

fn merchant_redirect(result: &NormalizedResult) -> Result<Url, PaymentError> {
    let original = result.callback_url.as_deref().ok_or_else(|| {
        PaymentError::validation("payment has no merchant callback url", "callback_url")
    })?;
    let mut url = Url::parse(original).map_err(|e| {
        warn!(error = %e, "stored merchant callback url does not parse");
        PaymentError::validation(format!("invalid merchant callback url: {}", e), "callback_url")
    })?;
    url.query_pairs_mut()
        .append_pair("paymentId", &result.payment_id)
        .append_pair("status", result.status.as_str());
    Ok(url)
}

/// POST /api/payments/{provider}/{payment_id}/cancel
pub async fn cancel_payment(
    State(state): State<PaymentsState>,
    Path((provider_name, payment_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<NormalizedResult>> {
    let request_id = get_request_id_from_headers(&headers);
    let provider = provider(&provider_name, &request_id)?;
    let result = state
        .checkout
        .cancel(provider, &payment_id, call_context(&headers))
        .await
        .map_err(app_error(&request_id))?;
    Ok(Json(result))
}

/// POST /api/payments/{provider}/{payment_id}/refund
pub async fn refund_payment(
    State(state): State<PaymentsState>,
    Path((provider_name, payment_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(amount): Json<Money>,
) -> ApiResult<Json<NormalizedResult>> {
    let request_id = get_request_id_from_headers(&headers);
    let provider = provider(&provider_name, &request_id)?;
    let result = state
        .checkout
        .refund(provider, &payment_id, amount, call_context(&headers))
        .await
        .map_err(app_error(&request_id))?;
    Ok(Json(result))
}

/// GET /api/payments/{provider}/{payment_id}/status
pub async fn payment_status(
    State(state): State<PaymentsState>,
    Path((provider_name, payment_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<NormalizedResult>> {
    let request_id = get_request_id_from_headers(&headers);
    let provider = provider(&provider_name, &request_id)?;
    let result = state
        .checkout
        .status(provider, &payment_id, call_context(&headers))
        .await
        .map_err(app_error(&request_id))?;
    Ok(Json(result))
}
