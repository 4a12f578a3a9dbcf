//! HTTP surface: payment endpoints, the bank callback and health probes.

pub mod payments;

use crate::health::{HealthChecker, HealthStatus};
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::services::CheckoutService;
use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub payments: payments::PaymentsState,
    pub health_checker: HealthChecker,
}

impl AppState {
    pub fn new(checkout: Arc<CheckoutService>, health_checker: HealthChecker) -> Self {
        Self {
            payments: payments::PaymentsState { checkout },
            health_checker,
        }
    }
}

impl FromRef<AppState> for payments::PaymentsState {
    fn from_ref(state: &AppState) -> Self {
        state.payments.clone()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/live", get(liveness))
        .route("/api/payments", post(payments::create_payment))
        .route(
            "/api/payments/callback/{provider}/{token}",
            post(payments::handle_callback),
        )
        .route(
            "/api/payments/{provider}/{payment_id}/cancel",
            post(payments::cancel_payment),
        )
        .route(
            "/api/payments/{provider}/{payment_id}/refund",
            post(payments::refund_payment),
        )
        .route(
            "/api/payments/{provider}/{payment_id}/status",
            get(payments::payment_status),
        )
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

/// GET /health
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let status = state.health_checker.check_health().await;
    let code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

/// GET /health/live
async fn liveness() -> Json<serde_json::Value> {
    Json(json!({
        "status": "alive",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
