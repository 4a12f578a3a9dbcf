mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::*;
use posgate_backend::api::{router, AppState};
use posgate_backend::health::HealthChecker;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app(h: &Harness) -> Router {
    router(AppState::new(
        h.checkout.clone(),
        HealthChecker::new(vec!["estpos".to_string()]),
    ))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn payment_body(payment_id: &str, three_d: bool) -> Value {
    let mut body = json!({
        "payment_id": payment_id,
        "amount": {"amount": "100.50", "currency": "TRY"},
        "card": {
            "holder_name": "Ayse Yilmaz",
            "number": "4355084355084358",
            "expiry_month": 12,
            "expiry_year": 2030,
            "cvv": "000"
        },
        "three_d": three_d
    });
    if three_d {
        body["callback_url"] = json!(MERCHANT_RETURN_URL);
    }
    body
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn create_payment_returns_normalized_result() {
    let h = estpos_harness();
    h.transport
        .reply(200, json!({"Response": "Approved", "Token": "tok_1"}))
        .reply(
            200,
            json!({"Response": "Approved", "ProcReturnCode": "00", "TransId": "T-1", "HostRefNum": "HR-1"}),
        );

    let response = app(&h)
        .oneshot(post_json("/api/payments?provider=estpos", &payment_body("PAY-1", false)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body = body_json(response).await;
    assert_eq!(body["status"], "successful");
    assert_eq!(body["success"], true);
    assert_eq!(body["amount"], "100.50");
    assert!(body.get("raw").is_none());
}

#[tokio::test]
async fn bank_callback_redirects_browser_to_merchant() {
    let h = estpos_harness();
    h.transport
        .reply(200, json!({"Response": "Approved", "Token": "tok_2"}))
        .reply(200, json!({"Response": "Approved", "SessionId": "S-2"}));

    let response = app(&h)
        .oneshot(post_json("/api/payments", &payment_body("PAY-2", true)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let pending = body_json(response).await;
    assert_eq!(pending["status"], "pending");
    let callback_url = pending["callback_url"].as_str().unwrap().to_string();
    let path = callback_url.strip_prefix(PUBLIC_BASE_URL).unwrap().to_string();

    let form = signed_bank_fields(&[("oid", "PAY-2"), ("mdStatus", "0"), ("mdErrorMsg", "Not authenticated")]);
    let mut encoder = reqwest::Url::parse("http://form.local/").unwrap();
    encoder.query_pairs_mut().extend_pairs(form.iter());
    let encoded = encoder.query().unwrap().to_string();
    let response = app(&h)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(path)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(encoded))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert_eq!(
        location,
        "https://shop.example/return?paymentId=PAY-2&status=failed"
    );
}

#[tokio::test]
async fn unknown_callback_token_is_a_json_error() {
    let h = estpos_harness();
    let response = app(&h)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/payments/callback/estpos/not-a-token")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("oid=PAY-9"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "PAYMENT_SESSION_NOT_FOUND");
    assert!(h.transport.sent().is_empty());
}

#[tokio::test]
async fn cancel_without_reference_is_rejected() {
    let h = estpos_harness();
    let response = app(&h)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/payments/estpos/PAY-3/cancel")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "MISSING_PROVIDER_REFERENCE");
    assert_eq!(body["retryable"], false);
    assert!(h.transport.sent().is_empty());
}

#[tokio::test]
async fn unknown_provider_is_a_validation_error() {
    let h = estpos_harness();
    let response = app(&h)
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/payments/acme/PAY-4/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn health_reports_registered_providers() {
    let h = estpos_harness();
    let response = app(&h)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "Healthy");
    assert_eq!(body["providers"], json!(["estpos"]));
}
