mod common;

use common::*;
use posgate_backend::payments::error::{PaymentError, StateErrorKind};
use posgate_backend::payments::types::{
    AuthenticationArtifact, CallContext, PaymentStatus, ProviderName,
};
use serde_json::json;

#[tokio::test]
async fn non_3d_payment_settles_with_the_requested_amount() {
    let h = estpos_harness();
    h.transport
        .reply(200, json!({"Response": "Approved", "Token": "tok_A"}))
        .reply(
            200,
            json!({"Response": "Approved", "ProcReturnCode": "00", "TransId": "T-A", "HostRefNum": "HR-A"}),
        );

    let result = h
        .checkout
        .process(None, payment_request("PAY-A", "100.50", false), CallContext::default())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.status, PaymentStatus::Successful);
    assert_eq!(result.amount.unwrap().to_string(), "100.50");
    assert_eq!(result.reference_number.as_deref(), Some("HR-A"));
    assert!(result.authentication.is_none());
    assert!(h.store.is_empty().await);

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].field("Total").as_deref(), Some("100.50"));
    assert_eq!(sent[1].field("Currency").as_deref(), Some("949"));
}

#[tokio::test]
async fn three_d_payment_pends_then_fails_on_bank_decline() {
    let h = estpos_harness();
    h.transport
        .reply(200, json!({"Response": "Approved", "Token": "tok_B"}))
        .reply(200, json!({"Response": "Approved", "SessionId": "S-B", "HostRefNum": "HR-B"}));

    let pending = h
        .checkout
        .process(None, payment_request("PAY-B", "250.00", true), CallContext::default())
        .await
        .unwrap();

    assert_eq!(pending.status, PaymentStatus::Pending);
    assert!(!pending.success);
    match pending.authentication.as_ref() {
        Some(AuthenticationArtifact::AutoSubmitForm { html, action, .. }) => {
            assert!(!html.is_empty());
            assert_eq!(action, "https://sandbox.estpos.test/fim/est3Dgate");
        }
        other => panic!("expected an auto-submit form, got {:?}", other),
    }
    let callback_url = pending.callback_url.clone().unwrap();
    assert!(callback_url.starts_with("https://pay.shop.example/api/payments/callback/estpos/"));

    let declined = signed_bank_fields(&[
        ("oid", "PAY-B"),
        ("mdStatus", "0"),
        ("mdErrorMsg", "Not authenticated"),
    ]);
    let result = h
        .checkout
        .complete(
            ProviderName::Estpos,
            &token_from(&callback_url),
            declined,
            CallContext::default(),
        )
        .await
        .unwrap();

    assert_eq!(result.status, PaymentStatus::Failed);
    assert!(!result.success);
    assert_eq!(result.error_code.as_deref(), Some("0"));
    assert_eq!(result.callback_url.as_deref(), Some(MERCHANT_RETURN_URL));
    // No capture after a failed authentication.
    assert_eq!(h.transport.sent().len(), 2);
}

#[tokio::test]
async fn three_d_payment_captures_after_authentication() {
    let h = estpos_harness();
    h.transport
        .reply(200, json!({"Response": "Approved", "Token": "tok_D"}))
        .reply(200, json!({"Response": "Approved", "SessionId": "S-D"}))
        .reply(
            200,
            json!({"Response": "Approved", "ProcReturnCode": "00", "TransId": "T-D", "HostRefNum": "HR-D"}),
        );

    let pending = h
        .checkout
        .process(None, payment_request("PAY-D", "75.25", true), CallContext::default())
        .await
        .unwrap();
    let token = token_from(pending.callback_url.as_deref().unwrap());

    let authenticated = signed_bank_fields(&[
        ("oid", "PAY-D"),
        ("mdStatus", "1"),
        ("xid", "XID-D"),
        ("eci", "05"),
        ("cavv", "CAVV-D"),
        ("md", "MD-D"),
    ]);
    let result = h
        .checkout
        .complete(ProviderName::Estpos, &token, authenticated, CallContext::default())
        .await
        .unwrap();

    assert_eq!(result.status, PaymentStatus::Successful);
    assert_eq!(result.amount.unwrap().to_string(), "75.25");
    assert_eq!(result.callback_url.as_deref(), Some(MERCHANT_RETURN_URL));

    let capture = &h.transport.sent()[2];
    assert_eq!(capture.url, "https://sandbox.estpos.test/fim/api");
    assert_eq!(capture.field("PayerTxnId").as_deref(), Some("XID-D"));
    assert_eq!(capture.field("PayerAuthenticationCode").as_deref(), Some("CAVV-D"));
}

#[tokio::test]
async fn forged_callback_does_not_block_the_genuine_one() {
    let h = estpos_harness();
    h.transport
        .reply(200, json!({"Response": "Approved", "Token": "tok_G"}))
        .reply(200, json!({"Response": "Approved", "SessionId": "S-G"}));

    let pending = h
        .checkout
        .process(None, payment_request("PAY-G", "40.00", true), CallContext::default())
        .await
        .unwrap();
    let token = token_from(pending.callback_url.as_deref().unwrap());

    let forged = [("oid", "PAY-G"), ("mdStatus", "1"), ("HASH", "garbage")]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let rejected = h
        .checkout
        .complete(ProviderName::Estpos, &token, forged, CallContext::default())
        .await
        .unwrap();
    assert_eq!(rejected.status, PaymentStatus::Failed);
    assert_eq!(rejected.error_code.as_deref(), Some("invalid_signature"));
    assert!(rejected.retryable);
    assert_eq!(h.transport.sent().len(), 2);

    h.transport.reply(
        200,
        json!({"Response": "Approved", "ProcReturnCode": "00", "TransId": "T-G", "HostRefNum": "HR-G"}),
    );
    let genuine = signed_bank_fields(&[
        ("oid", "PAY-G"),
        ("mdStatus", "1"),
        ("xid", "XID-G"),
        ("cavv", "CAVV-G"),
    ]);
    let result = h
        .checkout
        .complete(ProviderName::Estpos, &token, genuine, CallContext::default())
        .await
        .unwrap();
    assert_eq!(result.status, PaymentStatus::Successful);
    assert_eq!(result.transaction_id.as_deref(), Some("T-G"));
    assert_eq!(h.transport.sent().len(), 3);
}

#[tokio::test]
async fn capture_without_answer_is_retried_by_the_next_callback() {
    let h = estpos_harness();
    h.transport
        .reply(200, json!({"Response": "Approved", "Token": "tok_H"}))
        .reply(200, json!({"Response": "Approved", "SessionId": "S-H"}))
        .fail(PaymentError::TransportError {
            message: "connection reset".to_string(),
            retryable: false,
            timed_out: false,
        })
        .reply(
            200,
            json!({"Response": "Approved", "ProcReturnCode": "00", "TransId": "T-H", "HostRefNum": "HR-H"}),
        );

    let pending = h
        .checkout
        .process(None, payment_request("PAY-H", "12.00", true), CallContext::default())
        .await
        .unwrap();
    let token = token_from(pending.callback_url.as_deref().unwrap());
    let authenticated = signed_bank_fields(&[("oid", "PAY-H"), ("mdStatus", "1"), ("xid", "XID-H")]);

    let first = h
        .checkout
        .complete(ProviderName::Estpos, &token, authenticated.clone(), CallContext::default())
        .await
        .unwrap();
    assert_eq!(first.status, PaymentStatus::Failed);
    assert_eq!(first.error_code.as_deref(), Some("transport"));
    assert!(first.retryable);

    let second = h
        .checkout
        .complete(ProviderName::Estpos, &token, authenticated, CallContext::default())
        .await
        .unwrap();
    assert_eq!(second.status, PaymentStatus::Successful);
    assert_eq!(h.transport.sent().len(), 4);
}

#[tokio::test]
async fn cancel_without_recorded_reference_makes_no_vendor_call() {
    let h = estpos_harness();

    let err = h
        .checkout
        .cancel(ProviderName::Estpos, "PAY-C", CallContext::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PaymentError::StateError {
            kind: StateErrorKind::MissingReference,
            ..
        }
    ));
    assert!(h.transport.sent().is_empty());
}

#[tokio::test]
async fn cancel_uses_the_reference_recorded_at_charge_time() {
    let h = estpos_harness();
    h.transport
        .reply(200, json!({"Response": "Approved", "Token": "tok_E"}))
        .reply(
            200,
            json!({"Response": "Approved", "ProcReturnCode": "00", "TransId": "T-E", "HostRefNum": "HR-E"}),
        )
        .reply(200, json!({"Response": "Approved", "ProcReturnCode": "00"}));

    h.checkout
        .process(None, payment_request("PAY-E", "10.00", false), CallContext::default())
        .await
        .unwrap();
    let cancelled = h
        .checkout
        .cancel(ProviderName::Estpos, "PAY-E", CallContext::default())
        .await
        .unwrap();

    assert!(cancelled.success);
    assert_eq!(cancelled.status, PaymentStatus::Cancelled);
    let void = &h.transport.sent()[2];
    assert_eq!(void.field("Type").as_deref(), Some("Void"));
    assert_eq!(void.field("HostRefNum").as_deref(), Some("HR-E"));
    assert!(void.idempotent);
}

#[tokio::test]
async fn audit_log_never_holds_the_card_number() {
    let h = estpos_harness();
    h.transport
        .reply(200, json!({"Response": "Approved", "Token": "tok_F"}))
        .reply(200, json!({"Response": "Approved", "ProcReturnCode": "00", "HostRefNum": "HR-F"}));

    h.checkout
        .process(None, payment_request("PAY-F", "5.00", false), CallContext::default())
        .await
        .unwrap();

    for entry in h.audit.entries_for("PAY-F").await {
        let text = entry.payload.to_string();
        assert!(!text.contains("4355084355084358"), "raw PAN in {}", text);
    }
}
