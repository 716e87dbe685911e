mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use bigdecimal::BigDecimal;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use common::{app_state, harness, tip_input, Harness, WEBHOOK_SECRET};
use meridian_core::create_app;
use meridian_core::domain::{Rail, TransactionStatus};
use meridian_core::handlers::auth::{sign_payload, SIGNATURE_HEADER};
use meridian_core::ports::{LedgerStore, WalletStore};

async fn pending_gateway_tx(h: &Harness) -> (Uuid, String, Uuid) {
    let x = Uuid::new_v4();
    let y = Uuid::new_v4();
    let output = h
        .ledger
        .create_transaction(tip_input(x, y, 75, Rail::Gateway))
        .await
        .unwrap();
    let external_id = output.transaction.external_id.clone().unwrap();
    (output.transaction.id, external_id, y)
}

fn signed_webhook(body: &Value) -> Request<Body> {
    let bytes = serde_json::to_vec(body).unwrap();
    let signature = sign_payload(WEBHOOK_SECRET, &bytes);
    Request::builder()
        .method("POST")
        .uri("/webhooks/gateway")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(bytes))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn signed_success_event_completes_the_transaction() {
    let h = harness();
    let app = create_app(app_state(&h));
    let (tx_id, external_id, payee) = pending_gateway_tx(&h).await;

    let payload = json!({
        "event_type": "payment.succeeded",
        "external_id": external_id,
        "amount": "75",
        "currency": "USD",
    });

    let response = app.oneshot(signed_webhook(&payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["received"], json!(true));
    assert_eq!(body["status"], json!("completed"));

    let tx = h.store.get(tx_id).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Completed);
    assert_eq!(
        h.wallet.balance(payee, "USD").await.unwrap(),
        BigDecimal::from(75)
    );
}

#[tokio::test]
async fn bad_signature_is_rejected_before_processing() {
    let h = harness();
    let app = create_app(app_state(&h));
    let (tx_id, external_id, _) = pending_gateway_tx(&h).await;

    let bytes = serde_json::to_vec(&json!({
        "event_type": "payment.succeeded",
        "external_id": external_id,
        "amount": "75",
        "currency": "USD",
    }))
    .unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/gateway")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, sign_payload("wrong-secret", &bytes))
        .body(Body::from(bytes))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let tx = h.store.get(tx_id).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
}

#[tokio::test]
async fn missing_signature_is_rejected() {
    let h = harness();
    let app = create_app(app_state(&h));

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/gateway")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_delivery_acknowledges_without_reapplying() {
    let h = harness();
    let app = create_app(app_state(&h));
    let (_, external_id, payee) = pending_gateway_tx(&h).await;

    let payload = json!({
        "event_type": "payment.succeeded",
        "external_id": external_id,
        "amount": "75",
        "currency": "USD",
    });

    let first = app
        .clone()
        .oneshot(signed_webhook(&payload))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(signed_webhook(&payload)).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let body = body_json(second).await;
    assert_eq!(body["ignored"], json!(true));

    assert_eq!(
        h.wallet.balance(payee, "USD").await.unwrap(),
        BigDecimal::from(75)
    );
}

#[tokio::test]
async fn mismatched_event_returns_conflict_for_operators() {
    let h = harness();
    let app = create_app(app_state(&h));
    let (tx_id, external_id, _) = pending_gateway_tx(&h).await;

    let payload = json!({
        "event_type": "payment.succeeded",
        "external_id": external_id,
        "amount": "70",
        "currency": "USD",
    });

    let response = app.oneshot(signed_webhook(&payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["code"], json!("reconciliation_mismatch"));

    let tx = h.store.get(tx_id).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
}

#[tokio::test]
async fn failure_event_is_applied_over_http() {
    let h = harness();
    let app = create_app(app_state(&h));
    let (tx_id, external_id, _) = pending_gateway_tx(&h).await;

    let payload = json!({
        "event_type": "payment.failed",
        "external_id": external_id,
        "amount": "75",
        "currency": "USD",
        "reason": "insufficient_card_funds",
    });

    let response = app.oneshot(signed_webhook(&payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let tx = h.store.get(tx_id).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Failed);
    assert_eq!(tx.failure_reason.as_deref(), Some("insufficient_card_funds"));
}

#[tokio::test]
async fn unknown_event_type_is_a_validation_error() {
    let h = harness();
    let app = create_app(app_state(&h));

    let payload = json!({
        "event_type": "payment.disputed",
        "external_id": "pi_test_1",
        "amount": "75",
        "currency": "USD",
    });

    let response = app.oneshot(signed_webhook(&payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
