//! End-to-end HTTP tests: portal link creation, webhook settlement, admin
//! operations and the sandbox checkout routes.
//!
//! This test requires the `sqlite` feature flag.

#![cfg(feature = "sqlite")]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use rentpay_hex::{
    PaymentService, SandboxGateway, ServiceSettings,
    inbound::{HttpServer, SIGNATURE_HEADER},
};
use rentpay_repo::SqliteRepo;
use rentpay_repo::security::sign_webhook;

const WEBHOOK_SECRET: &str = "whsec_test";

async fn create_app() -> Router {
    let repo = SqliteRepo::new("sqlite::memory:").await.unwrap();
    let sandbox = Arc::new(SandboxGateway::new("http://localhost:3000"));
    let settings = ServiceSettings {
        webhook_secret: Some(WEBHOOK_SECRET.into()),
        ..ServiceSettings::default()
    };
    let service = PaymentService::new(repo, sandbox.clone(), settings);
    HttpServer::with_rate_limit(service, 1000)
        .with_sandbox(sandbox)
        .router()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn json_request(method: Method, uri: &str, api_key: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("Authorization", format!("Bearer {}", key));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("Authorization", format!("Bearer {}", key));
    }
    builder.body(Body::empty()).unwrap()
}

async fn bootstrap(app: &Router) -> String {
    let (status, body) = send(
        app,
        json_request(Method::POST, "/api/bootstrap", None, json!({"name": "back-office"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["api_key"].as_str().unwrap().to_string()
}

async fn chf_booking(app: &Router, key: &str) -> String {
    let id = Uuid::new_v4().to_string();
    let (status, body) = send(
        app,
        json_request(
            Method::PUT,
            &format!("/api/admin/bookings/{}", id),
            Some(key),
            json!({
                "amount_total": 100000,
                "currency": "CHF",
                "security_deposit_amount": 50000,
                "payment_amount_percent": "30"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["amount_paid"], 0);
    id
}

async fn portal_card_payment(app: &Router, booking_id: &str) -> Value {
    let (status, body) = send(
        app,
        json_request(
            Method::POST,
            &format!("/api/portal/bookings/{}/payments", booking_id),
            None,
            json!({"payment_intent": "client_payment", "method_type": "visa_mastercard"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body
}

#[tokio::test]
async fn test_admin_routes_require_api_key() {
    let app = create_app().await;

    let (status, _) = send(&app, get("/api/admin/payment-methods", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, get("/api/admin/payment-methods", Some("sk_wrong"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, methods) = send(&app, get("/api/portal/payment-methods", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(methods.as_array().unwrap().len(), 3);

    let key = bootstrap(&app).await;
    let (status, methods) = send(&app, get("/api/admin/payment-methods", Some(&key))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(methods.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_signed_webhook_settles_portal_payment() {
    let app = create_app().await;
    let key = bootstrap(&app).await;
    let booking_id = chf_booking(&app, &key).await;

    let (status, quote) = send(
        &app,
        json_request(
            Method::POST,
            &format!("/api/portal/bookings/{}/quote", booking_id),
            None,
            json!({"payment_intent": "client_payment", "method_type": "visa_mastercard"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quote["total_amount"], 30870);

    let payment = portal_card_payment(&app, &booking_id).await;
    assert_eq!(payment["payment_link_status"], "active");
    assert_eq!(payment["total_amount"], quote["total_amount"]);
    let session_id = payment["gateway_session_id"].as_str().unwrap();

    let body = json!({
        "entityId": session_id,
        "state": "COMPLETED",
        "eventTimestamp": "2026-03-01T10:00:00Z"
    })
    .to_string();

    let unsigned = Request::builder()
        .method(Method::POST)
        .uri("/api/webhooks/gateway")
        .body(Body::from(body.clone()))
        .unwrap();
    let (status, _) = send(&app, unsigned).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let signed = |body: &str| {
        Request::builder()
            .method(Method::POST)
            .uri("/api/webhooks/gateway")
            .header(SIGNATURE_HEADER, sign_webhook(body.as_bytes(), WEBHOOK_SECRET))
            .body(Body::from(body.to_string()))
            .unwrap()
    };
    let (status, ack) = send(&app, signed(&body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "APPLIED");

    let (status, ack) = send(&app, signed(&body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "IGNORED");

    let (_, booking) = send(
        &app,
        get(&format!("/api/admin/bookings/{}", booking_id), Some(&key)),
    )
    .await;
    assert_eq!(booking["amount_paid"], 30870);

    let (status, events) = send(
        &app,
        get("/api/admin/gateway-events?status=IGNORED", Some(&key)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(events.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancelling_paid_payment_reports_conflict() {
    let app = create_app().await;
    let key = bootstrap(&app).await;
    let booking_id = chf_booking(&app, &key).await;
    let payment = portal_card_payment(&app, &booking_id).await;
    let session_id = payment["gateway_session_id"].as_str().unwrap();

    let complete = format!("/api/admin/sandbox/checkouts/{}/complete", session_id);
    let (status, _) = send(&app, json_request(Method::POST, &complete, None, Value::Null)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, paid) = send(
        &app,
        json_request(Method::POST, &complete, Some(&key), Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["payment_link_status"], "paid");

    let payment_id = payment["id"].as_str().unwrap();
    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            &format!("/api/admin/payments/{}/cancel", payment_id),
            Some(&key),
            Value::Null,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["current"], "paid");
    assert_eq!(body["requested"], "cancelled");
}

#[tokio::test]
async fn test_security_deposit_hold_lifecycle() {
    let app = create_app().await;
    let key = bootstrap(&app).await;
    let booking_id = chf_booking(&app, &key).await;

    let (status, created) = send(
        &app,
        json_request(
            Method::POST,
            &format!("/api/admin/bookings/{}/security-deposit", booking_id),
            Some(&key),
            json!({"expires_in_hours": 168}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    assert_eq!(created["authorization"]["status"], "pending");
    assert_eq!(created["payment"]["payment_intent"], "security_deposit");

    let session_id = created["payment"]["gateway_session_id"].as_str().unwrap();
    let (status, _) = send(
        &app,
        json_request(
            Method::POST,
            &format!("/api/admin/sandbox/checkouts/{}/complete", session_id),
            Some(&key),
            Value::Null,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, overview) = send(
        &app,
        get(&format!("/api/admin/bookings/{}/security-deposit", booking_id), Some(&key)),
    )
    .await;
    assert_eq!(overview["current"]["status"], "authorized");
    assert_eq!(overview["current_payment_status"], "paid");
    let authorization_id = overview["current"]["id"].as_str().unwrap();

    let (status, captured) = send(
        &app,
        json_request(
            Method::POST,
            &format!("/api/admin/security-deposits/{}/capture", authorization_id),
            Some(&key),
            json!({"amount": 12000, "reason": "Fuel not refilled"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", captured);
    assert_eq!(captured["status"], "captured");
    assert_eq!(captured["captured_amount"], 12000);
}

#[tokio::test]
async fn test_gateway_refusal_is_bad_gateway() {
    let repo = SqliteRepo::new("sqlite::memory:").await.unwrap();
    let sandbox = Arc::new(SandboxGateway::new("http://localhost:3000"));
    let service = PaymentService::new(repo, sandbox.clone(), ServiceSettings::default());
    let app = HttpServer::with_rate_limit(service, 1000).router();

    let key = bootstrap(&app).await;
    let booking_id = chf_booking(&app, &key).await;
    sandbox.reject_next("Merchant account suspended");

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            &format!("/api/portal/bookings/{}/payments", booking_id),
            None,
            json!({"payment_intent": "client_payment", "method_type": "amex"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Merchant account suspended");

    // The sandbox routes are off unless the server was given the sandbox
    let (status, _) = send(
        &app,
        json_request(
            Method::POST,
            "/api/admin/sandbox/checkouts/sess_x/complete",
            Some(&key),
            Value::Null,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // and never public outside the admin tree
    let (status, _) = send(
        &app,
        json_request(Method::POST, "/sandbox/checkouts/sess_x/complete", None, Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_openapi_document_served() {
    let app = create_app().await;
    let (status, doc) = send(&app, get("/api-docs/openapi.json", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/webhooks/gateway"].is_object());
}
