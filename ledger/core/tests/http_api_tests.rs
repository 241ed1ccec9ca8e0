// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP adapter tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use bastion_ledger_core::application::issuer::{encode_receipt_batch, CapabilityIssuer, ReceiptIssuer};
use bastion_ledger_core::application::runtime::{LedgerRuntime, SigningKeys};
use bastion_ledger_core::domain::ledger_config::LedgerConfigManifest;
use bastion_ledger_core::domain::signing::PayloadSigner;
use bastion_ledger_core::infrastructure::crypto::HmacSha256Signer;
use bastion_ledger_core::presentation::api::{
    router, ApiState, ACCESS_RECEIPTS_HEADER, PF_SIGNATURE_HEADER, REQUEST_ID_HEADER,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

const CAPABILITY_KEY: &[u8] = b"http-capability-key-0123456789abcdef";
const RECEIPT_KEY: &[u8] = b"http-receipt-key-0123456789abcdefghi";
const LEDGER_KEY: &[u8] = b"http-ledger-key-0123456789abcdefghij";

fn app_with(config: LedgerConfigManifest) -> Router {
    let runtime = LedgerRuntime::with_keys(
        config,
        SigningKeys {
            capability: CAPABILITY_KEY.to_vec(),
            receipt: RECEIPT_KEY.to_vec(),
            ledger: LEDGER_KEY.to_vec(),
        },
    )
    .unwrap();
    router(Arc::new(ApiState::from_runtime(&runtime)))
}

fn app() -> Router {
    app_with(LedgerConfigManifest::default())
}

fn signer(key: &[u8]) -> Arc<dyn PayloadSigner> {
    Arc::new(HmacSha256Signer::new(key.to_vec()).unwrap())
}

fn token(tenant: &str) -> String {
    CapabilityIssuer::new(signer(CAPABILITY_KEY))
        .issue(tenant, "auditor-1", ["ledger.write"], Duration::minutes(5))
        .unwrap()
        .token
}

fn receipts(tenant: &str) -> String {
    let receipt = ReceiptIssuer::new(signer(RECEIPT_KEY))
        .issue_at(tenant, "data_retrieval", "shard-1", "q", &json!([]), Duration::days(2), Utc::now())
        .unwrap();
    encode_receipt_batch(&[receipt]).unwrap()
}

fn bundle_body(tenant: &str, receipts: Value) -> Value {
    json!({
        "session_id": "sess-http",
        "tenant": tenant,
        "journey": "incident-review",
        "plan": {
            "id": "plan-http",
            "steps": [
                { "id": "s1", "type": "retrieve", "capability": "crm.read", "status": "completed" }
            ],
            "metadata": {}
        },
        "receipts": receipts,
        "traces": [
            { "id": "t1", "tool_call_id": "s1", "timestamp": Utc::now() }
        ]
    })
}

fn authed(method: Method, uri: &str, tenant: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(PF_SIGNATURE_HEADER, token(tenant))
        .header(REQUEST_ID_HEADER, "req-test-1");
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn create_bundle(app: &Router, tenant: &str) -> Value {
    let receipts: Value = serde_json::from_str(&receipts(tenant)).unwrap();
    let response = app
        .clone()
        .oneshot(authed(Method::POST, "/api/v1/bundles", tenant, Some(bundle_body(tenant, receipts))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await
}

#[tokio::test]
async fn health_is_unguarded() {
    let response = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");
}

#[tokio::test]
async fn missing_signature_returns_envelope() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/api/v1/stats")
                .header(REQUEST_ID_HEADER, "req-abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-abc");

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "PF_SIG_MISSING");
    assert_eq!(body["request_id"], "req-abc");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn invalid_receipt_header_is_rejected() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/api/v1/stats")
                .header(PF_SIGNATURE_HEADER, token("acme"))
                .header(ACCESS_RECEIPTS_HEADER, receipts("globex"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["error"]["code"], "ACCESS_RECEIPT_INVALID");
}

#[tokio::test]
async fn rate_limit_returns_429_with_retry_after() {
    let mut config = LedgerConfigManifest::default();
    config.spec.rate_limit.max_requests = 2;
    let app = app_with(config);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(authed(Method::GET, "/api/v1/stats", "acme", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app
        .oneshot(authed(Method::GET, "/api/v1/stats", "acme", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    let body = json_body(response).await;
    assert_eq!(body["error"]["details"]["tenant"], "acme");
    assert_eq!(body["error"]["details"]["limit"], 2);
}

#[tokio::test]
async fn bundle_lifecycle_over_http() {
    let app = app();
    let created = create_bundle(&app, "acme").await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["verification_status"], "pending");

    let response = app
        .clone()
        .oneshot(authed(Method::POST, &format!("/api/v1/bundles/{id}/verify"), "acme", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-test-1");
    assert!(response.headers().contains_key("x-ratelimit-remaining"));
    let report = json_body(response).await;
    assert_eq!(report["verified"], true);

    let response = app
        .clone()
        .oneshot(authed(Method::GET, &format!("/api/v1/bundles/{id}/export?format=tar"), "acme", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/x-tar");

    let response = app
        .clone()
        .oneshot(authed(Method::GET, "/api/v1/bundles?session_id=sess-http", "acme", None))
        .await
        .unwrap();
    let listed = json_body(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(authed(Method::GET, "/api/v1/stats", "acme", None))
        .await
        .unwrap();
    let stats = json_body(response).await;
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["verified"], 1);
}

#[tokio::test]
async fn other_tenants_bundles_are_not_found() {
    let app = app();
    let created = create_bundle(&app, "acme").await;
    let id = created["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(authed(Method::GET, &format!("/api/v1/bundles/{id}"), "globex", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(authed(Method::GET, "/api/v1/bundles?session_id=sess-http", "globex", None))
        .await
        .unwrap();
    assert!(json_body(response).await.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn creating_bundle_for_another_tenant_is_forbidden() {
    let response = app()
        .oneshot(authed(
            Method::POST,
            "/api/v1/bundles",
            "acme",
            Some(bundle_body("globex", json!([]))),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["error"]["code"], "TENANT_MISMATCH");
}

#[tokio::test]
async fn failing_bundle_export_is_conflict() {
    let app = app();
    let response = app
        .clone()
        .oneshot(authed(Method::POST, "/api/v1/bundles", "acme", Some(bundle_body("acme", json!([])))))
        .await
        .unwrap();
    let created = json_body(response).await;
    let id = created["id"].as_str().unwrap();

    let response = app
        .oneshot(authed(Method::GET, &format!("/api/v1/bundles/{id}/export"), "acme", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["error"]["details"]["errors"][0], "Missing required components");
}

#[tokio::test]
async fn forged_or_foreign_body_receipts_are_rejected() {
    let app = app();
    let mut forged: Value = serde_json::from_str(&receipts("acme")).unwrap();
    forged[0]["signature"] = json!("FORGED");
    let response = app
        .clone()
        .oneshot(authed(Method::POST, "/api/v1/bundles", "acme", Some(bundle_body("acme", forged))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "ACCESS_RECEIPT_INVALID");
    assert_eq!(body["error"]["message"], "Invalid signature");
    assert_eq!(body["error"]["details"]["receipt_index"], 0);

    let mut foreign: Value = serde_json::from_str(&receipts("globex")).unwrap();
    foreign[0]["signature"] = json!("FORGED");
    let response = app
        .clone()
        .oneshot(authed(Method::POST, "/api/v1/bundles", "acme", Some(bundle_body("acme", foreign))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["error"]["code"], "ACCESS_RECEIPT_INVALID");

    let response = app
        .oneshot(authed(Method::GET, "/api/v1/bundles", "acme", None))
        .await
        .unwrap();
    assert!(json_body(response).await.as_array().unwrap().is_empty());
}
