//! End-to-end tests for the ingress router: auth, rate limiting and the
//! bundle endpoints wired together.

use std::sync::Arc;

use alloy_consensus::{Signed, TxEip1559, TxEnvelope};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{hex, PrimitiveSignature, B256, U256};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use sequencer_ingress::auth::UserStore;
use sequencer_ingress::rate_limit::RateLimits;
use sequencer_ingress::server::{router, AppState};
use sequencer_operations::MetricsRegistry;
use sequencer_pool::{new_shared_pool, SortPolicy};

fn test_router(per_client_rate_limit: u32) -> Router {
    let mut users = UserStore::new(b"integration-key".to_vec());
    users.insert_user("user1", "pw", &["user"]);
    users.insert_user("admin", "pw", &["admin"]);

    let state = AppState::new(
        new_shared_pool(SortPolicy::BlockNumber),
        Arc::new(users),
        Arc::new(RateLimits::new(per_client_rate_limit, 100_000)),
        Some(Arc::new(MetricsRegistry::new())),
    );
    router(state)
}

fn raw_tx(gas_limit: u64) -> String {
    let tx = TxEip1559 {
        chain_id: 1,
        gas_limit,
        ..Default::default()
    };
    let signature = PrimitiveSignature::new(U256::from(1), U256::from(1), false);
    let envelope = TxEnvelope::Eip1559(Signed::new_unchecked(
        tx,
        signature,
        B256::repeat_byte(0x11),
    ));
    format!("0x{}", hex::encode(envelope.encoded_2718()))
}

fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn login(app: &Router, username: &str, password: &str) -> String {
    let response = app
        .clone()
        .oneshot(post(
            "/sequencer/login",
            None,
            json!({ "username": username, "password": password }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_login_then_send_and_cancel() {
    let app = test_router(1000);
    let token = login(&app, "user1", "pw").await;

    let send = post(
        "/sequencer/eth_sendBundle",
        Some(&token),
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_sendBundle",
            "params": [{
                "txs": [raw_tx(30_000)],
                "blockNumber": "0x10",
                "replacementUuid": "e2e-1",
            }],
        }),
    );
    let response = app.clone().oneshot(send).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let reply = body_json(response).await;
    assert_eq!(reply["processedBundles"], json!(["e2e-1"]));

    let cancel = post(
        "/sequencer/eth_cancelBundle",
        Some(&token),
        json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "eth_cancelBundle",
            "params": [{ "replacementUuid": "e2e-1" }],
        }),
    );
    let response = app.clone().oneshot(cancel).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let reply = body_json(response).await;
    assert_eq!(reply["result"], "All bundles canceled successfully");
}

#[tokio::test]
async fn test_bundle_endpoints_require_token() {
    let app = test_router(1000);

    let response = app
        .clone()
        .oneshot(post(
            "/sequencer/eth_sendBundle",
            None,
            json!({ "jsonrpc": "2.0", "id": 1, "method": "eth_sendBundle", "params": [] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(post(
            "/sequencer/eth_sendBundle",
            Some("garbage-token"),
            json!({ "jsonrpc": "2.0", "id": 1, "method": "eth_sendBundle", "params": [] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_role_without_user_is_forbidden() {
    let app = test_router(1000);
    let admin_token = login(&app, "admin", "pw").await;

    let response = app
        .clone()
        .oneshot(post(
            "/sequencer/eth_sendBundle",
            Some(&admin_token),
            json!({ "jsonrpc": "2.0", "id": 1, "method": "eth_sendBundle", "params": [] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let app = test_router(1000);

    let response = app
        .clone()
        .oneshot(post(
            "/sequencer/login",
            None,
            json!({ "username": "user1", "password": "wrong" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_is_open() {
    let app = test_router(1000);

    let request = Request::builder()
        .method("GET")
        .uri("/sequencer/health")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"Service is healthy");
}

#[tokio::test]
async fn test_rate_limit_applies_to_open_routes() {
    let app = test_router(2);

    for _ in 0..2 {
        let request = Request::builder()
            .method("GET")
            .uri("/sequencer/health")
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let request = Request::builder()
        .method("GET")
        .uri("/sequencer/health")
        .header("x-forwarded-for", "203.0.113.7")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_metrics_endpoint_serves_registry() {
    let app = test_router(1000);

    let request = Request::builder()
        .method("GET")
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("sequencer_pool_live_bundles"));
}
