//! Shared setup for integration tests.

#![allow(dead_code)] // not every test binary uses every helper
#![allow(clippy::expect_used)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use festival::config::{
    AuthConfig, Config, DatabaseConfig, PaystackConfig, ServerConfig, StoreBackend,
};
use festival::payment_gateway::MockPaymentGateway;
use festival::store::{
    AccountStore, EventEffect, InMemoryAccountStore, Redemption, ReferralCredit, StoreError,
    StoreFuture,
};
use festival::types::{Account, PendingTransaction, TicketTier};
use festival::{AppState, build_router};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha512;
use std::sync::Arc;
use tower::ServiceExt;

pub const WEBHOOK_SECRET: &str = "sk_test_secret";

/// Test configuration: memory store, cheap bcrypt, signature checks on.
pub fn test_config() -> Config {
    Config {
        database: DatabaseConfig {
            backend: StoreBackend::Memory,
            url: String::new(),
            max_connections: 1,
            connect_timeout: 1,
            statement_timeout: 1,
            run_migrations: false,
        },
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            metrics_host: "127.0.0.1".to_string(),
            metrics_port: 0,
            shutdown_timeout: 1,
        },
        auth: AuthConfig {
            jwt_secret: "integration-secret".to_string(),
            session_ttl: 3600,
            bcrypt_cost: 4,
        },
        paystack: PaystackConfig {
            secret_key: WEBHOOK_SECRET.to_string(),
            base_url: "http://paystack.invalid".to_string(),
            callback_url: None,
            timeout: 1,
            verify_signature: true,
        },
    }
}

/// A router over a fresh in-memory store and mock gateway.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryAccountStore>,
    pub gateway: MockPaymentGateway,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_gateway(MockPaymentGateway::new())
    }

    pub fn with_gateway(gateway: MockPaymentGateway) -> Self {
        let store = Arc::new(InMemoryAccountStore::new());
        let state = AppState::new(store.clone(), Arc::new(gateway.clone()), &test_config());
        Self {
            router: build_router(state),
            store,
            gateway,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        send(&self.router, request).await
    }

    pub async fn post_json(&self, uri: &str, body: &Value, token: Option<&str>) -> (u16, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let response = self
            .send(builder.body(Body::from(body.to_string())).expect("valid request"))
            .await;
        split(response).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (u16, Value) {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let response = self
            .send(builder.body(Body::empty()).expect("valid request"))
            .await;
        split(response).await
    }

    /// Deliver a signed webhook.
    pub async fn webhook(&self, body: &Value) -> (u16, Value) {
        split(self.send(signed_webhook(&body.to_string())).await).await
    }

    pub async fn register(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .post_json(
                "/register",
                &serde_json::json!({ "email": email, "password": password }),
                None,
            )
            .await;
        assert_eq!(status, 201, "register failed: {body}");
        body["referralCode"].as_str().expect("referral code").to_string()
    }

    pub async fn login(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .post_json(
                "/login",
                &serde_json::json!({ "email": email, "password": password }),
                None,
            )
            .await;
        assert_eq!(status, 200, "login failed: {body}");
        body["token"].as_str().expect("token").to_string()
    }
}

/// A router over `store` and a default mock gateway.
pub fn router_over(store: Arc<dyn AccountStore>) -> Router {
    let state = AppState::new(store, Arc::new(MockPaymentGateway::new()), &test_config());
    build_router(state)
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router
        .clone()
        .oneshot(request)
        .await
        .expect("router is infallible")
}

/// A webhook request carrying `raw` verbatim, signed with the test secret.
pub fn signed_webhook(raw: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/paystack-webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-paystack-signature", sign(raw.as_bytes()))
        .body(Body::from(raw.to_string()))
        .expect("valid request")
}

pub async fn split(response: Response<Body>) -> (u16, Value) {
    let status = response.status().as_u16();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, body)
}

/// Hex HMAC-SHA512 of `body` under the test secret.
pub fn sign(body: &[u8]) -> String {
    let mut mac = Hmac::<Sha512>::new_from_slice(WEBHOOK_SECRET.as_bytes()).expect("any key length");
    mac.update(body);
    mac.finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// A `charge.success` envelope.
pub fn charge_success(email: &str, metadata: Value) -> Value {
    serde_json::json!({
        "event": "charge.success",
        "data": {
            "reference": format!("ref_{}", uuid::Uuid::new_v4().simple()),
            "amount": 50_000,
            "customer": { "email": email },
            "metadata": metadata
        }
    })
}

/// A store whose backend is gone: every call fails as unreachable.
pub struct DownStore;

fn down<'a, T: Send + 'a>() -> StoreFuture<'a, T> {
    Box::pin(std::future::ready(Err(StoreError::Unavailable(
        "connection refused".to_string(),
    ))))
}

impl AccountStore for DownStore {
    fn insert_account(&self, _: &Account) -> StoreFuture<'_, ()> {
        down()
    }

    fn find_by_email(&self, _: &str) -> StoreFuture<'_, Option<Account>> {
        down()
    }

    fn credit_referrer(&self, _: &str, _: u64, _: u32) -> StoreFuture<'_, ReferralCredit> {
        down()
    }

    fn credit_coins(&self, _: &str, _: u64) -> StoreFuture<'_, Option<u64>> {
        down()
    }

    fn issue_ticket(&self, _: &str, _: TicketTier, _: &str) -> StoreFuture<'_, bool> {
        down()
    }

    fn redeem_ticket(&self, _: &str) -> StoreFuture<'_, Redemption> {
        down()
    }

    fn record_transaction(&self, _: &PendingTransaction) -> StoreFuture<'_, ()> {
        down()
    }

    fn complete_transaction(&self, _: &str) -> StoreFuture<'_, bool> {
        down()
    }

    fn find_transaction(&self, _: &str) -> StoreFuture<'_, Option<PendingTransaction>> {
        down()
    }

    fn claim_event(&self, _: &str, _: EventEffect) -> StoreFuture<'_, bool> {
        down()
    }

    fn release_event(&self, _: &str, _: EventEffect) -> StoreFuture<'_, ()> {
        down()
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        down()
    }
}
