//! Router configuration.

use super::health::{health_check, readiness_check, root};
use super::state::AppState;
use crate::api::{accounts, payments, tickets, webhook};
use axum::{
    Router,
    routing::{get, post},
};
use festival_web::correlation_id_layer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Liveness and readiness (no authentication)
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Accounts
        .route("/register", post(accounts::register))
        .route("/login", post(accounts::login))
        .route("/me", get(accounts::me))
        // Checkout
        .route("/pay-coins", post(payments::pay_coins))
        .route("/buy-ticket", post(payments::buy_ticket))
        // Provider callback (signature-checked)
        .route("/paystack-webhook", post(webhook::paystack_webhook))
        // Gate
        .route("/verify-ticket", post(tickets::verify_ticket))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(correlation_id_layer())
}
