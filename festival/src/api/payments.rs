//! Checkout endpoints.
//!
//! The payer is the session's email when a valid bearer token is sent, else
//! the body's `email`. A token that is sent but invalid is rejected.

use super::json_body;
use crate::auth::MaybeSession;
use crate::server::state::AppState;
use axum::{Json, extract::State, extract::rejection::JsonRejection};
use festival_web::{AppError, WebResult};
use serde::Deserialize;
use serde_json::Value;

/// Coin purchase request.
#[derive(Debug, Deserialize)]
pub struct PayCoinsRequest {
    /// Payer email when no session is sent
    pub email: Option<String>,
    /// Coins to credit on success
    pub coins: u64,
    /// Price in major currency units
    pub amount: u64,
}

/// Ticket purchase request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyTicketRequest {
    /// Payer email when no session is sent
    pub email: Option<String>,
    /// Tier name (`silver` or `gold`)
    pub ticket_type: String,
}

fn payer(session: MaybeSession, email: Option<String>) -> WebResult<String> {
    session
        .0
        .map(|claims| claims.email)
        .or(email)
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("Email is required"))
}

/// `POST /pay-coins`: returns the provider's checkout `data`.
pub async fn pay_coins(
    State(state): State<AppState>,
    session: MaybeSession,
    payload: Result<Json<PayCoinsRequest>, JsonRejection>,
) -> WebResult<Json<Value>> {
    let request = json_body(payload)?;
    let email = payer(session, request.email)?;

    let checkout = state
        .checkout
        .create_coin_checkout(&email, request.coins, request.amount)
        .await?;

    Ok(Json(checkout.data))
}

/// `POST /buy-ticket`: returns the provider's checkout `data`.
pub async fn buy_ticket(
    State(state): State<AppState>,
    session: MaybeSession,
    payload: Result<Json<BuyTicketRequest>, JsonRejection>,
) -> WebResult<Json<Value>> {
    let request = json_body(payload)?;
    let email = payer(session, request.email)?;

    let checkout = state
        .checkout
        .create_ticket_checkout(&email, &request.ticket_type)
        .await?;

    Ok(Json(checkout.data))
}
