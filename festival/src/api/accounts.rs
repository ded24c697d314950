//! Registration, login and profile endpoints.

use super::json_body;
use crate::auth::SessionClaims;
use crate::server::state::AppState;
use crate::types::AccountProfile;
use axum::{Json, extract::State, extract::rejection::JsonRejection, http::StatusCode};
use festival_web::{AppError, WebResult};
use serde::{Deserialize, Serialize};

/// Registration request. The identity may be sent as `email` or `username`.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    /// Email identity
    pub email: Option<String>,
    /// Legacy name for the email identity
    pub username: Option<String>,
    /// Plain-text password
    #[serde(default)]
    pub password: String,
    /// Referrer's code
    #[serde(alias = "referralCode")]
    pub referral: Option<String>,
}

/// Registration response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    /// Confirmation
    pub message: String,
    /// The new account's referral code
    pub referral_code: String,
}

/// Login request. The identity may be sent as `identity`, `email` or `username`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Identity
    pub identity: Option<String>,
    /// Email identity
    pub email: Option<String>,
    /// Legacy name for the email identity
    pub username: Option<String>,
    /// Plain-text password
    #[serde(default)]
    pub password: String,
}

/// Login response.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Session token (HS256 JWT)
    pub token: String,
}

/// `POST /register`
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> WebResult<(StatusCode, Json<RegisterResponse>)> {
    let request = json_body(payload)?;
    let identity = request
        .email
        .or(request.username)
        .ok_or_else(|| AppError::bad_request("Email is required"))?;

    let registration = state
        .credentials
        .register(&identity, &request.password, request.referral.as_deref())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registered successfully".to_string(),
            referral_code: registration.referral_code,
        }),
    ))
}

/// `POST /login`
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> WebResult<Json<LoginResponse>> {
    let request = json_body(payload)?;
    let identity = request
        .identity
        .or(request.email)
        .or(request.username)
        .ok_or_else(|| AppError::bad_request("Email is required"))?;

    let token = state.credentials.login(&identity, &request.password).await?;
    Ok(Json(LoginResponse { token }))
}

/// `GET /me`
pub async fn me(
    State(state): State<AppState>,
    SessionClaims(claims): SessionClaims,
) -> WebResult<Json<AccountProfile>> {
    let account = state.credentials.account(&claims.email).await?;
    Ok(Json(account.into()))
}
