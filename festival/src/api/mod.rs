//! HTTP handlers.
//!
//! - `POST /register`, `POST /login`, `GET /me`
//! - `POST /pay-coins`, `POST /buy-ticket`
//! - `POST /paystack-webhook`
//! - `POST /verify-ticket`

#![allow(clippy::missing_errors_doc)] // handlers fail with AppError

pub mod accounts;
pub mod payments;
pub mod tickets;
pub mod webhook;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use festival_web::{AppError, WebResult};

/// Unwrap a JSON body, turning axum's rejection into a JSON 400.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> WebResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}
