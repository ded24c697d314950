//! Request extractors shared by the festival handlers.
//!
//! - [`BearerToken`]: raw token from `Authorization: Bearer <token>`.

use crate::error::AppError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Bearer token extracted from `Authorization: Bearer <token>`.
///
/// Rejects with 401 when the header is missing or malformed. Use
/// [`BearerToken::from_parts_optional`] when the token is optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken(pub String);

impl BearerToken {
    /// Parse the token if an `Authorization` header is present.
    ///
    /// Returns `Ok(None)` when no header was sent at all.
    ///
    /// # Errors
    ///
    /// Returns 401 when a header is present but is not a non-empty bearer token.
    pub fn from_parts_optional(parts: &Parts) -> Result<Option<Self>, AppError> {
        let Some(value) = parts.headers.get(axum::http::header::AUTHORIZATION) else {
            return Ok(None);
        };

        let header = value
            .to_str()
            .map_err(|_| AppError::unauthorized("Invalid authorization header"))?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::unauthorized("Invalid authorization format. Expected 'Bearer <token>'")
        })?;

        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::unauthorized("Empty bearer token"));
        }

        Ok(Some(Self(token.to_string())))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_parts_optional(parts)?
            .ok_or_else(|| AppError::unauthorized("Missing authorization header"))
    }
}
