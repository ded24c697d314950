//! Session extractors.
//!
//! - [`SessionClaims`]: requires a valid bearer token.
//! - [`MaybeSession`]: accepts a request without `Authorization`, but rejects
//!   a token that is present and invalid.

use crate::credentials::Claims;
use crate::server::state::AppState;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use festival_web::{AppError, BearerToken};

/// Claims of a verified session token.
#[derive(Debug, Clone)]
pub struct SessionClaims(pub Claims);

#[async_trait]
impl FromRequestParts<AppState> for SessionClaims {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let bearer = BearerToken::from_request_parts(parts, state).await?;
        let claims = state.credentials.verify_token(&bearer.0)?;
        Ok(Self(claims))
    }
}

/// Claims of a verified session token, if one was sent.
#[derive(Debug, Clone)]
pub struct MaybeSession(pub Option<Claims>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(bearer) = BearerToken::from_parts_optional(parts)? else {
            return Ok(Self(None));
        };
        let claims = state.credentials.verify_token(&bearer.0)?;
        Ok(Self(Some(claims)))
    }
}
