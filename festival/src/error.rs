//! Service error taxonomy and its HTTP mapping.

use crate::payment_gateway::GatewayError;
use crate::store::{StoreError, UniqueField};
use festival_web::AppError;
use thiserror::Error;

/// Errors surfaced by the festival services.
#[derive(Debug, Error)]
pub enum FestivalError {
    /// Identity already registered.
    #[error("{0}")]
    Conflict(String),

    /// Account or ticket not found.
    #[error("{0}")]
    NotFound(String),

    /// Bad credentials or token.
    #[error("{0}")]
    Unauthorized(String),

    /// Ticket was already redeemed.
    #[error("Ticket already used")]
    AlreadyUsed,

    /// Malformed or out-of-range input.
    #[error("{0}")]
    InvalidArgument(String),

    /// Payment provider call failed.
    #[error("payment provider error: {0}")]
    UpstreamFailure(#[from] GatewayError),

    /// Store or hashing failure.
    #[error("internal error: {0}")]
    InternalFault(String),
}

impl From<StoreError> for FestivalError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Duplicate {
                field: UniqueField::Email,
            } => Self::Conflict("User already exists".to_string()),
            other => Self::InternalFault(other.to_string()),
        }
    }
}

impl From<FestivalError> for AppError {
    fn from(error: FestivalError) -> Self {
        match error {
            FestivalError::Conflict(message) => Self::conflict(message),
            FestivalError::NotFound(message) => Self::not_found(message),
            FestivalError::Unauthorized(message) => Self::unauthorized(message),
            FestivalError::AlreadyUsed => Self::already_used("Ticket already used"),
            FestivalError::InvalidArgument(message) => Self::bad_request(message),
            FestivalError::UpstreamFailure(source) => {
                Self::upstream("Payment provider error").with_source(source)
            }
            FestivalError::InternalFault(detail) => {
                Self::internal("Server error").with_source(anyhow::anyhow!(detail))
            }
        }
    }
}
