//! Gate verification endpoint.

use super::json_body;
use crate::server::state::AppState;
use crate::types::TicketTier;
use axum::{Json, extract::State, extract::rejection::JsonRejection};
use festival_web::WebResult;
use serde::{Deserialize, Serialize};

/// Verification request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTicketRequest {
    /// Code printed on the ticket
    #[serde(default)]
    pub ticket_code: String,
}

/// Verification response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTicketResponse {
    /// Confirmation
    pub message: String,
    /// Tier of the redeemed ticket
    pub ticket_type: TicketTier,
}

/// `POST /verify-ticket`
pub async fn verify_ticket(
    State(state): State<AppState>,
    payload: Result<Json<VerifyTicketRequest>, JsonRejection>,
) -> WebResult<Json<VerifyTicketResponse>> {
    let request = json_body(payload)?;
    let tier = state.verifier.verify(&request.ticket_code).await?;

    Ok(Json(VerifyTicketResponse {
        message: "Ticket valid".to_string(),
        ticket_type: tier,
    }))
}
