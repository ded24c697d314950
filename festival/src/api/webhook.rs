//! Paystack webhook endpoint.

use crate::constants::PAYSTACK_SIGNATURE_HEADER;
use crate::metrics;
use crate::reconciler::{WebhookEvent, verify_signature};
use crate::server::state::AppState;
use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use festival_web::{AppError, WebResult};
use serde::Serialize;

/// Acknowledgement body.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    /// Always `true`
    pub received: bool,
}

const ACK: WebhookAck = WebhookAck { received: true };

/// `POST /paystack-webhook`
///
/// 401 on a bad signature, 500 on a store fault (the provider redelivers),
/// 200 otherwise, including for events that changed nothing.
pub async fn paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> WebResult<Json<WebhookAck>> {
    if let Some(secret) = &state.webhook_secret {
        let signature = headers
            .get(PAYSTACK_SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if !verify_signature(secret, &body, signature) {
            metrics::record_webhook("bad_signature");
            tracing::warn!("Webhook rejected: signature mismatch");
            return Err(AppError::unauthorized("Invalid signature"));
        }
    }

    let event = match WebhookEvent::parse(&body) {
        Ok(event) => event,
        Err(e) => {
            metrics::record_webhook("malformed");
            tracing::warn!(error = %e, "Unparsable webhook body acknowledged");
            return Ok(Json(ACK));
        }
    };

    let outcome = state.reconciler.reconcile(&event).await.map_err(|e| {
        tracing::error!(event = %event.event, error = %e, "Webhook processing failed");
        AppError::from(e)
    })?;

    tracing::debug!(outcome = outcome.label(), "Webhook processed");
    Ok(Json(ACK))
}
