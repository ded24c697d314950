//! Hosted-checkout payment provider.
//!
//! [`PaymentGateway`] opens a checkout session and hands back the provider's
//! `data` object untouched. [`PaystackClient`] talks to the Paystack REST API;
//! [`MockPaymentGateway`] records requests in memory for development and tests.

use crate::types::TicketTier;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Payment gateway result
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Boxed future returned by gateway calls.
pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = GatewayResult<T>> + Send + 'a>>;

/// Errors from the payment provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The provider did not answer within the configured timeout.
    #[error("payment provider timed out")]
    Timeout,

    /// Transport failure.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// The provider answered with an error.
    #[error("provider rejected request (status {status}): {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Provider message
        message: String,
    },

    /// The provider answered with something we could not read.
    #[error("response parsing failed: {0}")]
    ResponseParseFailed(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::RequestFailed(error.to_string())
        }
    }
}

/// Purchase metadata echoed back by the provider in the webhook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutMetadata {
    /// Coins to credit on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coins: Option<u64>,
    /// Ticket tier to issue on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_type: Option<TicketTier>,
}

/// Body of a transaction initialization call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutRequest {
    /// Payer email.
    pub email: String,
    /// Amount in minor units (kobo).
    #[serde(rename = "amount")]
    pub amount_minor: u64,
    /// Fulfillment metadata.
    pub metadata: CheckoutMetadata,
}

/// An opened checkout session.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSession {
    /// Provider reference, when the provider returned one.
    pub reference: Option<String>,
    /// Provider `data` object (authorization URL, access code, reference).
    pub data: Value,
}

impl CheckoutSession {
    fn from_data(data: Value) -> Self {
        let reference = data
            .get("reference")
            .and_then(Value::as_str)
            .map(str::to_string);
        Self { reference, data }
    }
}

/// Payment provider abstraction.
pub trait PaymentGateway: Send + Sync {
    /// Open a hosted checkout session.
    ///
    /// # Errors
    ///
    /// Returns error on timeout, transport failure or provider rejection.
    fn initialize_transaction(&self, request: CheckoutRequest) -> GatewayFuture<'_, CheckoutSession>;
}

#[derive(Debug, Serialize)]
struct InitializeBody<'a> {
    #[serde(flatten)]
    request: &'a CheckoutRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PaystackEnvelope {
    status: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Value,
}

/// Paystack REST client.
#[derive(Clone, Debug)]
pub struct PaystackClient {
    client: Client,
    secret_key: String,
    base_url: String,
    callback_url: Option<String>,
}

impl PaystackClient {
    /// Create a client with a request timeout.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(
        secret_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::RequestFailed(format!("failed to build client: {e}")))?;

        Ok(Self {
            client,
            secret_key: secret_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            callback_url: None,
        })
    }

    /// Redirect target after payment.
    #[must_use]
    pub fn with_callback_url(mut self, callback_url: Option<String>) -> Self {
        self.callback_url = callback_url;
        self
    }

    async fn initialize(&self, request: CheckoutRequest) -> GatewayResult<CheckoutSession> {
        let body = InitializeBody {
            request: &request,
            callback_url: self.callback_url.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status != StatusCode::OK {
            let message = serde_json::from_str::<PaystackEnvelope>(&text)
                .map(|envelope| envelope.message)
                .unwrap_or(text);
            tracing::warn!(status = status.as_u16(), message = %message, "Paystack rejected initialization");
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: PaystackEnvelope = serde_json::from_str(&text)
            .map_err(|e| GatewayError::ResponseParseFailed(e.to_string()))?;

        if !envelope.status {
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message: envelope.message,
            });
        }

        Ok(CheckoutSession::from_data(envelope.data))
    }
}

impl PaymentGateway for PaystackClient {
    fn initialize_transaction(&self, request: CheckoutRequest) -> GatewayFuture<'_, CheckoutSession> {
        Box::pin(self.initialize(request))
    }
}

/// In-memory gateway that records requests and returns synthetic sessions.
#[derive(Clone, Debug, Default)]
pub struct MockPaymentGateway {
    requests: Arc<Mutex<Vec<CheckoutRequest>>>,
    failure: Option<GatewayError>,
}

impl MockPaymentGateway {
    /// Gateway that always opens a session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway that always fails with `error`.
    #[must_use]
    pub fn failing(error: GatewayError) -> Self {
        Self {
            requests: Arc::default(),
            failure: Some(error),
        }
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<CheckoutRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

impl PaymentGateway for MockPaymentGateway {
    fn initialize_transaction(&self, request: CheckoutRequest) -> GatewayFuture<'_, CheckoutSession> {
        Box::pin(async move {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request.clone());
            }

            if let Some(error) = &self.failure {
                return Err(error.clone());
            }

            let reference = format!("mock_ref_{}", uuid::Uuid::new_v4().simple());
            tracing::info!(email = %request.email, amount = request.amount_minor, reference = %reference, "Mock checkout opened");

            Ok(CheckoutSession::from_data(serde_json::json!({
                "authorization_url": format!("https://checkout.invalid/{reference}"),
                "access_code": format!("access_{reference}"),
                "reference": reference,
            })))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn metadata_serializes_only_present_fields() {
        let request = CheckoutRequest {
            email: "a@x.io".into(),
            amount_minor: 300_000,
            metadata: CheckoutMetadata {
                coins: None,
                ticket_type: Some(TicketTier::Silver),
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "email": "a@x.io",
                "amount": 300_000,
                "metadata": { "ticketType": "silver" }
            })
        );
    }

    #[tokio::test]
    async fn mock_records_and_returns_reference() {
        let gateway = MockPaymentGateway::new();
        let session = gateway
            .initialize_transaction(CheckoutRequest {
                email: "a@x.io".into(),
                amount_minor: 500,
                metadata: CheckoutMetadata {
                    coins: Some(5),
                    ticket_type: None,
                },
            })
            .await
            .unwrap();

        assert!(session.reference.unwrap().starts_with("mock_ref_"));
        assert_eq!(gateway.requests().len(), 1);
    }

    #[tokio::test]
    async fn failing_mock_surfaces_error() {
        let gateway = MockPaymentGateway::failing(GatewayError::Timeout);
        let result = gateway
            .initialize_transaction(CheckoutRequest {
                email: "a@x.io".into(),
                amount_minor: 500,
                metadata: CheckoutMetadata::default(),
            })
            .await;

        assert_eq!(result.unwrap_err(), GatewayError::Timeout);
    }
}
