//! Application state shared by the HTTP handlers.

use crate::checkout::CheckoutService;
use crate::config::Config;
use crate::credentials::CredentialService;
use crate::payment_gateway::PaymentGateway;
use crate::reconciler::WebhookReconciler;
use crate::store::AccountStore;
use crate::tickets::TicketVerifier;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Built once at startup and cloned per request; every field is an `Arc`
/// or wraps one.
#[derive(Clone)]
pub struct AppState {
    /// Account store, also probed by `/ready`
    pub store: Arc<dyn AccountStore>,
    /// Registration, login and session tokens
    pub credentials: CredentialService,
    /// Provider checkout sessions
    pub checkout: CheckoutService,
    /// Webhook fulfillment
    pub reconciler: WebhookReconciler,
    /// Gate redemption
    pub verifier: TicketVerifier,
    /// Webhook signing key; `None` disables signature checks
    pub webhook_secret: Option<Arc<str>>,
}

impl AppState {
    /// Wire the services over `store` and `gateway`.
    #[must_use]
    pub fn new(
        store: Arc<dyn AccountStore>,
        gateway: Arc<dyn PaymentGateway>,
        config: &Config,
    ) -> Self {
        let webhook_secret = (config.paystack.verify_signature
            && !config.paystack.secret_key.is_empty())
        .then(|| Arc::from(config.paystack.secret_key.as_str()));

        Self {
            credentials: CredentialService::new(Arc::clone(&store), &config.auth),
            checkout: CheckoutService::new(gateway, Arc::clone(&store)),
            reconciler: WebhookReconciler::new(Arc::clone(&store)),
            verifier: TicketVerifier::new(Arc::clone(&store)),
            webhook_secret,
            store,
        }
    }
}
