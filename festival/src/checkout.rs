//! Coin and ticket checkout.

use crate::constants::MINOR_UNITS_PER_MAJOR;
use crate::error::FestivalError;
use crate::metrics;
use crate::payment_gateway::{CheckoutMetadata, CheckoutRequest, CheckoutSession, PaymentGateway};
use crate::store::AccountStore;
use crate::types::{Package, PendingTransaction, TicketTier, normalize_email};
use std::sync::Arc;

/// Opens provider checkout sessions and records them in the ledger.
#[derive(Clone)]
pub struct CheckoutService {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn AccountStore>,
}

fn to_minor_units(amount: u64) -> Result<u64, FestivalError> {
    amount
        .checked_mul(MINOR_UNITS_PER_MAJOR)
        .ok_or_else(|| FestivalError::InvalidArgument("Amount is too large".to_string()))
}

fn payer_email(identity: &str) -> Result<String, FestivalError> {
    let email = normalize_email(identity);
    if email.is_empty() {
        return Err(FestivalError::InvalidArgument("Email is required".to_string()));
    }
    Ok(email)
}

impl CheckoutService {
    /// Create a checkout service.
    #[must_use]
    pub fn new(gateway: Arc<dyn PaymentGateway>, store: Arc<dyn AccountStore>) -> Self {
        Self { gateway, store }
    }

    /// Open a checkout for `coins` coins priced at `amount` major units.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if either quantity is zero or the email is blank
    /// - `UpstreamFailure` if the provider call fails
    pub async fn create_coin_checkout(
        &self,
        identity: &str,
        coins: u64,
        amount: u64,
    ) -> Result<CheckoutSession, FestivalError> {
        let email = payer_email(identity)?;
        if coins == 0 {
            return Err(FestivalError::InvalidArgument("Coin amount must be positive".to_string()));
        }
        if amount == 0 {
            return Err(FestivalError::InvalidArgument("Amount must be positive".to_string()));
        }
        let amount_minor = to_minor_units(amount)?;

        let request = CheckoutRequest {
            email,
            amount_minor,
            metadata: CheckoutMetadata {
                coins: Some(coins),
                ticket_type: None,
            },
        };

        self.open("coins", request, Package::Coins(coins)).await
    }

    /// Open a checkout for a ticket of the named tier.
    ///
    /// The tier is resolved before the provider is contacted.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an unknown tier or blank email
    /// - `UpstreamFailure` if the provider call fails
    pub async fn create_ticket_checkout(
        &self,
        identity: &str,
        tier: &str,
    ) -> Result<CheckoutSession, FestivalError> {
        let email = payer_email(identity)?;
        let tier: TicketTier = tier.parse().map_err(|_| {
            metrics::record_checkout("ticket", "rejected");
            FestivalError::InvalidArgument(format!("Invalid ticket type: {tier}"))
        })?;

        let request = CheckoutRequest {
            email,
            amount_minor: to_minor_units(tier.price())?,
            metadata: CheckoutMetadata {
                coins: None,
                ticket_type: Some(tier),
            },
        };

        self.open("ticket", request, Package::Ticket(tier)).await
    }

    async fn open(
        &self,
        kind: &'static str,
        request: CheckoutRequest,
        package: Package,
    ) -> Result<CheckoutSession, FestivalError> {
        let email = request.email.clone();
        let amount_minor = request.amount_minor;

        let session = match self.gateway.initialize_transaction(request).await {
            Ok(session) => session,
            Err(e) => {
                metrics::record_checkout(kind, "failed");
                tracing::error!(email = %email, package = %package, error = %e, "Checkout initialization failed");
                return Err(e.into());
            }
        };

        metrics::record_checkout(kind, "opened");
        tracing::info!(
            email = %email,
            package = %package,
            reference = session.reference.as_deref().unwrap_or("-"),
            "Checkout opened"
        );

        if let Some(reference) = &session.reference {
            let entry = PendingTransaction::new(reference.clone(), email, package, amount_minor);
            if let Err(e) = self.store.record_transaction(&entry).await {
                tracing::warn!(reference = %reference, error = %e, "Failed to record checkout in ledger");
            }
        }

        Ok(session)
    }
}
