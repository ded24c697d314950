//! Ticket codes and gate verification.

use crate::error::FestivalError;
use crate::metrics;
use crate::store::{AccountStore, Redemption};
use crate::types::TicketTier;
use rand::Rng;
use std::sync::Arc;

/// Draw a ticket code: eight random digits followed by the tier suffix.
#[must_use]
pub fn generate_ticket_code(tier: TicketTier) -> String {
    let digits: u32 = rand::thread_rng().gen_range(10_000_000..100_000_000);
    format!("{digits}{}", tier.code_suffix())
}

/// One-shot redemption of issued ticket codes.
#[derive(Clone)]
pub struct TicketVerifier {
    store: Arc<dyn AccountStore>,
}

impl TicketVerifier {
    /// Create a verifier.
    #[must_use]
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Redeem `code`. Of any number of concurrent calls for one code, exactly
    /// one returns the tier.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty code
    /// - `NotFound` if no account holds the code
    /// - `AlreadyUsed` if it was redeemed before
    /// - `InternalFault` on store failure
    pub async fn verify(&self, code: &str) -> Result<TicketTier, FestivalError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(FestivalError::InvalidArgument("Ticket code is required".to_string()));
        }

        match self.store.redeem_ticket(code).await? {
            Redemption::Redeemed(tier) => {
                metrics::record_ticket_verified("redeemed");
                tracing::info!(ticket_code = %code, tier = %tier, "Ticket redeemed");
                Ok(tier)
            }
            Redemption::AlreadyUsed => {
                metrics::record_ticket_verified("already_used");
                tracing::warn!(ticket_code = %code, "Ticket presented again after redemption");
                Err(FestivalError::AlreadyUsed)
            }
            Redemption::UnknownCode => {
                metrics::record_ticket_verified("not_found");
                Err(FestivalError::NotFound("Invalid ticket".to_string()))
            }
        }
    }
}
