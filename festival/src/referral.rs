//! Referral codes and the best-effort referrer bonus.

use crate::constants::{REFERRAL_BONUS, REFERRAL_CAP, REFERRAL_CODE_LEN};
use crate::metrics;
use crate::retry::{RetryPolicy, retry_with_predicate};
use crate::store::{AccountStore, ReferralCredit, StoreError};
use rand::Rng;
use std::sync::Arc;

const REFERRAL_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Draw a random referral code of lowercase alphanumerics.
#[must_use]
pub fn generate_referral_code() -> String {
    let mut rng = rand::thread_rng();
    (0..REFERRAL_CODE_LEN)
        .map(|_| char::from(REFERRAL_ALPHABET[rng.gen_range(0..REFERRAL_ALPHABET.len())]))
        .collect()
}

/// Credits referrers after a referred registration has been persisted.
#[derive(Clone)]
pub struct ReferralProgram {
    store: Arc<dyn AccountStore>,
    policy: RetryPolicy,
}

impl ReferralProgram {
    /// Create a program using the default backoff.
    #[must_use]
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self {
            store,
            policy: RetryPolicy::default(),
        }
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Apply the bonus for `referral_code`, if any.
    ///
    /// Never fails: transient store errors are retried with backoff, then
    /// logged and dropped. Returns the store's verdict when one was reached.
    pub async fn credit(&self, referral_code: &str) -> Option<ReferralCredit> {
        let code = referral_code.trim().to_ascii_lowercase();
        if code.is_empty() {
            return None;
        }

        let result = retry_with_predicate(
            &self.policy,
            || self.store.credit_referrer(&code, REFERRAL_BONUS, REFERRAL_CAP),
            StoreError::is_transient,
        )
        .await;

        match result {
            Ok(credit) => {
                match &credit {
                    ReferralCredit::Credited {
                        referrer,
                        referral_count,
                    } => {
                        tracing::info!(referrer = %referrer, referral_count, "Referral bonus credited");
                        metrics::record_coins_credited(REFERRAL_BONUS);
                    }
                    ReferralCredit::CapReached => {
                        tracing::debug!(referral_code = %code, "Referrer already at referral cap");
                    }
                    ReferralCredit::UnknownCode => {
                        tracing::debug!(referral_code = %code, "Unknown referral code ignored");
                    }
                }
                Some(credit)
            }
            Err(e) => {
                tracing::error!(referral_code = %code, error = %e, "Referral credit abandoned");
                None
            }
        }
    }
}
