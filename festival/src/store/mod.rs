//! Account store.
//!
//! [`AccountStore`] abstracts over persistence. Every mutating method is a
//! single atomic operation against the stored record (an in-place `UPDATE` in
//! `PostgreSQL`, one critical section in memory) so concurrent requests for
//! the same account never lose an update.

#[cfg(test)]
pub(crate) mod faulty;
mod memory;
mod postgres;

pub use memory::InMemoryAccountStore;
pub use postgres::PostgresAccountStore;

use crate::types::{Account, PendingTransaction, TicketTier};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by store methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Column carrying a uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    /// Account email.
    Email,
    /// Account referral code.
    ReferralCode,
    /// Issued ticket code.
    TicketCode,
    /// Ledger reference.
    Reference,
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Email => "email",
            Self::ReferralCode => "referral code",
            Self::TicketCode => "ticket code",
            Self::Reference => "transaction reference",
        })
    }
}

/// Store failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("duplicate {field}")]
    Duplicate {
        /// Offending column
        field: UniqueField,
    },

    /// The backend could not be reached (pool timeout, connection loss).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected or failed the operation.
    #[error("store query failed: {0}")]
    Query(String),

    /// A stored row could not be mapped into domain types.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Account mutation a payment event can trigger.
///
/// Claimed per provider reference so a redelivered event never applies the
/// same mutation twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventEffect {
    /// Coins added to the payer's balance.
    CoinCredit,
    /// Ticket issued to the payer.
    TicketIssue,
}

impl EventEffect {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CoinCredit => "coin_credit",
            Self::TicketIssue => "ticket_issue",
        }
    }
}

/// Outcome of crediting a referrer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferralCredit {
    /// Bonus applied.
    Credited {
        /// Referrer email
        referrer: String,
        /// Referral count after the credit
        referral_count: u32,
    },
    /// Referrer exists but already reached the cap.
    CapReached,
    /// No account holds the code.
    UnknownCode,
}

/// Outcome of a redemption attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redemption {
    /// The flag flipped from false to true in this call.
    Redeemed(TicketTier),
    /// The flag was already true.
    AlreadyUsed,
    /// No account holds the code.
    UnknownCode,
}

/// Persistence for accounts and the checkout ledger.
pub trait AccountStore: Send + Sync {
    /// Insert a new account.
    ///
    /// # Errors
    ///
    /// - `StoreError::Duplicate { field: Email }` if the email is taken
    /// - `StoreError::Duplicate { field: ReferralCode }` on a referral code collision
    fn insert_account(&self, account: &Account) -> StoreFuture<'_, ()>;

    /// Look up an account by its (normalized) email.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn find_by_email(&self, email: &str) -> StoreFuture<'_, Option<Account>>;

    /// Add `bonus` coins and bump the referral count of the account owning
    /// `referral_code`, only while its count is below `cap`.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn credit_referrer(
        &self,
        referral_code: &str,
        bonus: u64,
        cap: u32,
    ) -> StoreFuture<'_, ReferralCredit>;

    /// Atomically add `amount` coins. Returns the new balance, or `None` if no
    /// account has this email.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn credit_coins(&self, email: &str, amount: u64) -> StoreFuture<'_, Option<u64>>;

    /// Assign a ticket (tier, code, redeemed=false). Returns `false` if no
    /// account has this email.
    ///
    /// # Errors
    ///
    /// - `StoreError::Duplicate { field: TicketCode }` if another account holds `code`
    fn issue_ticket(&self, email: &str, tier: TicketTier, code: &str) -> StoreFuture<'_, bool>;

    /// Flip the redeemed flag of the ticket `code` if, and only if, it is
    /// currently false.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn redeem_ticket(&self, code: &str) -> StoreFuture<'_, Redemption>;

    /// Record a checkout session in the ledger.
    ///
    /// # Errors
    ///
    /// - `StoreError::Duplicate { field: Reference }` if the reference exists
    fn record_transaction(&self, transaction: &PendingTransaction) -> StoreFuture<'_, ()>;

    /// Mark a pending ledger entry completed. Returns `false` if no pending
    /// entry has this reference.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn complete_transaction(&self, reference: &str) -> StoreFuture<'_, bool>;

    /// Look up a ledger entry.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn find_transaction(&self, reference: &str) -> StoreFuture<'_, Option<PendingTransaction>>;

    /// Claim `effect` of the payment event `reference`. Returns `false` if it
    /// was claimed before.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn claim_event(&self, reference: &str, effect: EventEffect) -> StoreFuture<'_, bool>;

    /// Drop a claim after the claimed mutation failed, so a redelivery can
    /// apply it.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn release_event(&self, reference: &str, effect: EventEffect) -> StoreFuture<'_, ()>;

    /// Cheap connectivity check for readiness probes.
    ///
    /// # Errors
    ///
    /// Returns error if the backend is unreachable.
    fn ping(&self) -> StoreFuture<'_, ()>;
}
