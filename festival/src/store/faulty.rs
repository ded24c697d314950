//! Store wrapper that injects failures ahead of the inner store.

use super::{
    AccountStore, EventEffect, InMemoryAccountStore, Redemption, ReferralCredit, StoreError,
    StoreFuture, UniqueField,
};
use crate::types::{Account, PendingTransaction, TicketTier};
use std::future;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fails the first calls of selected operations, then delegates.
#[derive(Debug, Default)]
pub(crate) struct FaultyStore {
    inner: InMemoryAccountStore,
    referral_code_collisions: AtomicUsize,
    ticket_code_collisions: AtomicUsize,
    unavailable_referral_credits: AtomicUsize,
    issue_attempts: AtomicUsize,
}

impl FaultyStore {
    pub(crate) fn new(inner: InMemoryAccountStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub(crate) fn with_referral_code_collisions(self, count: usize) -> Self {
        self.referral_code_collisions.store(count, Ordering::SeqCst);
        self
    }

    pub(crate) fn with_ticket_code_collisions(self, count: usize) -> Self {
        self.ticket_code_collisions.store(count, Ordering::SeqCst);
        self
    }

    pub(crate) fn with_unavailable_referral_credits(self, count: usize) -> Self {
        self.unavailable_referral_credits.store(count, Ordering::SeqCst);
        self
    }

    /// Calls to `issue_ticket`, failed ones included.
    pub(crate) fn issue_attempts(&self) -> usize {
        self.issue_attempts.load(Ordering::SeqCst)
    }
}

fn take(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl AccountStore for FaultyStore {
    fn insert_account(&self, account: &Account) -> StoreFuture<'_, ()> {
        if take(&self.referral_code_collisions) {
            return Box::pin(future::ready(Err(StoreError::Duplicate {
                field: UniqueField::ReferralCode,
            })));
        }
        self.inner.insert_account(account)
    }

    fn find_by_email(&self, email: &str) -> StoreFuture<'_, Option<Account>> {
        self.inner.find_by_email(email)
    }

    fn credit_referrer(
        &self,
        referral_code: &str,
        bonus: u64,
        cap: u32,
    ) -> StoreFuture<'_, ReferralCredit> {
        if take(&self.unavailable_referral_credits) {
            return Box::pin(future::ready(Err(StoreError::Unavailable(
                "connection reset".to_string(),
            ))));
        }
        self.inner.credit_referrer(referral_code, bonus, cap)
    }

    fn credit_coins(&self, email: &str, amount: u64) -> StoreFuture<'_, Option<u64>> {
        self.inner.credit_coins(email, amount)
    }

    fn issue_ticket(&self, email: &str, tier: TicketTier, code: &str) -> StoreFuture<'_, bool> {
        self.issue_attempts.fetch_add(1, Ordering::SeqCst);
        if take(&self.ticket_code_collisions) {
            return Box::pin(future::ready(Err(StoreError::Duplicate {
                field: UniqueField::TicketCode,
            })));
        }
        self.inner.issue_ticket(email, tier, code)
    }

    fn redeem_ticket(&self, code: &str) -> StoreFuture<'_, Redemption> {
        self.inner.redeem_ticket(code)
    }

    fn record_transaction(&self, transaction: &PendingTransaction) -> StoreFuture<'_, ()> {
        self.inner.record_transaction(transaction)
    }

    fn complete_transaction(&self, reference: &str) -> StoreFuture<'_, bool> {
        self.inner.complete_transaction(reference)
    }

    fn find_transaction(&self, reference: &str) -> StoreFuture<'_, Option<PendingTransaction>> {
        self.inner.find_transaction(reference)
    }

    fn claim_event(&self, reference: &str, effect: EventEffect) -> StoreFuture<'_, bool> {
        self.inner.claim_event(reference, effect)
    }

    fn release_event(&self, reference: &str, effect: EventEffect) -> StoreFuture<'_, ()> {
        self.inner.release_event(reference, effect)
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        self.inner.ping()
    }
}
