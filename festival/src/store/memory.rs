//! In-memory account store.
//!
//! All tables sit behind one mutex, so each trait method is a single critical
//! section and behaves atomically like its SQL counterpart.

use super::{
    AccountStore, EventEffect, Redemption, ReferralCredit, StoreError, StoreFuture, UniqueField,
};
use crate::types::{Account, PendingTransaction, TicketTier, TransactionStatus};
use chrono::Utc;
use futures::future;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Tables {
    /// Keyed by email.
    accounts: HashMap<String, Account>,
    /// Keyed by provider reference.
    transactions: HashMap<String, PendingTransaction>,
    /// Claimed payment event effects.
    processed_events: HashSet<(String, EventEffect)>,
}

impl Tables {
    fn account_by_referral_code(&mut self, code: &str) -> Option<&mut Account> {
        self.accounts
            .values_mut()
            .find(|a| a.referral_code == code)
    }

    fn account_by_ticket_code(&mut self, code: &str) -> Option<&mut Account> {
        self.accounts
            .values_mut()
            .find(|a| a.ticket_code.as_deref() == Some(code))
    }
}

/// Process-local [`AccountStore`] for tests and development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAccountStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryAccountStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_tables<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<T, StoreError>,
    ) -> StoreFuture<'_, T>
    where
        T: Send + 'static,
    {
        let result = self
            .tables
            .lock()
            .map_err(|_| StoreError::Unavailable("account table lock poisoned".to_string()))
            .and_then(|mut tables| f(&mut tables));
        Box::pin(future::ready(result))
    }
}

impl AccountStore for InMemoryAccountStore {
    fn insert_account(&self, account: &Account) -> StoreFuture<'_, ()> {
        let account = account.clone();
        self.with_tables(move |tables| {
            if tables.accounts.contains_key(&account.email) {
                return Err(StoreError::Duplicate {
                    field: UniqueField::Email,
                });
            }
            if tables.account_by_referral_code(&account.referral_code).is_some() {
                return Err(StoreError::Duplicate {
                    field: UniqueField::ReferralCode,
                });
            }
            tables.accounts.insert(account.email.clone(), account);
            Ok(())
        })
    }

    fn find_by_email(&self, email: &str) -> StoreFuture<'_, Option<Account>> {
        self.with_tables(|tables| Ok(tables.accounts.get(email).cloned()))
    }

    fn credit_referrer(
        &self,
        referral_code: &str,
        bonus: u64,
        cap: u32,
    ) -> StoreFuture<'_, ReferralCredit> {
        self.with_tables(|tables| {
            let Some(referrer) = tables.account_by_referral_code(referral_code) else {
                return Ok(ReferralCredit::UnknownCode);
            };
            if referrer.referral_count >= cap {
                return Ok(ReferralCredit::CapReached);
            }
            referrer.coins = referrer
                .coins
                .checked_add(bonus)
                .ok_or_else(|| StoreError::Query("coin balance overflow".to_string()))?;
            referrer.referral_count += 1;
            referrer.updated_at = Utc::now();
            Ok(ReferralCredit::Credited {
                referrer: referrer.email.clone(),
                referral_count: referrer.referral_count,
            })
        })
    }

    fn credit_coins(&self, email: &str, amount: u64) -> StoreFuture<'_, Option<u64>> {
        self.with_tables(|tables| {
            let Some(account) = tables.accounts.get_mut(email) else {
                return Ok(None);
            };
            account.coins = account
                .coins
                .checked_add(amount)
                .ok_or_else(|| StoreError::Query("coin balance overflow".to_string()))?;
            account.updated_at = Utc::now();
            Ok(Some(account.coins))
        })
    }

    fn issue_ticket(&self, email: &str, tier: TicketTier, code: &str) -> StoreFuture<'_, bool> {
        self.with_tables(|tables| {
            let held_elsewhere = tables
                .accounts
                .values()
                .any(|a| a.email != email && a.ticket_code.as_deref() == Some(code));
            if held_elsewhere {
                return Err(StoreError::Duplicate {
                    field: UniqueField::TicketCode,
                });
            }
            let Some(account) = tables.accounts.get_mut(email) else {
                return Ok(false);
            };
            account.ticket_type = Some(tier);
            account.ticket_code = Some(code.to_string());
            account.ticket_redeemed = false;
            account.updated_at = Utc::now();
            Ok(true)
        })
    }

    fn redeem_ticket(&self, code: &str) -> StoreFuture<'_, Redemption> {
        self.with_tables(|tables| {
            let Some(account) = tables.account_by_ticket_code(code) else {
                return Ok(Redemption::UnknownCode);
            };
            if account.ticket_redeemed {
                return Ok(Redemption::AlreadyUsed);
            }
            let tier = account
                .ticket_type
                .ok_or_else(|| StoreError::Corrupt(format!("ticket {code} has no tier")))?;
            account.ticket_redeemed = true;
            account.updated_at = Utc::now();
            Ok(Redemption::Redeemed(tier))
        })
    }

    fn record_transaction(&self, transaction: &PendingTransaction) -> StoreFuture<'_, ()> {
        let transaction = transaction.clone();
        self.with_tables(move |tables| {
            if tables.transactions.contains_key(&transaction.reference) {
                return Err(StoreError::Duplicate {
                    field: UniqueField::Reference,
                });
            }
            tables
                .transactions
                .insert(transaction.reference.clone(), transaction);
            Ok(())
        })
    }

    fn complete_transaction(&self, reference: &str) -> StoreFuture<'_, bool> {
        self.with_tables(|tables| {
            match tables.transactions.get_mut(reference) {
                Some(tx) if tx.status == TransactionStatus::Pending => {
                    tx.status = TransactionStatus::Completed;
                    tx.updated_at = Utc::now();
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    fn find_transaction(&self, reference: &str) -> StoreFuture<'_, Option<PendingTransaction>> {
        self.with_tables(|tables| Ok(tables.transactions.get(reference).cloned()))
    }

    fn claim_event(&self, reference: &str, effect: EventEffect) -> StoreFuture<'_, bool> {
        self.with_tables(|tables| {
            Ok(tables
                .processed_events
                .insert((reference.to_string(), effect)))
        })
    }

    fn release_event(&self, reference: &str, effect: EventEffect) -> StoreFuture<'_, ()> {
        self.with_tables(|tables| {
            tables
                .processed_events
                .remove(&(reference.to_string(), effect));
            Ok(())
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        self.with_tables(|_| Ok(()))
    }
}
