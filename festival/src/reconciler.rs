//! Payment webhook reconciliation.
//!
//! Turns a provider `charge.success` notification into account mutations:
//! a coin credit, a ticket issuance, or both. Every mutation is a single
//! atomic store call guarded by a claim on (reference, effect), so a
//! redelivered event changes nothing it already changed.
//!
//! A failed mutation releases its own claim and is returned as an error so
//! the provider redelivers. Mutations that succeeded keep their claims and
//! are not repeated.

use crate::constants::{CHARGE_SUCCESS, MAX_CODE_ATTEMPTS};
use crate::error::FestivalError;
use crate::metrics;
use crate::store::{AccountStore, EventEffect, StoreError, UniqueField};
use crate::tickets::generate_ticket_code;
use crate::types::{TicketTier, normalize_email};
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha512;
use std::fmt::Write as _;
use std::sync::Arc;

/// Provider notification envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event type, e.g. `charge.success`.
    pub event: String,
    /// Charge details.
    #[serde(default)]
    pub data: Option<ChargeData>,
}

/// Charge details of a notification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChargeData {
    /// Provider reference.
    #[serde(default)]
    pub reference: Option<String>,
    /// Charged amount in minor units.
    #[serde(default)]
    pub amount: Option<Value>,
    /// Payer.
    #[serde(default)]
    pub customer: Option<Customer>,
    /// Metadata echoed from checkout.
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Payer details.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Customer {
    /// Payer email.
    #[serde(default)]
    pub email: Option<String>,
}

impl WebhookEvent {
    /// Parse a raw request body.
    ///
    /// # Errors
    ///
    /// Returns error if the body is not a provider envelope.
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// Fulfillment instructions extracted from metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fulfillment {
    /// Coins to credit.
    pub coins: Option<u64>,
    /// Raw ticket tier name.
    pub ticket_type: Option<String>,
}

/// Read a non-negative integer sent as a JSON number or numeric string.
fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl Fulfillment {
    /// Extract fulfillment from a metadata value.
    ///
    /// Metadata may arrive as an object or as a JSON-encoded string.
    #[must_use]
    pub fn from_metadata(metadata: Option<&Value>) -> Self {
        let decoded;
        let object = match metadata {
            Some(Value::String(raw)) => {
                decoded = serde_json::from_str::<Value>(raw).ok();
                decoded.as_ref()
            }
            other => other,
        };

        let Some(object) = object.and_then(Value::as_object) else {
            return Self::default();
        };

        Self {
            coins: object.get("coins").and_then(as_count).filter(|&n| n > 0),
            ticket_type: object
                .get("ticketType")
                .and_then(Value::as_str)
                .map(str::to_string)
                .filter(|s| !s.trim().is_empty()),
        }
    }
}

/// What a notification did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Not a `charge.success` event.
    Ignored {
        /// Event type received
        event: String,
    },
    /// Envelope lacks charge data or a payer email.
    Malformed,
    /// No account matches the payer.
    UnknownPayer,
    /// Every effect of the event was applied by an earlier delivery.
    Duplicate,
    /// Account mutated as described.
    Fulfilled {
        /// New balance after a coin credit
        balance: Option<u64>,
        /// Issued ticket
        ticket: Option<(TicketTier, String)>,
    },
}

impl ReconcileOutcome {
    /// Metric label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Ignored { .. } => "ignored",
            Self::Malformed => "malformed",
            Self::UnknownPayer => "unknown_payer",
            Self::Duplicate => "duplicate",
            Self::Fulfilled { .. } => "fulfilled",
        }
    }
}

/// Verify a provider signature: lowercase hex of HMAC-SHA512 over the raw body.
#[must_use]
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(mut mac) = Hmac::<Sha512>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let digest = mac.finalize().into_bytes();

    let mut expected = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(expected, "{byte:02x}");
    }

    constant_time_eq(
        expected.as_bytes(),
        signature.trim().to_ascii_lowercase().as_bytes(),
    )
}

/// Applies payment notifications to accounts.
#[derive(Clone)]
pub struct WebhookReconciler {
    store: Arc<dyn AccountStore>,
}

impl WebhookReconciler {
    /// Create a reconciler.
    #[must_use]
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Apply one notification.
    ///
    /// # Errors
    ///
    /// Returns `InternalFault` on store failure or when no free ticket code
    /// could be drawn. Any coin credit already applied stays applied and is
    /// skipped on redelivery.
    pub async fn reconcile(&self, event: &WebhookEvent) -> Result<ReconcileOutcome, FestivalError> {
        let outcome = self.apply(event).await;
        match &outcome {
            Ok(outcome) => metrics::record_webhook(outcome.label()),
            Err(_) => metrics::record_webhook("failed"),
        }
        outcome
    }

    async fn apply(&self, event: &WebhookEvent) -> Result<ReconcileOutcome, FestivalError> {
        if event.event != CHARGE_SUCCESS {
            tracing::debug!(event = %event.event, "Ignoring non-success webhook event");
            return Ok(ReconcileOutcome::Ignored {
                event: event.event.clone(),
            });
        }

        let Some(data) = &event.data else {
            tracing::warn!("charge.success without data");
            return Ok(ReconcileOutcome::Malformed);
        };
        let Some(email) = data
            .customer
            .as_ref()
            .and_then(|c| c.email.as_deref())
            .map(normalize_email)
            .filter(|e| !e.is_empty())
        else {
            tracing::warn!(reference = ?data.reference, "charge.success without customer email");
            return Ok(ReconcileOutcome::Malformed);
        };
        let reference = data.reference.as_deref().map(str::trim).filter(|r| !r.is_empty());
        if reference.is_none() {
            tracing::warn!(email = %email, "charge.success without reference cannot be deduplicated");
        }

        if self.store.find_by_email(&email).await?.is_none() {
            tracing::info!(email = %email, reference = ?reference, "Webhook for unknown payer acknowledged");
            return Ok(ReconcileOutcome::UnknownPayer);
        }

        let fulfillment = Fulfillment::from_metadata(data.metadata.as_ref());
        tracing::debug!(
            email = %email,
            reference = ?reference,
            amount = ?data.amount.as_ref().and_then(as_count),
            coins = ?fulfillment.coins,
            ticket_type = ?fulfillment.ticket_type,
            "Reconciling charge"
        );

        let mut replayed = false;

        let mut balance = None;
        if let Some(coins) = fulfillment.coins {
            if self.claim(reference, EventEffect::CoinCredit).await? {
                match self.store.credit_coins(&email, coins).await {
                    Ok(Some(new_balance)) => {
                        metrics::record_coins_credited(coins);
                        tracing::info!(email = %email, coins, balance = new_balance, "Coins credited");
                        balance = Some(new_balance);
                    }
                    Ok(None) => {
                        self.release(reference, EventEffect::CoinCredit).await;
                        return Ok(ReconcileOutcome::UnknownPayer);
                    }
                    Err(e) => {
                        self.release(reference, EventEffect::CoinCredit).await;
                        return Err(e.into());
                    }
                }
            } else {
                tracing::info!(email = %email, reference = ?reference, "Coin credit already applied");
                replayed = true;
            }
        }

        let mut ticket = None;
        if let Some(raw_tier) = &fulfillment.ticket_type {
            match raw_tier.parse::<TicketTier>() {
                Ok(tier) => {
                    if self.claim(reference, EventEffect::TicketIssue).await? {
                        match self.issue_ticket(&email, tier).await {
                            Ok(Some(code)) => ticket = Some((tier, code)),
                            Ok(None) => {
                                self.release(reference, EventEffect::TicketIssue).await;
                                return Ok(ReconcileOutcome::UnknownPayer);
                            }
                            Err(e) => {
                                self.release(reference, EventEffect::TicketIssue).await;
                                return Err(e);
                            }
                        }
                    } else {
                        tracing::info!(email = %email, reference = ?reference, "Ticket already issued");
                        replayed = true;
                    }
                }
                Err(_) => {
                    tracing::warn!(email = %email, ticket_type = %raw_tier, "Unknown ticket tier in metadata ignored");
                }
            }
        }

        if replayed && balance.is_none() && ticket.is_none() {
            return Ok(ReconcileOutcome::Duplicate);
        }

        if let Some(reference) = reference {
            match self.store.complete_transaction(reference).await {
                Ok(true) => tracing::debug!(reference, "Ledger entry completed"),
                Ok(false) => tracing::debug!(reference, "No pending ledger entry for reference"),
                Err(e) => tracing::warn!(reference, error = %e, "Failed to complete ledger entry"),
            }
        }

        Ok(ReconcileOutcome::Fulfilled { balance, ticket })
    }

    /// Claim an effect of the event. Events without a reference are always
    /// applied.
    async fn claim(&self, reference: Option<&str>, effect: EventEffect) -> Result<bool, FestivalError> {
        match reference {
            Some(reference) => Ok(self.store.claim_event(reference, effect).await?),
            None => Ok(true),
        }
    }

    async fn release(&self, reference: Option<&str>, effect: EventEffect) {
        let Some(reference) = reference else {
            return;
        };
        if let Err(e) = self.store.release_event(reference, effect).await {
            tracing::error!(
                reference,
                effect = effect.as_str(),
                error = %e,
                "Failed to release event claim, redelivery will skip this effect"
            );
        }
    }

    /// Issue a fresh code, drawing again while it collides with another
    /// account's code. `None` if the account disappeared.
    async fn issue_ticket(&self, email: &str, tier: TicketTier) -> Result<Option<String>, FestivalError> {
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = generate_ticket_code(tier);
            match self.store.issue_ticket(email, tier, &code).await {
                Ok(true) => {
                    metrics::record_ticket_issued(tier.as_str());
                    tracing::info!(email = %email, tier = %tier, ticket_code = %code, "Ticket issued");
                    return Ok(Some(code));
                }
                Ok(false) => return Ok(None),
                Err(StoreError::Duplicate {
                    field: UniqueField::TicketCode,
                }) => {
                    tracing::debug!(attempt, "Ticket code collision, drawing another");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(FestivalError::InternalFault(format!(
            "no free ticket code after {MAX_CODE_ATTEMPTS} attempts"
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::InMemoryAccountStore;
    use crate::store::Redemption;
    use crate::store::faulty::FaultyStore;
    use crate::types::{Account, Package, PendingTransaction, TransactionStatus};
    use serde_json::json;

    async fn setup() -> (Arc<InMemoryAccountStore>, WebhookReconciler) {
        let store = Arc::new(InMemoryAccountStore::new());
        store
            .insert_account(&Account::new("fan@x.io".into(), "h".into(), "ref00001".into()))
            .await
            .unwrap();
        (store.clone(), WebhookReconciler::new(store))
    }

    async fn setup_faulty(store: FaultyStore) -> (Arc<FaultyStore>, WebhookReconciler) {
        let store = Arc::new(store);
        store
            .insert_account(&Account::new("fan@x.io".into(), "h".into(), "ref00001".into()))
            .await
            .unwrap();
        (store.clone(), WebhookReconciler::new(store))
    }

    fn charge(email: &str, metadata: Value) -> WebhookEvent {
        serde_json::from_value(json!({
            "event": "charge.success",
            "data": {
                "reference": "ref_abc",
                "amount": 50_000,
                "customer": { "email": email },
                "metadata": metadata
            }
        }))
        .unwrap()
    }

    #[test]
    fn metadata_accepts_numbers_and_strings() {
        let numeric = Fulfillment::from_metadata(Some(&json!({ "coins": 5 })));
        let text = Fulfillment::from_metadata(Some(&json!({ "coins": "5" })));
        let encoded = Fulfillment::from_metadata(Some(&json!("{\"coins\":\"5\",\"ticketType\":\"gold\"}")));

        assert_eq!(numeric.coins, Some(5));
        assert_eq!(text.coins, Some(5));
        assert_eq!(encoded.coins, Some(5));
        assert_eq!(encoded.ticket_type.as_deref(), Some("gold"));
        assert_eq!(Fulfillment::from_metadata(None), Fulfillment::default());
    }

    #[test]
    fn signature_check() {
        let body = br#"{"event":"charge.success"}"#;
        let mut mac = Hmac::<Sha512>::new_from_slice(b"sk_test").unwrap();
        mac.update(body);
        let signature: String = mac
            .finalize()
            .into_bytes()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();

        assert!(verify_signature("sk_test", body, &signature));
        assert!(verify_signature("sk_test", body, &signature.to_uppercase()));
        assert!(!verify_signature("sk_other", body, &signature));
        assert!(!verify_signature("sk_test", b"{}", &signature));
        assert!(!verify_signature("sk_test", body, ""));
    }

    #[tokio::test]
    async fn coins_credited() {
        let (store, reconciler) = setup().await;

        let outcome = reconciler.reconcile(&charge("fan@x.io", json!({ "coins": 5 }))).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Fulfilled { balance: Some(15), ticket: None });
        assert_eq!(store.find_by_email("fan@x.io").await.unwrap().unwrap().coins, 15);
    }

    #[tokio::test]
    async fn silver_ticket_issued() {
        let (store, reconciler) = setup().await;

        reconciler
            .reconcile(&charge("FAN@x.io", json!({ "ticketType": "silver" })))
            .await
            .unwrap();

        let account = store.find_by_email("fan@x.io").await.unwrap().unwrap();
        assert_eq!(account.ticket_type, Some(TicketTier::Silver));
        assert!(account.ticket_code.unwrap().ends_with("-SLV"));
        assert!(!account.ticket_redeemed);
    }

    #[tokio::test]
    async fn both_branches_fire() {
        let (store, reconciler) = setup().await;

        reconciler
            .reconcile(&charge("fan@x.io", json!({ "coins": "3", "ticketType": "gold" })))
            .await
            .unwrap();

        let account = store.find_by_email("fan@x.io").await.unwrap().unwrap();
        assert_eq!(account.coins, 13);
        assert_eq!(account.ticket_type, Some(TicketTier::Gold));
    }

    #[tokio::test]
    async fn unknown_payer_and_other_events_leave_store_untouched() {
        let (store, reconciler) = setup().await;

        let outcome = reconciler.reconcile(&charge("ghost@x.io", json!({ "coins": 5 }))).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::UnknownPayer);

        let mut failed = charge("fan@x.io", json!({ "coins": 5 }));
        failed.event = "charge.failed".into();
        let outcome = reconciler.reconcile(&failed).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Ignored { .. }));

        assert_eq!(store.find_by_email("fan@x.io").await.unwrap().unwrap().coins, 10);
    }

    #[tokio::test]
    async fn unknown_tier_ignored() {
        let (store, reconciler) = setup().await;

        let outcome = reconciler
            .reconcile(&charge("fan@x.io", json!({ "ticketType": "platinum" })))
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Fulfilled { balance: None, ticket: None });
        assert!(store.find_by_email("fan@x.io").await.unwrap().unwrap().ticket_code.is_none());
    }

    #[tokio::test]
    async fn ledger_entry_completed() {
        let (store, reconciler) = setup().await;
        store
            .record_transaction(&PendingTransaction::new(
                "ref_abc".into(),
                "fan@x.io".into(),
                Package::Coins(5),
                50_000,
            ))
            .await
            .unwrap();

        reconciler.reconcile(&charge("fan@x.io", json!({ "coins": 5 }))).await.unwrap();

        let entry = store.find_transaction("ref_abc").await.unwrap().unwrap();
        assert_eq!(entry.status, TransactionStatus::Completed);
    }

    #[tokio::test]
    async fn missing_customer_is_malformed() {
        let (_, reconciler) = setup().await;
        let event: WebhookEvent =
            serde_json::from_value(json!({ "event": "charge.success", "data": {} })).unwrap();

        assert_eq!(reconciler.reconcile(&event).await.unwrap(), ReconcileOutcome::Malformed);
    }

    #[tokio::test]
    async fn redelivered_coin_event_credits_once() {
        let (store, reconciler) = setup().await;
        let event = charge("fan@x.io", json!({ "coins": 5 }));

        reconciler.reconcile(&event).await.unwrap();
        let replay = reconciler.reconcile(&event).await.unwrap();

        assert_eq!(replay, ReconcileOutcome::Duplicate);
        assert_eq!(store.find_by_email("fan@x.io").await.unwrap().unwrap().coins, 15);
    }

    #[tokio::test]
    async fn redelivered_ticket_event_keeps_redeemed_ticket() {
        let (store, reconciler) = setup().await;
        let event = charge("fan@x.io", json!({ "ticketType": "gold" }));

        reconciler.reconcile(&event).await.unwrap();
        let code = store.find_by_email("fan@x.io").await.unwrap().unwrap().ticket_code.unwrap();
        assert_eq!(store.redeem_ticket(&code).await.unwrap(), Redemption::Redeemed(TicketTier::Gold));

        let replay = reconciler.reconcile(&event).await.unwrap();

        assert_eq!(replay, ReconcileOutcome::Duplicate);
        let account = store.find_by_email("fan@x.io").await.unwrap().unwrap();
        assert_eq!(account.ticket_code.as_deref(), Some(code.as_str()));
        assert!(account.ticket_redeemed);
    }

    #[tokio::test]
    async fn distinct_references_each_apply() {
        let (store, reconciler) = setup().await;
        let first = charge("fan@x.io", json!({ "coins": 5 }));
        let mut second = first.clone();
        if let Some(data) = second.data.as_mut() {
            data.reference = Some("ref_def".into());
        }

        reconciler.reconcile(&first).await.unwrap();
        reconciler.reconcile(&second).await.unwrap();

        assert_eq!(store.find_by_email("fan@x.io").await.unwrap().unwrap().coins, 20);
    }

    #[tokio::test]
    async fn ticket_code_collisions_are_retried() {
        let faulty = FaultyStore::new(InMemoryAccountStore::new())
            .with_ticket_code_collisions(MAX_CODE_ATTEMPTS - 1);
        let (store, reconciler) = setup_faulty(faulty).await;

        let outcome = reconciler
            .reconcile(&charge("fan@x.io", json!({ "ticketType": "silver" })))
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            ReconcileOutcome::Fulfilled { ticket: Some((TicketTier::Silver, _)), .. }
        ));
        assert_eq!(store.issue_attempts(), MAX_CODE_ATTEMPTS);
    }

    #[tokio::test]
    async fn exhausted_ticket_codes_fail_then_redelivery_issues_without_recrediting() {
        let faulty = FaultyStore::new(InMemoryAccountStore::new())
            .with_ticket_code_collisions(MAX_CODE_ATTEMPTS);
        let (store, reconciler) = setup_faulty(faulty).await;
        let event = charge("fan@x.io", json!({ "coins": 3, "ticketType": "gold" }));

        let err = reconciler.reconcile(&event).await.unwrap_err();
        assert!(matches!(err, FestivalError::InternalFault(_)));
        assert_eq!(store.issue_attempts(), MAX_CODE_ATTEMPTS);

        let account = store.find_by_email("fan@x.io").await.unwrap().unwrap();
        assert_eq!(account.coins, 13);
        assert!(account.ticket_code.is_none());

        let outcome = reconciler.reconcile(&event).await.unwrap();

        assert!(matches!(
            outcome,
            ReconcileOutcome::Fulfilled { balance: None, ticket: Some((TicketTier::Gold, _)) }
        ));
        let account = store.find_by_email("fan@x.io").await.unwrap().unwrap();
        assert_eq!(account.coins, 13);
        assert_eq!(account.ticket_type, Some(TicketTier::Gold));
    }
}
