//! Business metrics for the festival backend.
//!
//! # Exported Metrics
//!
//! - `festival_registrations_total` - Accounts created
//! - `festival_checkouts_total{kind,status}` - Checkout sessions by package kind and outcome
//! - `festival_webhooks_total{outcome}` - Provider notifications by outcome
//! - `festival_coins_credited_total` - Coins added by purchases and referral bonuses
//! - `festival_tickets_issued_total{tier}` - Ticket codes issued
//! - `festival_tickets_verified_total{outcome}` - Gate verifications by outcome

use metrics::describe_counter;

/// Register metric descriptions. Call once at startup.
pub fn register_business_metrics() {
    describe_counter!("festival_registrations_total", "Total number of accounts registered");
    describe_counter!(
        "festival_checkouts_total",
        "Checkout sessions opened with the payment provider by kind (coins, ticket) and status"
    );
    describe_counter!(
        "festival_webhooks_total",
        "Payment provider notifications by outcome"
    );
    describe_counter!(
        "festival_coins_credited_total",
        "Total coins credited through purchases and referral bonuses"
    );
    describe_counter!("festival_tickets_issued_total", "Ticket codes issued by tier");
    describe_counter!(
        "festival_tickets_verified_total",
        "Ticket verification attempts by outcome (redeemed, already_used, not_found)"
    );

    tracing::info!("Business metrics registered");
}

/// Record a completed registration.
pub fn record_registration() {
    metrics::counter!("festival_registrations_total").increment(1);
}

/// Record a checkout attempt.
///
/// * `kind` - `coins` or `ticket`
/// * `status` - `opened`, `rejected` or `failed`
pub fn record_checkout(kind: &'static str, status: &'static str) {
    metrics::counter!("festival_checkouts_total", "kind" => kind, "status" => status).increment(1);
    tracing::debug!(kind, status, "Recorded checkout metric");
}

/// Record a processed provider notification.
pub fn record_webhook(outcome: &'static str) {
    metrics::counter!("festival_webhooks_total", "outcome" => outcome).increment(1);
}

/// Record coins added to an account.
pub fn record_coins_credited(coins: u64) {
    metrics::counter!("festival_coins_credited_total").increment(coins);
}

/// Record an issued ticket.
pub fn record_ticket_issued(tier: &'static str) {
    metrics::counter!("festival_tickets_issued_total", "tier" => tier).increment(1);
}

/// Record a verification attempt.
pub fn record_ticket_verified(outcome: &'static str) {
    metrics::counter!("festival_tickets_verified_total", "outcome" => outcome).increment(1);
}
