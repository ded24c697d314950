//! Domain types: accounts, roles, ticket tiers and the checkout ledger.

use crate::constants::DEFAULT_COIN_BALANCE;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Creates a new random `AccountId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `AccountId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Enumerations
// ============================================================================

/// Returned when a string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Account role carried in session tokens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular festival-goer.
    #[default]
    User,
    /// Staff account.
    Admin,
}

impl Role {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(ParseEnumError::new("role", other)),
        }
    }
}

/// Ticket tier sold at checkout.
///
/// An account without a ticket holds `None` rather than a third variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketTier {
    /// Standard entry.
    Silver,
    /// Premium entry.
    Gold,
}

impl TicketTier {
    /// Price in major currency units.
    #[must_use]
    pub const fn price(self) -> u64 {
        match self {
            Self::Silver => 3000,
            Self::Gold => 5000,
        }
    }

    /// Fixed suffix appended to generated ticket codes.
    #[must_use]
    pub const fn code_suffix(self) -> &'static str {
        match self {
            Self::Silver => "-SLV",
            Self::Gold => "-GLD",
        }
    }

    /// Storage and wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Silver => "silver",
            Self::Gold => "gold",
        }
    }
}

impl fmt::Display for TicketTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketTier {
    type Err = ParseEnumError;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "silver" => Ok(Self::Silver),
            "gold" => Ok(Self::Gold),
            _ => Err(ParseEnumError::new("ticket tier", s)),
        }
    }
}

// ============================================================================
// Account
// ============================================================================

/// A registered festival account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    /// Surrogate id, used as the token subject.
    pub id: AccountId,
    /// Identity key (normalized email).
    pub email: String,
    /// bcrypt hash of the password.
    pub password_hash: String,
    /// Coin balance.
    pub coins: u64,
    /// Role.
    pub role: Role,
    /// This account's own referral code.
    pub referral_code: String,
    /// Number of referred registrations that paid a bonus.
    pub referral_count: u32,
    /// Ticket tier held, if any.
    pub ticket_type: Option<TicketTier>,
    /// Ticket code held, if any.
    pub ticket_code: Option<String>,
    /// Whether the held ticket has been redeemed.
    pub ticket_redeemed: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Build a freshly registered account with default balance and role.
    #[must_use]
    pub fn new(email: String, password_hash: String, referral_code: String) -> Self {
        let now = Utc::now();
        Self {
            id: AccountId::new(),
            email,
            password_hash,
            coins: DEFAULT_COIN_BALANCE,
            role: Role::User,
            referral_code,
            referral_count: 0,
            ticket_type: None,
            ticket_code: None,
            ticket_redeemed: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Public view of an account (no password hash).
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    /// Account id.
    pub id: AccountId,
    /// Email.
    pub email: String,
    /// Coin balance.
    pub coins: u64,
    /// Role.
    pub role: Role,
    /// Own referral code.
    pub referral_code: String,
    /// Paid referrals so far.
    pub referral_count: u32,
    /// Ticket tier held.
    pub ticket_type: Option<TicketTier>,
    /// Ticket code held.
    pub ticket_code: Option<String>,
    /// Redemption flag.
    pub ticket_redeemed: bool,
}

impl From<Account> for AccountProfile {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            coins: account.coins,
            role: account.role,
            referral_code: account.referral_code,
            referral_count: account.referral_count,
            ticket_type: account.ticket_type,
            ticket_code: account.ticket_code,
            ticket_redeemed: account.ticket_redeemed,
        }
    }
}

/// Normalize an identity for storage and lookup.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// ============================================================================
// Checkout ledger
// ============================================================================

/// What a checkout session is buying.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Package {
    /// A coin top-up of the given amount.
    Coins(u64),
    /// A ticket of the given tier.
    Ticket(TicketTier),
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coins(n) => write!(f, "coins:{n}"),
            Self::Ticket(tier) => write!(f, "ticket:{tier}"),
        }
    }
}

impl FromStr for Package {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("coins", n)) => n
                .parse()
                .map(Self::Coins)
                .map_err(|_| ParseEnumError::new("package", s)),
            Some(("ticket", tier)) => tier
                .parse()
                .map(Self::Ticket)
                .map_err(|_| ParseEnumError::new("package", s)),
            _ => Err(ParseEnumError::new("package", s)),
        }
    }
}

/// Ledger status of a checkout session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Session opened, no confirmation yet.
    Pending,
    /// Provider confirmed the charge.
    Completed,
}

impl TransactionStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            other => Err(ParseEnumError::new("transaction status", other)),
        }
    }
}

/// Audit record of a checkout session opened with the provider.
///
/// Never consulted when deciding whether to credit an account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingTransaction {
    /// Provider reference.
    pub reference: String,
    /// Payer email.
    pub email: String,
    /// What was bought.
    pub package: Package,
    /// Charged amount in minor units.
    pub amount_minor: u64,
    /// Ledger status.
    pub status: TransactionStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl PendingTransaction {
    /// New pending entry.
    #[must_use]
    pub fn new(reference: String, email: String, package: Package, amount_minor: u64) -> Self {
        let now = Utc::now();
        Self {
            reference,
            email,
            package,
            amount_minor,
            status: TransactionStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}
