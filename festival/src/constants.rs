//! Business constants.

/// Coin balance every new account starts with.
pub const DEFAULT_COIN_BALANCE: u64 = 10;

/// Coins credited to a referrer per referred registration.
pub const REFERRAL_BONUS: u64 = 4;

/// Maximum number of referred accounts that earn a referrer a bonus.
pub const REFERRAL_CAP: u32 = 2;

/// Length of generated referral codes.
pub const REFERRAL_CODE_LEN: usize = 8;

/// Attempts at drawing a fresh referral or ticket code after a collision.
pub const MAX_CODE_ATTEMPTS: usize = 5;

/// Provider event type that triggers fulfillment.
pub const CHARGE_SUCCESS: &str = "charge.success";

/// Provider header carrying the webhook body signature.
pub const PAYSTACK_SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Minor currency units per major unit (kobo per naira).
pub const MINOR_UNITS_PER_MAJOR: u64 = 100;
