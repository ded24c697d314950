//! Registration, login and session tokens.
//!
//! Passwords are hashed with bcrypt on the blocking pool. Sessions are
//! stateless HS256 JWTs carrying the account id, email and role; nothing is
//! stored server-side, so a token stays valid until it expires.

use crate::config::AuthConfig;
use crate::constants::MAX_CODE_ATTEMPTS;
use crate::error::FestivalError;
use crate::metrics;
use crate::referral::{ReferralProgram, generate_referral_code};
use crate::store::{AccountStore, StoreError, UniqueField};
use crate::types::{Account, Role, normalize_email};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Session token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Account id.
    pub sub: String,
    /// Account email.
    pub email: String,
    /// Account role.
    pub role: Role,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
}

/// Result of a successful registration.
#[derive(Debug, Clone)]
pub struct Registration {
    /// Normalized email of the new account.
    pub email: String,
    /// The account's own referral code.
    pub referral_code: String,
}

/// Basic email shape check: one `@`, non-empty parts, dotted domain.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 3 || email.len() > 255 {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }

    let valid_local = |c: char| c.is_alphanumeric() || matches!(c, '.' | '-' | '+' | '_');
    let valid_domain = |c: char| c.is_alphanumeric() || matches!(c, '.' | '-');

    local.chars().all(valid_local)
        && domain.chars().all(valid_domain)
        && domain.contains('.')
        && domain.split('.').all(|part| !part.is_empty())
}

/// Password hashing, account creation and session tokens.
#[derive(Clone)]
pub struct CredentialService {
    store: Arc<dyn AccountStore>,
    referrals: ReferralProgram,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    session_ttl: i64,
    bcrypt_cost: u32,
}

impl CredentialService {
    /// Build the service from auth settings.
    #[must_use]
    pub fn new(store: Arc<dyn AccountStore>, config: &AuthConfig) -> Self {
        let referrals = ReferralProgram::new(Arc::clone(&store));
        Self {
            store,
            referrals,
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            session_ttl: i64::try_from(config.session_ttl).unwrap_or(i64::MAX),
            bcrypt_cost: config.bcrypt_cost,
        }
    }

    /// Replace the referral program (tests tune its retry policy).
    #[must_use]
    pub fn with_referrals(mut self, referrals: ReferralProgram) -> Self {
        self.referrals = referrals;
        self
    }

    /// Create an account.
    ///
    /// The referrer bonus runs after the account is persisted and never fails
    /// the registration.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a malformed email or empty password
    /// - `Conflict` if the email is already registered
    /// - `InternalFault` on hashing or store failure
    pub async fn register(
        &self,
        identity: &str,
        password: &str,
        referral: Option<&str>,
    ) -> Result<Registration, FestivalError> {
        let email = normalize_email(identity);
        if !is_valid_email(&email) {
            return Err(FestivalError::InvalidArgument(
                "A valid email address is required".to_string(),
            ));
        }
        if password.is_empty() {
            return Err(FestivalError::InvalidArgument("Password is required".to_string()));
        }

        if self.store.find_by_email(&email).await?.is_some() {
            return Err(FestivalError::Conflict("User already exists".to_string()));
        }

        let password_hash = self.hash_password(password).await?;

        let mut attempts = 0;
        let account = loop {
            attempts += 1;
            let account = Account::new(email.clone(), password_hash.clone(), generate_referral_code());
            match self.store.insert_account(&account).await {
                Ok(()) => break account,
                Err(StoreError::Duplicate {
                    field: UniqueField::ReferralCode,
                }) if attempts < MAX_CODE_ATTEMPTS => {
                    tracing::debug!(attempts, "Referral code collision, drawing another");
                }
                Err(e) => return Err(e.into()),
            }
        };

        metrics::record_registration();
        tracing::info!(email = %account.email, account_id = %account.id, "Account registered");

        if let Some(code) = referral {
            self.referrals.credit(code).await;
        }

        Ok(Registration {
            email: account.email,
            referral_code: account.referral_code,
        })
    }

    /// Check credentials and issue a session token.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no account has this identity
    /// - `Unauthorized` if the password does not match
    /// - `InternalFault` on store, hashing or signing failure
    pub async fn login(&self, identity: &str, password: &str) -> Result<String, FestivalError> {
        let email = normalize_email(identity);
        let account = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or_else(|| FestivalError::NotFound("User not found".to_string()))?;

        if !self.verify_password(password, &account.password_hash).await? {
            tracing::debug!(email = %email, "Login rejected: password mismatch");
            return Err(FestivalError::Unauthorized("Invalid credentials".to_string()));
        }

        self.issue_token(&account)
    }

    /// Sign a session token for `account`.
    ///
    /// # Errors
    ///
    /// Returns `InternalFault` if signing fails.
    pub fn issue_token(&self, account: &Account) -> Result<String, FestivalError> {
        let iat = Utc::now().timestamp();
        let claims = Claims {
            sub: account.id.to_string(),
            email: account.email.clone(),
            role: account.role,
            iat,
            exp: iat.saturating_add(self.session_ttl),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| FestivalError::InternalFault(format!("token signing failed: {e}")))
    }

    /// Validate signature and expiry of a session token.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for any invalid, tampered or expired token.
    pub fn verify_token(&self, token: &str) -> Result<Claims, FestivalError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Session token rejected");
                FestivalError::Unauthorized("Invalid or expired token".to_string())
            })
    }

    /// Load the account behind a session.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the account no longer exists
    /// - `InternalFault` on store failure
    pub async fn account(&self, email: &str) -> Result<Account, FestivalError> {
        self.store
            .find_by_email(email)
            .await?
            .ok_or_else(|| FestivalError::NotFound("User not found".to_string()))
    }

    async fn hash_password(&self, password: &str) -> Result<String, FestivalError> {
        let password = password.to_string();
        let cost = self.bcrypt_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| FestivalError::InternalFault(format!("hashing task failed: {e}")))?
            .map_err(|e| FestivalError::InternalFault(format!("password hashing failed: {e}")))
    }

    async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, FestivalError> {
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| FestivalError::InternalFault(format!("hashing task failed: {e}")))?
            .map_err(|e| FestivalError::InternalFault(format!("password check failed: {e}")))
    }
}
