//! `PostgreSQL` account store.
//!
//! Every mutation is one statement. Balance changes are expressed as
//! `coins = coins + $n`, redemption and referral credit carry their guard in
//! the `WHERE` clause, and code uniqueness is enforced by named constraints
//! that [`map_sqlx_error`] turns into [`StoreError::Duplicate`].

use super::{
    AccountStore, EventEffect, Redemption, ReferralCredit, StoreError, StoreFuture, UniqueField,
};
use crate::config::DatabaseConfig;
use crate::types::{Account, AccountId, PendingTransaction, TicketTier};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, FromRow, PgPool};
use uuid::Uuid;

/// Columns selected for an [`Account`].
const ACCOUNT_COLUMNS: &str = "id, email, password_hash, coins, role, referral_code, \
    referral_count, ticket_type, ticket_code, ticket_redeemed, created_at, updated_at";

/// `PostgreSQL`-backed [`AccountStore`].
#[derive(Clone, Debug)]
pub struct PostgresAccountStore {
    pool: PgPool,
}

impl PostgresAccountStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool with acquire and statement timeouts.
    ///
    /// # Errors
    ///
    /// Returns error if the database is unreachable.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let statement_timeout = format!("SET statement_timeout = '{}s'", config.statement_timeout);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .after_connect(move |conn, _meta| {
                let statement_timeout = statement_timeout.clone();
                Box::pin(async move {
                    conn.execute(statement_timeout.as_str()).await?;
                    Ok(())
                })
            })
            .connect(&config.url)
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to connect: {e}")))?;

        Ok(Self::new(pool))
    }

    /// Run embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns error if migrations fail.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Query(format!("migration failed: {e}")))
    }
}

/// Map a driver error into the store taxonomy.
fn map_sqlx_error(error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            let field = match db_err.constraint() {
                Some("accounts_email_key") => UniqueField::Email,
                Some("accounts_referral_code_key") => UniqueField::ReferralCode,
                Some("accounts_ticket_code_key") => UniqueField::TicketCode,
                Some("payment_transactions_pkey") => UniqueField::Reference,
                _ => return StoreError::Query(error.to_string()),
            };
            StoreError::Duplicate { field }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(error.to_string())
        }
        _ => StoreError::Query(error.to_string()),
    }
}

fn to_db_amount(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Query(format!("amount {value} out of range")))
}

fn from_db_amount(value: i64, column: &str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {column}: {value}")))
}

#[derive(Debug, FromRow)]
struct AccountRow {
    id: Uuid,
    email: String,
    password_hash: String,
    coins: i64,
    role: String,
    referral_code: String,
    referral_count: i32,
    ticket_type: Option<String>,
    ticket_code: Option<String>,
    ticket_redeemed: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let corrupt = |e: crate::types::ParseEnumError| StoreError::Corrupt(e.to_string());
        Ok(Self {
            id: AccountId::from_uuid(row.id),
            email: row.email,
            password_hash: row.password_hash,
            coins: from_db_amount(row.coins, "coins")?,
            role: row.role.parse().map_err(corrupt)?,
            referral_code: row.referral_code,
            referral_count: u32::try_from(row.referral_count).map_err(|_| {
                StoreError::Corrupt(format!("negative referral_count: {}", row.referral_count))
            })?,
            ticket_type: row
                .ticket_type
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(corrupt)?,
            ticket_code: row.ticket_code,
            ticket_redeemed: row.ticket_redeemed,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    reference: String,
    email: String,
    package: String,
    amount_minor: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for PendingTransaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            reference: row.reference,
            email: row.email,
            package: row
                .package
                .parse()
                .map_err(|e: crate::types::ParseEnumError| StoreError::Corrupt(e.to_string()))?,
            amount_minor: from_db_amount(row.amount_minor, "amount_minor")?,
            status: row
                .status
                .parse()
                .map_err(|e: crate::types::ParseEnumError| StoreError::Corrupt(e.to_string()))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl AccountStore for PostgresAccountStore {
    fn insert_account(&self, account: &Account) -> StoreFuture<'_, ()> {
        let account = account.clone();
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO accounts
                    (id, email, password_hash, coins, role, referral_code, referral_count,
                     ticket_type, ticket_code, ticket_redeemed, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                ",
            )
            .bind(account.id.as_uuid())
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(to_db_amount(account.coins)?)
            .bind(account.role.as_str())
            .bind(&account.referral_code)
            .bind(i32::try_from(account.referral_count).unwrap_or(i32::MAX))
            .bind(account.ticket_type.map(TicketTier::as_str))
            .bind(&account.ticket_code)
            .bind(account.ticket_redeemed)
            .bind(account.created_at)
            .bind(account.updated_at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
            Ok(())
        })
    }

    fn find_by_email(&self, email: &str) -> StoreFuture<'_, Option<Account>> {
        let email = email.to_string();
        Box::pin(async move {
            let row: Option<AccountRow> =
                sqlx::query_as(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1"))
                    .bind(&email)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;
            row.map(Account::try_from).transpose()
        })
    }

    fn credit_referrer(
        &self,
        referral_code: &str,
        bonus: u64,
        cap: u32,
    ) -> StoreFuture<'_, ReferralCredit> {
        let referral_code = referral_code.to_string();
        Box::pin(async move {
            let cap = i32::try_from(cap).unwrap_or(i32::MAX);
            let credited: Option<(String, i32)> = sqlx::query_as(
                r"
                UPDATE accounts
                SET coins = coins + $2,
                    referral_count = referral_count + 1,
                    updated_at = now()
                WHERE referral_code = $1 AND referral_count < $3
                RETURNING email, referral_count
                ",
            )
            .bind(&referral_code)
            .bind(to_db_amount(bonus)?)
            .bind(cap)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            if let Some((referrer, count)) = credited {
                return Ok(ReferralCredit::Credited {
                    referrer,
                    referral_count: u32::try_from(count).unwrap_or_default(),
                });
            }

            let exists: Option<(Uuid,)> =
                sqlx::query_as("SELECT id FROM accounts WHERE referral_code = $1")
                    .bind(&referral_code)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

            Ok(if exists.is_some() {
                ReferralCredit::CapReached
            } else {
                ReferralCredit::UnknownCode
            })
        })
    }

    fn credit_coins(&self, email: &str, amount: u64) -> StoreFuture<'_, Option<u64>> {
        let email = email.to_string();
        Box::pin(async move {
            let balance: Option<(i64,)> = sqlx::query_as(
                r"
                UPDATE accounts
                SET coins = coins + $2, updated_at = now()
                WHERE email = $1
                RETURNING coins
                ",
            )
            .bind(&email)
            .bind(to_db_amount(amount)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            balance
                .map(|(coins,)| from_db_amount(coins, "coins"))
                .transpose()
        })
    }

    fn issue_ticket(&self, email: &str, tier: TicketTier, code: &str) -> StoreFuture<'_, bool> {
        let email = email.to_string();
        let code = code.to_string();
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE accounts
                SET ticket_type = $2, ticket_code = $3, ticket_redeemed = FALSE, updated_at = now()
                WHERE email = $1
                ",
            )
            .bind(&email)
            .bind(tier.as_str())
            .bind(&code)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            Ok(result.rows_affected() == 1)
        })
    }

    fn redeem_ticket(&self, code: &str) -> StoreFuture<'_, Redemption> {
        let code = code.to_string();
        Box::pin(async move {
            let redeemed: Option<(String,)> = sqlx::query_as(
                r"
                UPDATE accounts
                SET ticket_redeemed = TRUE, updated_at = now()
                WHERE ticket_code = $1 AND NOT ticket_redeemed
                RETURNING ticket_type
                ",
            )
            .bind(&code)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            if let Some((tier,)) = redeemed {
                let tier = tier
                    .parse()
                    .map_err(|e: crate::types::ParseEnumError| StoreError::Corrupt(e.to_string()))?;
                return Ok(Redemption::Redeemed(tier));
            }

            let held: Option<(bool,)> =
                sqlx::query_as("SELECT ticket_redeemed FROM accounts WHERE ticket_code = $1")
                    .bind(&code)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

            Ok(match held {
                Some(_) => Redemption::AlreadyUsed,
                None => Redemption::UnknownCode,
            })
        })
    }

    fn record_transaction(&self, transaction: &PendingTransaction) -> StoreFuture<'_, ()> {
        let transaction = transaction.clone();
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO payment_transactions
                    (reference, email, package, amount_minor, status, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ",
            )
            .bind(&transaction.reference)
            .bind(&transaction.email)
            .bind(transaction.package.to_string())
            .bind(to_db_amount(transaction.amount_minor)?)
            .bind(transaction.status.as_str())
            .bind(transaction.created_at)
            .bind(transaction.updated_at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
            Ok(())
        })
    }

    fn complete_transaction(&self, reference: &str) -> StoreFuture<'_, bool> {
        let reference = reference.to_string();
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE payment_transactions
                SET status = 'completed', updated_at = now()
                WHERE reference = $1 AND status = 'pending'
                ",
            )
            .bind(&reference)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            Ok(result.rows_affected() == 1)
        })
    }

    fn find_transaction(&self, reference: &str) -> StoreFuture<'_, Option<PendingTransaction>> {
        let reference = reference.to_string();
        Box::pin(async move {
            let row: Option<TransactionRow> = sqlx::query_as(
                r"
                SELECT reference, email, package, amount_minor, status, created_at, updated_at
                FROM payment_transactions
                WHERE reference = $1
                ",
            )
            .bind(&reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            row.map(PendingTransaction::try_from).transpose()
        })
    }

    fn claim_event(&self, reference: &str, effect: EventEffect) -> StoreFuture<'_, bool> {
        let reference = reference.to_string();
        Box::pin(async move {
            let result = sqlx::query(
                r"
                INSERT INTO processed_events (reference, effect)
                VALUES ($1, $2)
                ON CONFLICT (reference, effect) DO NOTHING
                ",
            )
            .bind(&reference)
            .bind(effect.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            Ok(result.rows_affected() == 1)
        })
    }

    fn release_event(&self, reference: &str, effect: EventEffect) -> StoreFuture<'_, ()> {
        let reference = reference.to_string();
        Box::pin(async move {
            sqlx::query("DELETE FROM processed_events WHERE reference = $1 AND effect = $2")
                .bind(&reference)
                .bind(effect.as_str())
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
            Ok(())
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
            Ok(())
        })
    }
}
