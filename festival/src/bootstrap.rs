//! Resource construction from [`Config`].

use crate::config::{Config, StoreBackend};
use crate::payment_gateway::{MockPaymentGateway, PaymentGateway, PaystackClient};
use crate::server::AppState;
use crate::store::{AccountStore, InMemoryAccountStore, PostgresAccountStore};
use std::sync::Arc;

/// Open the configured account store, running migrations when enabled.
///
/// # Errors
///
/// Returns error if `PostgreSQL` is unreachable or migrations fail.
pub async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn AccountStore>> {
    match config.database.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory account store; data is lost on restart");
            Ok(Arc::new(InMemoryAccountStore::new()))
        }
        StoreBackend::Postgres => {
            let store = PostgresAccountStore::connect(&config.database).await?;
            tracing::info!(max_connections = config.database.max_connections, "PostgreSQL connected");

            if config.database.run_migrations {
                store.migrate().await?;
                tracing::info!("Migrations complete");
            }

            Ok(Arc::new(store))
        }
    }
}

/// Build the payment gateway. Without a secret key a mock gateway is used.
///
/// # Errors
///
/// Returns error if the HTTP client cannot be built.
pub fn build_gateway(config: &Config) -> anyhow::Result<Arc<dyn PaymentGateway>> {
    if config.paystack.secret_key.is_empty() {
        tracing::warn!("PAYSTACK_SECRET_KEY not set; using mock payment gateway");
        return Ok(Arc::new(MockPaymentGateway::new()));
    }

    let client = PaystackClient::new(
        config.paystack.secret_key.clone(),
        config.paystack.base_url.clone(),
        config.paystack.timeout(),
    )?
    .with_callback_url(config.paystack.callback_url.clone());

    tracing::info!(base_url = %config.paystack.base_url, "Paystack client configured");
    Ok(Arc::new(client))
}

/// Build the full application state.
///
/// # Errors
///
/// Returns error if the store or gateway cannot be built.
pub async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    if config.uses_default_jwt_secret() {
        tracing::warn!("JWT_SECRET not set; using development secret");
    }
    if !config.paystack.verify_signature {
        tracing::warn!("Webhook signature verification disabled");
    }

    let store = build_store(config).await?;
    let gateway = build_gateway(config)?;
    Ok(AppState::new(store, gateway, config))
}
