//! Festival coins and tickets backend.
//!
//! Accounts register and log in, buy coins or tickets through a Paystack
//! hosted checkout, and are credited when Paystack calls back with
//! `charge.success`. Gate staff redeem ticket codes exactly once.
//!
//! # Layout
//!
//! - [`store`]: account and ledger persistence (`PostgreSQL` or in-memory)
//! - [`credentials`]: bcrypt passwords and HS256 session tokens
//! - [`payment_gateway`]: Paystack transaction initialization
//! - [`checkout`]: coin and ticket checkout sessions
//! - [`reconciler`]: webhook verification and fulfillment
//! - [`tickets`]: code generation and one-shot redemption
//! - [`server`] and [`api`]: the axum surface

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod checkout;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod metrics;
pub mod payment_gateway;
pub mod reconciler;
pub mod referral;
pub mod retry;
pub mod server;
pub mod store;
pub mod tickets;
pub mod types;

pub use config::Config;
pub use error::FestivalError;
pub use server::{AppState, build_router};
