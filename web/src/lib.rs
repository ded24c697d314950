//! Axum plumbing shared by the festival services.
//!
//! Handlers return [`WebResult`]; domain errors are converted into
//! [`AppError`] at the edge so every failure renders as
//! `{"code": ..., "message": ...}` with a matching status.
//!
//! # Request flow
//!
//! 1. [`correlation_id_layer`] tags the request and opens a tracing span
//!    recording its route, status and latency
//! 2. Extractors parse JSON bodies and [`BearerToken`]s
//! 3. The handler calls into a domain service
//! 4. The result (or [`AppError`]) is rendered as JSON

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod middleware;

pub use error::AppError;
pub use extractors::BearerToken;
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
