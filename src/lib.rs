//! # resilient-http
//!
//! Retry, backoff, error classification and idempotency for HTTP API clients.
//!
//! ## Overview
//!
//! This crate is the decision layer wrapped around an HTTP transport. It decides
//! whether a failed request should be retried, how long to wait before the next
//! attempt, what kind of error occurred, and how to make retried writes safe
//! with idempotency keys. Sockets, TLS and connection pooling are left to the
//! [`transport::Transport`] implementation (reqwest by default).
//!
//! ## Key Features
//!
//! - **Classification**: every failure maps to one of network, timeout,
//!   serialization, http or unknown, with a default retriability
//! - **Backoff**: exponential, linear or constant delays with none, full,
//!   equal or decorrelated jitter; `Retry-After` is honoured verbatim
//! - **Idempotency**: write requests carry a stable `Idempotency-Key` across
//!   retries of the same logical call
//! - **Per-request overrides** merged field by field onto client defaults
//! - **Cancellation** of in-flight attempts and backoff waits
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resilient_http::{Client, IdempotencyPolicy, RequestOptions, RetryPolicy};
//! use resilient_http::resilience::{BackoffStrategy, JitterMode};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> resilient_http::Result<()> {
//!     let client = Client::builder()
//!         .base_url("https://api.example.com/v1")
//!         .retry_policy(
//!             RetryPolicy::default()
//!                 .with_max_retries(3)
//!                 .with_backoff(BackoffStrategy::Exponential, 100)
//!                 .with_jitter(JitterMode::Full),
//!         )
//!         .idempotency(IdempotencyPolicy::enabled())
//!         .build()?;
//!
//!     let order = client
//!         .execute(
//!             RequestOptions::post("/customers/:id/orders")
//!                 .path_param("id", 42)
//!                 .json(&json!({"sku": "A-1", "qty": 2})),
//!         )
//!         .await?;
//!     println!("{}", order.status);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | `Client`, builder, per-request options, retry policy, execution |
//! | [`resilience`] | Backoff computation and `Retry-After` parsing |
//! | [`idempotency`] | Request signatures, key generation and the key store |
//! | [`transport`] | Transport trait, response model and the reqwest transport |
//! | [`hooks`] | Pre-request, post-response and error handler hooks |
//! | [`config`] | YAML/JSON configuration with environment overrides |
//! | [`error`] | Unified error type |

pub mod client;
pub mod config;
pub mod error_code;
pub mod hooks;
pub mod idempotency;
pub mod resilience;
pub mod transport;
pub mod utils;

// Re-export main types for convenience
pub use client::{Client, ClientBuilder, RequestOptions, RetryOverride, RetryPolicy};
pub use config::ClientConfig;
pub use error_code::{ErrorType, HttpErrorCategory};
pub use hooks::{ErrorHandling, RequestHooks};
pub use idempotency::{IdempotencyKeyStore, IdempotencyOverride, IdempotencyPolicy, KeyGenerator};
pub use transport::{Response, ResponseBody, Transport};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext, RequestMetadata};
