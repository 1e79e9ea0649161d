//! Client surface and request execution.
//!
//! Implementation details are split into submodules under `src/client/`.

pub mod builder;
pub mod core;
pub mod error_classification;
mod execution;
pub mod path;
pub mod policy;
pub mod request;

pub use builder::ClientBuilder;
pub use core::Client;
pub use error_classification::{classify, classify_http_status, ClassifiedError};
pub use policy::{RetryEvent, RetryOverride, RetryPolicy};
pub use request::{ErrorMessageExtractor, RequestOptions};
