//! Resilience primitives.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`backoff`] | Retry delay computation with jitter and `Retry-After` support |
//!
//! ```rust
//! use resilient_http::resilience::backoff::{BackoffCalculator, BackoffStrategy, JitterMode};
//! use std::time::Duration;
//!
//! let calc = BackoffCalculator::new(BackoffStrategy::Exponential, 100, JitterMode::None);
//! assert_eq!(calc.compute_delay(3, None), Duration::from_millis(400));
//! assert_eq!(calc.compute_delay(3, Some("5")), Duration::from_secs(5));
//! ```

pub mod backoff;

pub use backoff::{
    compute_delay, parse_retry_after, BackoffCalculator, BackoffStrategy, JitterMode,
};
