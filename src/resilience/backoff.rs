//! Backoff delay computation.
//!
//! Delays are derived from the 1-based retry attempt number:
//!
//! | Strategy      | Base delay                        |
//! |---------------|-----------------------------------|
//! | `exponential` | `factor * 2^(attempt - 1)`        |
//! | `linear`      | `factor * attempt`                |
//! | `none`        | `factor`                          |
//!
//! Jitter is then applied to the base delay. A server supplied `Retry-After`
//! replaces the whole computation and is never jittered.

use crate::{Error, ErrorContext};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    #[default]
    Exponential,
    Linear,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterMode {
    None,
    /// Uniform in `[0, base]`.
    #[default]
    Full,
    /// `base/2` plus uniform in `[0, base/2]`.
    Equal,
    /// Uniform in `[factor, base*3]`, without remembering the previous delay.
    Decorrelated,
}

impl FromStr for BackoffStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exponential" => Ok(Self::Exponential),
            "linear" => Ok(Self::Linear),
            "none" => Ok(Self::None),
            other => Err(Error::configuration_with_context(
                format!("unknown backoff strategy '{}'", other),
                ErrorContext::new()
                    .with_field_path("retry.backoff_strategy")
                    .with_details("expected one of: exponential, linear, none"),
            )),
        }
    }
}

impl FromStr for JitterMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "full" => Ok(Self::Full),
            "equal" => Ok(Self::Equal),
            "decorrelated" => Ok(Self::Decorrelated),
            other => Err(Error::configuration_with_context(
                format!("unknown jitter mode '{}'", other),
                ErrorContext::new()
                    .with_field_path("retry.jitter_mode")
                    .with_details("expected one of: none, full, equal, decorrelated"),
            )),
        }
    }
}

/// Computes the wait before a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffCalculator {
    pub strategy: BackoffStrategy,
    pub delay_factor_ms: u64,
    pub jitter: JitterMode,
    /// Cap on the computed delay, applied to the base and again after jitter.
    /// Does not apply to server supplied delays.
    pub max_delay_ms: Option<u64>,
}

impl BackoffCalculator {
    pub fn new(strategy: BackoffStrategy, delay_factor_ms: u64, jitter: JitterMode) -> Self {
        Self {
            strategy,
            delay_factor_ms,
            jitter,
            max_delay_ms: None,
        }
    }

    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = Some(max_delay_ms);
        self
    }

    /// Deterministic delay before jitter. `attempt` is 1-based; 0 is treated as 1.
    pub fn base_delay_ms(&self, attempt: u32) -> u64 {
        let attempt = attempt.max(1);
        let factor = self.delay_factor_ms;
        let base = match self.strategy {
            BackoffStrategy::Exponential => {
                let multiplier = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
                factor.saturating_mul(multiplier)
            }
            BackoffStrategy::Linear => factor.saturating_mul(u64::from(attempt)),
            BackoffStrategy::None => factor,
        };
        match self.max_delay_ms {
            Some(cap) => base.min(cap),
            None => base,
        }
    }

    /// Delay for `attempt`, honouring a raw `Retry-After` header value when it parses.
    pub fn compute_delay(&self, attempt: u32, server_retry_after: Option<&str>) -> Duration {
        self.compute_delay_with_rng(attempt, server_retry_after, &mut rand::rng())
    }

    pub fn compute_delay_with_rng<R: Rng>(
        &self,
        attempt: u32,
        server_retry_after: Option<&str>,
        rng: &mut R,
    ) -> Duration {
        if let Some(server) = server_retry_after.and_then(parse_retry_after) {
            return server;
        }
        let base = self.base_delay_ms(attempt);
        let jittered = self.apply_jitter(base, rng);
        let delay = match self.max_delay_ms {
            Some(cap) => jittered.min(cap),
            None => jittered,
        };
        Duration::from_millis(delay)
    }

    fn apply_jitter<R: Rng>(&self, base: u64, rng: &mut R) -> u64 {
        match self.jitter {
            JitterMode::None => base,
            JitterMode::Full => rng.random_range(0..=base),
            JitterMode::Equal => {
                let half = base / 2;
                half + rng.random_range(0..=half)
            }
            JitterMode::Decorrelated => {
                let low = self.delay_factor_ms;
                let high = base.saturating_mul(3).max(low);
                rng.random_range(low..=high)
            }
        }
    }
}

/// Free-standing form of [`BackoffCalculator::compute_delay`], in milliseconds.
pub fn compute_delay(
    attempt: u32,
    strategy: BackoffStrategy,
    delay_factor_ms: u64,
    jitter: JitterMode,
    server_retry_after: Option<&str>,
) -> u64 {
    let delay = BackoffCalculator::new(strategy, delay_factor_ms, jitter)
        .compute_delay(attempt, server_retry_after);
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

/// Parse a `Retry-After` value: delta-seconds or an HTTP date.
///
/// Dates in the past clamp to zero. Returns `None` for anything else.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    parse_retry_after_at(value, SystemTime::now())
}

pub fn parse_retry_after_at(value: &str, now: SystemTime) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_millis(secs.saturating_mul(1000)));
    }
    let at = httpdate::parse_http_date(value).ok()?;
    Some(at.duration_since(now).unwrap_or(Duration::ZERO))
}
