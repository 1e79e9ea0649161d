use crate::client::error_classification::ClassifiedError;
use crate::error::RequestMetadata;
use crate::resilience::backoff::{BackoffCalculator, BackoffStrategy, JitterMode};
use crate::transport::TransportFailure;
use crate::{Error, ErrorContext, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Decides retriability; `None` defers to the classifier's default.
pub type EnableRetryFn = Arc<dyn Fn(&RequestMetadata, &ClassifiedError) -> Option<bool> + Send + Sync>;
/// Observer called before each retry sleep.
pub type OnRetryFn = Arc<dyn Fn(&RetryEvent<'_>) + Send + Sync>;
/// Replaces the backoff computation: `(attempt, error, request) -> delay`.
pub type RetryDelayFn = Arc<dyn Fn(u32, &ClassifiedError, &RequestMetadata) -> Duration + Send + Sync>;

/// What `on_retry` observers see.
#[derive(Debug)]
pub struct RetryEvent<'a> {
    pub request: &'a RequestMetadata,
    pub error: &'a ClassifiedError,
    pub failure: &'a TransportFailure,
    /// 1-based index of the retry about to happen.
    pub attempt: u32,
    pub delay: Duration,
}

/// How to proceed after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    Retry { attempt: u32, delay: Duration },
    Fail,
}

/// Retry behaviour for a client or a single request.
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_strategy: BackoffStrategy,
    pub delay_factor_ms: u64,
    pub jitter_mode: JitterMode,
    pub max_delay_ms: Option<u64>,
    pub enable_retry: Option<EnableRetryFn>,
    pub on_retry: Option<OnRetryFn>,
    pub retry_delay: Option<RetryDelayFn>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_strategy: BackoffStrategy::Exponential,
            delay_factor_ms: 100,
            jitter_mode: JitterMode::Full,
            max_delay_ms: None,
            enable_retry: None,
            on_retry: None,
            retry_delay: None,
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("backoff_strategy", &self.backoff_strategy)
            .field("delay_factor_ms", &self.delay_factor_ms)
            .field("jitter_mode", &self.jitter_mode)
            .field("max_delay_ms", &self.max_delay_ms)
            .field("enable_retry", &self.enable_retry.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .field("retry_delay", &self.retry_delay.is_some())
            .finish()
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn with_backoff(mut self, strategy: BackoffStrategy, delay_factor_ms: u64) -> Self {
        self.backoff_strategy = strategy;
        self.delay_factor_ms = delay_factor_ms;
        self
    }

    pub fn with_jitter(mut self, jitter: JitterMode) -> Self {
        self.jitter_mode = jitter;
        self
    }

    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = Some(max_delay_ms);
        self
    }

    pub fn with_enable_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestMetadata, &ClassifiedError) -> Option<bool> + Send + Sync + 'static,
    {
        self.enable_retry = Some(Arc::new(f));
        self
    }

    pub fn with_on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(&RetryEvent<'_>) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(f));
        self
    }

    pub fn with_retry_delay<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, &ClassifiedError, &RequestMetadata) -> Duration + Send + Sync + 'static,
    {
        self.retry_delay = Some(Arc::new(f));
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.delay_factor_ms == 0 {
            return Err(Error::configuration_with_context(
                "delay factor must be a positive number of milliseconds",
                ErrorContext::new()
                    .with_field_path("retry.delay_factor_ms")
                    .with_source("retry_policy"),
            ));
        }
        Ok(())
    }

    pub fn calculator(&self) -> BackoffCalculator {
        let calc = BackoffCalculator::new(self.backoff_strategy, self.delay_factor_ms, self.jitter_mode);
        match self.max_delay_ms {
            Some(cap) => calc.with_max_delay_ms(cap),
            None => calc,
        }
    }

    /// Field-by-field merge; set override fields win.
    pub fn merged(&self, o: &RetryOverride) -> RetryPolicy {
        RetryPolicy {
            max_retries: o.max_retries.unwrap_or(self.max_retries),
            backoff_strategy: o.backoff_strategy.unwrap_or(self.backoff_strategy),
            delay_factor_ms: o.delay_factor_ms.unwrap_or(self.delay_factor_ms),
            jitter_mode: o.jitter_mode.unwrap_or(self.jitter_mode),
            max_delay_ms: o.max_delay_ms.or(self.max_delay_ms),
            enable_retry: o.enable_retry.clone().or_else(|| self.enable_retry.clone()),
            on_retry: o.on_retry.clone().or_else(|| self.on_retry.clone()),
            retry_delay: o.retry_delay.clone().or_else(|| self.retry_delay.clone()),
        }
    }

    /// Retriability after applying the `enable_retry` override.
    pub fn is_retriable(&self, request: &RequestMetadata, error: &ClassifiedError) -> bool {
        self.enable_retry
            .as_ref()
            .and_then(|f| f(request, error))
            .unwrap_or(error.is_retriable)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(
        &self,
        attempt: u32,
        error: &ClassifiedError,
        request: &RequestMetadata,
        server_retry_after: Option<&str>,
    ) -> Duration {
        match &self.retry_delay {
            Some(f) => f(attempt, error, request),
            None => self.calculator().compute_delay(attempt, server_retry_after),
        }
    }

    /// Decide what to do next after an attempt failed.
    ///
    /// `retries_done` counts retries already performed for this request.
    pub(crate) fn decide(
        &self,
        request: &RequestMetadata,
        error: &ClassifiedError,
        retries_done: u32,
        server_retry_after: Option<&str>,
    ) -> Decision {
        if retries_done >= self.max_retries || !self.is_retriable(request, error) {
            return Decision::Fail;
        }
        let attempt = retries_done + 1;
        Decision::Retry {
            attempt,
            delay: self.delay_for(attempt, error, request, server_retry_after),
        }
    }
}

/// Per-request retry overrides.
#[derive(Clone, Default)]
pub struct RetryOverride {
    pub max_retries: Option<u32>,
    pub backoff_strategy: Option<BackoffStrategy>,
    pub delay_factor_ms: Option<u64>,
    pub jitter_mode: Option<JitterMode>,
    pub max_delay_ms: Option<u64>,
    pub enable_retry: Option<EnableRetryFn>,
    pub on_retry: Option<OnRetryFn>,
    pub retry_delay: Option<RetryDelayFn>,
}

impl fmt::Debug for RetryOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOverride")
            .field("max_retries", &self.max_retries)
            .field("backoff_strategy", &self.backoff_strategy)
            .field("delay_factor_ms", &self.delay_factor_ms)
            .field("jitter_mode", &self.jitter_mode)
            .field("max_delay_ms", &self.max_delay_ms)
            .finish_non_exhaustive()
    }
}

impl RetryOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    pub fn backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = Some(strategy);
        self
    }

    pub fn delay_factor_ms(mut self, ms: u64) -> Self {
        self.delay_factor_ms = Some(ms);
        self
    }

    pub fn jitter(mut self, jitter: JitterMode) -> Self {
        self.jitter_mode = Some(jitter);
        self
    }

    pub fn max_delay_ms(mut self, ms: u64) -> Self {
        self.max_delay_ms = Some(ms);
        self
    }

    pub fn enable_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestMetadata, &ClassifiedError) -> Option<bool> + Send + Sync + 'static,
    {
        self.enable_retry = Some(Arc::new(f));
        self
    }

    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(&RetryEvent<'_>) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(f));
        self
    }

    pub fn retry_delay<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, &ClassifiedError, &RequestMetadata) -> Duration + Send + Sync + 'static,
    {
        self.retry_delay = Some(Arc::new(f));
        self
    }
}
