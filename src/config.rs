//! File and environment configuration.
//!
//! ```yaml
//! name: billing
//! base_url: https://api.example.com/v1
//! timeout_ms: 5000
//! headers:
//!   x-client: billing-worker
//! retry:
//!   max_retries: 4
//!   backoff: linear
//!   delay_factor_ms: 250
//!   jitter: equal
//! idempotency:
//!   enabled: true
//!   methods: [POST, PUT, PATCH]
//!   key_generator: uuid
//! error_message_path: error.message
//! ```
//!
//! Environment variables override file values:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `RESILIENT_HTTP_TIMEOUT_SECS` | `timeout_ms` (seconds) and transport timeout |
//! | `RESILIENT_HTTP_MAX_RETRIES` | `retry.max_retries` |
//! | `RESILIENT_HTTP_BACKOFF` | `retry.backoff` |
//! | `RESILIENT_HTTP_JITTER` | `retry.jitter` |
//! | `RESILIENT_HTTP_DELAY_FACTOR_MS` | `retry.delay_factor_ms` |
//! | `RESILIENT_HTTP_POOL_MAX_IDLE_PER_HOST` | `transport.pool_max_idle_per_host` |
//! | `RESILIENT_HTTP_POOL_IDLE_TIMEOUT_SECS` | `transport.pool_idle_timeout_secs` |
//! | `RESILIENT_HTTP_PROXY_URL` | `transport.proxy_url` |

use crate::client::policy::RetryPolicy;
use crate::idempotency::{default_methods, IdempotencyPolicy, KeyGenerator};
use crate::resilience::backoff::{BackoffStrategy, JitterMode};
use crate::{Error, ErrorContext, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

pub const ENV_TIMEOUT_SECS: &str = "RESILIENT_HTTP_TIMEOUT_SECS";
pub const ENV_MAX_RETRIES: &str = "RESILIENT_HTTP_MAX_RETRIES";
pub const ENV_BACKOFF: &str = "RESILIENT_HTTP_BACKOFF";
pub const ENV_JITTER: &str = "RESILIENT_HTTP_JITTER";
pub const ENV_DELAY_FACTOR_MS: &str = "RESILIENT_HTTP_DELAY_FACTOR_MS";
pub const ENV_POOL_MAX_IDLE_PER_HOST: &str = "RESILIENT_HTTP_POOL_MAX_IDLE_PER_HOST";
pub const ENV_POOL_IDLE_TIMEOUT_SECS: &str = "RESILIENT_HTTP_POOL_IDLE_TIMEOUT_SECS";
pub const ENV_PROXY_URL: &str = "RESILIENT_HTTP_PROXY_URL";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub headers: BTreeMap<String, String>,
    pub retry: RetryConfig,
    pub idempotency: IdempotencyConfig,
    pub error_message_path: Option<String>,
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_retries: Option<u32>,
    pub backoff: Option<BackoffStrategy>,
    pub delay_factor_ms: Option<u64>,
    pub jitter: Option<JitterMode>,
    pub max_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyGeneratorKind {
    Sequential,
    Uuid,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdempotencyConfig {
    pub enabled: Option<bool>,
    pub methods: Option<Vec<String>>,
    pub header_name: Option<String>,
    pub key_generator: Option<KeyGeneratorKind>,
    /// Lifetime of a retained key for a request that never succeeded.
    pub ttl_secs: Option<u64>,
    pub capacity: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    pub timeout_secs: Option<u64>,
    pub pool_max_idle_per_host: Option<usize>,
    pub pool_idle_timeout_secs: Option<u64>,
    pub proxy_url: Option<String>,
}

impl TransportConfig {
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|k| std::env::var(k).ok())
    }

    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = env_parse::<u64, _>(&lookup, ENV_TIMEOUT_SECS)? {
            self.timeout_secs = Some(v);
        }
        if let Some(v) = env_parse::<usize, _>(&lookup, ENV_POOL_MAX_IDLE_PER_HOST)? {
            self.pool_max_idle_per_host = Some(v);
        }
        if let Some(v) = env_parse::<u64, _>(&lookup, ENV_POOL_IDLE_TIMEOUT_SECS)? {
            self.pool_idle_timeout_secs = Some(v);
        }
        if let Some(v) = lookup(ENV_PROXY_URL).filter(|v| !v.trim().is_empty()) {
            self.proxy_url = Some(v);
        }
        Ok(())
    }
}

impl ClientConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        serde_yaml::from_str(s).map_err(|e| {
            Error::configuration_with_context(
                "invalid YAML client configuration",
                ErrorContext::new().with_details(e.to_string()).with_source("client_config"),
            )
        })
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| {
            Error::configuration_with_context(
                "invalid JSON client configuration",
                ErrorContext::new().with_details(e.to_string()).with_source("client_config"),
            )
        })
    }

    /// Load from a `.yaml`/`.yml` or `.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("cannot read configuration file {}", path.display()),
                ErrorContext::new().with_details(e.to_string()).with_source("client_config"),
            )
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    /// Apply `RESILIENT_HTTP_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|k| std::env::var(k).ok())
    }

    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secs) = env_parse::<u64, _>(&lookup, ENV_TIMEOUT_SECS)? {
            self.timeout_ms = Some(secs.saturating_mul(1000));
        }
        if let Some(v) = env_parse::<u32, _>(&lookup, ENV_MAX_RETRIES)? {
            self.retry.max_retries = Some(v);
        }
        if let Some(v) = env_parse::<BackoffStrategy, _>(&lookup, ENV_BACKOFF)? {
            self.retry.backoff = Some(v);
        }
        if let Some(v) = env_parse::<JitterMode, _>(&lookup, ENV_JITTER)? {
            self.retry.jitter = Some(v);
        }
        if let Some(v) = env_parse::<u64, _>(&lookup, ENV_DELAY_FACTOR_MS)? {
            self.retry.delay_factor_ms = Some(v);
        }
        self.transport.apply_env_from(lookup)
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        let d = RetryPolicy::default();
        let policy = RetryPolicy {
            max_retries: self.retry.max_retries.unwrap_or(d.max_retries),
            backoff_strategy: self.retry.backoff.unwrap_or(d.backoff_strategy),
            delay_factor_ms: self.retry.delay_factor_ms.unwrap_or(d.delay_factor_ms),
            jitter_mode: self.retry.jitter.unwrap_or(d.jitter_mode),
            max_delay_ms: self.retry.max_delay_ms,
            ..d
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn idempotency_policy(&self) -> Result<IdempotencyPolicy> {
        let cfg = &self.idempotency;
        let mut policy = IdempotencyPolicy::default();
        policy.enabled = cfg.enabled.unwrap_or(false);
        policy.applicable_methods = match &cfg.methods {
            Some(names) => names
                .iter()
                .map(|name| parse_method(name))
                .collect::<Result<_>>()?,
            None => default_methods(),
        };
        if let Some(header) = &cfg.header_name {
            policy.header_name = header.clone();
        }
        policy.key_generator = cfg.key_generator.map(|kind| match kind {
            KeyGeneratorKind::Sequential => KeyGenerator::sequential(),
            KeyGeneratorKind::Uuid => KeyGenerator::uuid(),
        });
        Ok(policy)
    }
}

fn parse_method(name: &str) -> Result<Method> {
    Method::from_bytes(name.trim().to_ascii_uppercase().as_bytes()).map_err(|e| {
        Error::configuration_with_context(
            format!("invalid HTTP method '{}'", name),
            ErrorContext::new()
                .with_field_path("idempotency.methods")
                .with_details(e.to_string()),
        )
    })
}

fn env_parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>().map(Some).map_err(|e| {
        Error::configuration_with_context(
            format!("invalid value '{}' for {}", raw, key),
            ErrorContext::new()
                .with_field_path(key)
                .with_details(e.to_string())
                .with_source("environment"),
        )
    })
}
