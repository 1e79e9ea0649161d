//! Idempotency keys for retried writes.
//!
//! A write request (by default `POST` and `PATCH`) gets an `Idempotency-Key`
//! header. The key is remembered per [`RequestSignature`] so every retry of
//! the same logical request, including retries the caller triggers after a
//! failure, carries the same key. The entry is dropped once the request
//! succeeds.
//!
//! ```rust
//! use resilient_http::idempotency::{signature_of, IdempotencyKeyStore};
//! use serde_json::json;
//!
//! let store = IdempotencyKeyStore::new();
//! let sig = signature_of("POST", "/orders", Some(&json!({"sku": "A-1"}))).unwrap();
//! let key = store.get_or_create(&sig);
//! assert_eq!(store.get_or_create(&sig), key);
//! store.clear(&sig);
//! assert_ne!(store.get_or_create(&sig), key);
//! ```

pub mod key;
pub mod store;

pub use key::{signature_of, signature_of_value, KeyGenerator, RequestSignature, SignatureError};
pub use store::IdempotencyKeyStore;

use reqwest::Method;
use std::collections::HashSet;

pub const DEFAULT_HEADER_NAME: &str = "Idempotency-Key";

/// When and how idempotency keys are attached.
#[derive(Debug, Clone)]
pub struct IdempotencyPolicy {
    pub enabled: bool,
    pub applicable_methods: HashSet<Method>,
    pub header_name: String,
    /// Falls back to [`KeyGenerator::sequential`] when unset.
    pub key_generator: Option<KeyGenerator>,
}

impl Default for IdempotencyPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            applicable_methods: default_methods(),
            header_name: DEFAULT_HEADER_NAME.to_string(),
            key_generator: None,
        }
    }
}

pub(crate) fn default_methods() -> HashSet<Method> {
    [Method::POST, Method::PATCH].into_iter().collect()
}

impl IdempotencyPolicy {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn with_methods<I: IntoIterator<Item = Method>>(mut self, methods: I) -> Self {
        self.applicable_methods = methods.into_iter().collect();
        self
    }

    pub fn with_header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = name.into();
        self
    }

    pub fn with_key_generator(mut self, generator: KeyGenerator) -> Self {
        self.key_generator = Some(generator);
        self
    }

    /// Keys are injected only when enabled and the method is listed.
    pub fn applies_to(&self, method: &Method) -> bool {
        self.enabled && self.applicable_methods.contains(method)
    }

    pub fn generator(&self) -> KeyGenerator {
        self.key_generator.clone().unwrap_or_default()
    }

    /// Field-by-field merge; set override fields win.
    pub fn merged(&self, o: &IdempotencyOverride) -> IdempotencyPolicy {
        IdempotencyPolicy {
            enabled: o.enabled.unwrap_or(self.enabled),
            applicable_methods: o
                .applicable_methods
                .clone()
                .unwrap_or_else(|| self.applicable_methods.clone()),
            header_name: o
                .header_name
                .clone()
                .unwrap_or_else(|| self.header_name.clone()),
            key_generator: o.key_generator.clone().or_else(|| self.key_generator.clone()),
        }
    }
}

/// Per-request idempotency overrides.
#[derive(Debug, Clone, Default)]
pub struct IdempotencyOverride {
    pub enabled: Option<bool>,
    pub applicable_methods: Option<HashSet<Method>>,
    pub header_name: Option<String>,
    pub key_generator: Option<KeyGenerator>,
    /// Manual key, used verbatim and never cached.
    pub key: Option<String>,
}

impl IdempotencyOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn methods<I: IntoIterator<Item = Method>>(mut self, methods: I) -> Self {
        self.applicable_methods = Some(methods.into_iter().collect());
        self
    }

    pub fn header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = Some(name.into());
        self
    }

    pub fn key_generator(mut self, generator: KeyGenerator) -> Self {
        self.key_generator = Some(generator);
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}
