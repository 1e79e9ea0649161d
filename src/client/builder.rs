use crate::client::core::Client;
use crate::client::policy::RetryPolicy;
use crate::client::request::ErrorMessageExtractor;
use crate::config::ClientConfig;
use crate::hooks::{HookPipeline, RequestHooks};
use crate::idempotency::store::{DEFAULT_CAPACITY, DEFAULT_TTL};
use crate::idempotency::{IdempotencyKeyStore, IdempotencyPolicy};
use crate::transport::{HttpTransport, Transport};
use crate::{Error, ErrorContext, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CLIENT_NAME: &str = "resilient-http";

/// Builder for [`Client`].
///
/// Everything is optional. Without an explicit transport a reqwest-backed
/// [`HttpTransport`] is created from `RESILIENT_HTTP_*` environment settings.
pub struct ClientBuilder {
    name: String,
    base_url: Option<String>,
    headers: Vec<(String, String)>,
    timeout: Option<Duration>,
    retry: RetryPolicy,
    idempotency: IdempotencyPolicy,
    error_message: ErrorMessageExtractor,
    hooks: HookPipeline,
    transport: Option<Arc<dyn Transport>>,
    store_capacity: usize,
    store_ttl: Duration,
    config: Option<ClientConfig>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            name: DEFAULT_CLIENT_NAME.to_string(),
            base_url: None,
            headers: Vec::new(),
            timeout: None,
            retry: RetryPolicy::default(),
            idempotency: IdempotencyPolicy::default(),
            error_message: ErrorMessageExtractor::default(),
            hooks: HookPipeline::new(),
            transport: None,
            store_capacity: DEFAULT_CAPACITY,
            store_ttl: DEFAULT_TTL,
            config: None,
        }
    }

    /// Seed the builder from a loaded configuration. Later builder calls win.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let mut builder = Self::new()
            .retry_policy(config.retry_policy()?)
            .idempotency(config.idempotency_policy()?);
        if let Some(name) = &config.name {
            builder = builder.name(name.clone());
        }
        if let Some(base_url) = &config.base_url {
            builder = builder.base_url(base_url.clone());
        }
        if let Some(ms) = config.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        for (name, value) in &config.headers {
            builder = builder.header(name.clone(), value.clone());
        }
        if let Some(path) = &config.error_message_path {
            builder = builder.error_message(ErrorMessageExtractor::path(path.clone()));
        }
        if let Some(ttl) = config.idempotency.ttl_secs {
            builder = builder.idempotency_store_ttl(Duration::from_secs(ttl));
        }
        if let Some(cap) = config.idempotency.capacity {
            builder = builder.idempotency_store_capacity(cap);
        }
        builder.config = Some(config);
        Ok(builder)
    }

    /// Name reported in error metadata.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Default header sent with every request; per-request headers win by name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn idempotency(mut self, policy: IdempotencyPolicy) -> Self {
        self.idempotency = policy;
        self
    }

    pub fn error_message(mut self, extractor: ErrorMessageExtractor) -> Self {
        self.error_message = extractor;
        self
    }

    pub fn hook<H: RequestHooks + 'static>(mut self, hook: H) -> Self {
        self.hooks = self.hooks.with(hook);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn idempotency_store_capacity(mut self, capacity: usize) -> Self {
        self.store_capacity = capacity;
        self
    }

    pub fn idempotency_store_ttl(mut self, ttl: Duration) -> Self {
        self.store_ttl = ttl;
        self
    }

    pub fn build(self) -> Result<Client> {
        if let Some(base) = &self.base_url {
            url::Url::parse(base).map_err(|e| {
                Error::configuration_with_context(
                    format!("invalid base url '{}'", base),
                    ErrorContext::new()
                        .with_field_path("base_url")
                        .with_details(e.to_string())
                        .with_source("client_builder"),
                )
            })?;
        }
        self.retry.validate()?;
        if self.idempotency.enabled {
            HeaderName::from_bytes(self.idempotency.header_name.as_bytes()).map_err(|e| {
                Error::configuration_with_context(
                    format!("invalid idempotency header name '{}'", self.idempotency.header_name),
                    ErrorContext::new()
                        .with_field_path("idempotency.header_name")
                        .with_details(e.to_string())
                        .with_source("client_builder"),
                )
            })?;
        }

        let mut default_headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let invalid = |details: String| {
                Error::configuration_with_context(
                    format!("invalid default header '{}'", name),
                    ErrorContext::new()
                        .with_field_path(format!("headers.{}", name))
                        .with_details(details)
                        .with_source("client_builder"),
                )
            };
            let n = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
            let v = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
            default_headers.insert(n, v);
        }

        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => match &self.config {
                Some(cfg) => Arc::new(HttpTransport::from_config(&cfg.transport)?),
                None => Arc::new(HttpTransport::new()?),
            },
        };

        Ok(Client {
            name: self.name,
            base_url: self.base_url,
            default_headers,
            timeout: self.timeout,
            retry: self.retry,
            idempotency: self.idempotency,
            error_message: self.error_message,
            hooks: self.hooks,
            transport,
            store: Arc::new(IdempotencyKeyStore::with_capacity(self.store_capacity).with_ttl(self.store_ttl)),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Response, ResponseBody, TransportFailure, TransportRequest};
    use async_trait::async_trait;

    struct Never;

    #[async_trait]
    impl Transport for Never {
        async fn send(&self, _request: TransportRequest) -> std::result::Result<Response, TransportFailure> {
            Ok(Response::new(204, ResponseBody::Empty))
        }
    }

    #[test]
    fn test_rejects_bad_base_url_and_headers() {
        let err = ClientBuilder::new()
            .transport(Arc::new(Never))
            .base_url("not a url")
            .build()
            .unwrap_err();
        assert_eq!(err.context().and_then(|c| c.field_path.as_deref()), Some("base_url"));

        let err = ClientBuilder::new()
            .transport(Arc::new(Never))
            .header("bad header", "x")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_each_client_owns_its_store() {
        let a = ClientBuilder::new().transport(Arc::new(Never)).build().unwrap();
        let b = ClientBuilder::new().transport(Arc::new(Never)).build().unwrap();
        assert!(!Arc::ptr_eq(&a.store, &b.store));
        let a2 = a.clone();
        assert!(Arc::ptr_eq(&a.store, &a2.store));
    }

    #[test]
    fn test_from_config() {
        let cfg = ClientConfig::from_yaml_str(
            "name: orders\nbase_url: https://api.example.com\nidempotency:\n  enabled: true\n  capacity: 16\n",
        )
        .unwrap();
        let client = ClientBuilder::from_config(cfg)
            .unwrap()
            .transport(Arc::new(Never))
            .build()
            .unwrap();
        assert_eq!(client.name(), "orders");
        assert!(client.idempotency_policy().enabled);
        assert_eq!(client.idempotency_store().capacity(), 16);
    }
}
