use crate::client::policy::RetryPolicy;
use crate::client::request::{ErrorMessageExtractor, RequestOptions};
use crate::hooks::HookPipeline;
use crate::idempotency::{IdempotencyKeyStore, IdempotencyPolicy};
use crate::transport::{Response, Transport};
use crate::Result;
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Resilient HTTP client.
///
/// Cloning is cheap; clones share the transport and the idempotency key
/// store. Separately built clients never share a store.
#[derive(Clone)]
pub struct Client {
    pub(crate) name: String,
    pub(crate) base_url: Option<String>,
    pub(crate) default_headers: HeaderMap,
    pub(crate) timeout: Option<Duration>,
    pub(crate) retry: RetryPolicy,
    pub(crate) idempotency: IdempotencyPolicy,
    pub(crate) error_message: ErrorMessageExtractor,
    pub(crate) hooks: HookPipeline,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) store: Arc<IdempotencyKeyStore>,
}

impl Client {
    /// Start configuring a client.
    pub fn builder() -> super::builder::ClientBuilder {
        super::builder::ClientBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn idempotency_policy(&self) -> &IdempotencyPolicy {
        &self.idempotency
    }

    /// The idempotency key store owned by this client.
    pub fn idempotency_store(&self) -> &IdempotencyKeyStore {
        &self.store
    }

    pub async fn get(&self, url: &str) -> Result<Response> {
        self.execute(RequestOptions::get(url)).await
    }

    pub async fn delete(&self, url: &str) -> Result<Response> {
        self.execute(RequestOptions::delete(url)).await
    }

    pub async fn head(&self, url: &str) -> Result<Response> {
        self.execute(RequestOptions::head(url)).await
    }

    pub async fn options(&self, url: &str) -> Result<Response> {
        self.execute(RequestOptions::options(url)).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<Response> {
        self.execute(RequestOptions::post(url).json(body)).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<Response> {
        self.execute(RequestOptions::put(url).json(body)).await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<Response> {
        self.execute(RequestOptions::patch(url).json(body)).await
    }

    /// Start a request with full per-call options; finish with [`Client::execute`].
    pub fn request(&self, method: Method, url: impl Into<String>) -> RequestOptions {
        RequestOptions::new(method, url)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("idempotency", &self.idempotency)
            .field("transport", &self.transport.name())
            .field("pending_idempotency_keys", &self.store.len())
            .finish_non_exhaustive()
    }
}
