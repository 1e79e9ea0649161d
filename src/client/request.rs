//! Per-request configuration surface.

use crate::client::policy::RetryOverride;
use crate::idempotency::IdempotencyOverride;
use crate::transport::ResponseBody;
use crate::utils::json_path::PathMapper;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_ERROR_MESSAGE_PATH: &str = "message";

/// Pulls a human-readable message out of an error response body.
#[derive(Clone)]
pub enum ErrorMessageExtractor {
    /// Dot-path into the JSON body, e.g. `error.message`.
    Path(String),
    Custom(Arc<dyn Fn(&ResponseBody) -> Option<String> + Send + Sync>),
}

impl ErrorMessageExtractor {
    pub fn path(path: impl Into<String>) -> Self {
        Self::Path(path.into())
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&ResponseBody) -> Option<String> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Extracted message, or `fallback` when extraction yields nothing.
    pub fn extract(&self, body: &ResponseBody, fallback: &str) -> String {
        let found = match self {
            Self::Path(path) => body
                .as_json()
                .and_then(|json| PathMapper::get_string(&json, path)),
            Self::Custom(f) => f(body),
        };
        found
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }
}

impl Default for ErrorMessageExtractor {
    fn default() -> Self {
        Self::Path(DEFAULT_ERROR_MESSAGE_PATH.to_string())
    }
}

impl fmt::Debug for ErrorMessageExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => f.debug_tuple("Path").field(p).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One logical request.
///
/// The URL may contain `:name` placeholders filled from [`path_param`](Self::path_param).
/// Unset overrides fall back to the client defaults field by field.
///
/// ```rust
/// use resilient_http::RequestOptions;
/// use resilient_http::client::RetryOverride;
/// use serde_json::json;
///
/// let opts = RequestOptions::post("/orgs/:org/invites")
///     .path_param("org", "acme")
///     .json(&json!({"email": "a@example.com"}))
///     .timeout_ms(2_000)
///     .retry(RetryOverride::new().max_retries(1));
/// # let _ = opts;
/// ```
pub struct RequestOptions {
    pub(crate) method: Method,
    pub(crate) url: String,
    pub(crate) body: Option<serde_json::Result<Value>>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) path_params: BTreeMap<String, String>,
    pub(crate) retry: RetryOverride,
    pub(crate) idempotency: IdempotencyOverride,
    pub(crate) error_message: Option<ErrorMessageExtractor>,
    pub(crate) cancel: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: None,
            headers: Vec::new(),
            timeout: None,
            path_params: BTreeMap::new(),
            retry: RetryOverride::default(),
            idempotency: IdempotencyOverride::default(),
            error_message: None,
            cancel: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self::new(Method::HEAD, url)
    }

    pub fn options(url: impl Into<String>) -> Self {
        Self::new(Method::OPTIONS, url)
    }

    /// JSON body. Serialization errors surface when the request is executed,
    /// before anything is sent.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Self {
        self.body = Some(serde_json::to_value(body));
        self
    }

    pub fn body_value(mut self, body: Value) -> Self {
        self.body = Some(Ok(body));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout_ms(self, ms: u64) -> Self {
        self.timeout(Duration::from_millis(ms))
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.path_params.insert(name.into(), value.to_string());
        self
    }

    pub fn retry(mut self, retry: RetryOverride) -> Self {
        self.retry = retry;
        self
    }

    pub fn idempotency(mut self, idempotency: IdempotencyOverride) -> Self {
        self.idempotency = idempotency;
        self
    }

    /// Use `key` verbatim as the idempotency key; the key store is bypassed.
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency.key = Some(key.into());
        self
    }

    pub fn error_message_path(mut self, path: impl Into<String>) -> Self {
        self.error_message = Some(ErrorMessageExtractor::path(path));
        self
    }

    pub fn error_message_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&ResponseBody) -> Option<String> + Send + Sync + 'static,
    {
        self.error_message = Some(ErrorMessageExtractor::custom(f));
        self
    }

    /// Cancelling the token aborts the in-flight attempt or backoff wait.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("has_body", &self.body.is_some())
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("path_params", &self.path_params)
            .field("retry", &self.retry)
            .field("idempotency", &self.idempotency)
            .field("error_message", &self.error_message)
            .finish_non_exhaustive()
    }
}
