//! Transport boundary.
//!
//! The executor never opens sockets itself: it hands a [`TransportRequest`] to
//! a [`Transport`] and receives either a [`Response`] or a
//! [`TransportFailure`]. Non-2xx answers are failures that carry the response.

mod http;

pub use http::HttpTransport;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

/// One outgoing attempt, fully resolved.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
}

/// Decoded response payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ResponseBody {
    #[default]
    Empty,
    Json(Value),
    Text(String),
    Bytes(Bytes),
}

impl ResponseBody {
    /// Decode raw bytes using the response content type.
    ///
    /// JSON content that fails to parse falls back to text so that error
    /// bodies are never lost.
    pub fn from_bytes(content_type: Option<&str>, bytes: Bytes) -> Self {
        if bytes.is_empty() {
            return ResponseBody::Empty;
        }
        let ct = content_type.unwrap_or("").to_ascii_lowercase();
        if ct.contains("json") {
            if let Ok(v) = serde_json::from_slice::<Value>(&bytes) {
                return ResponseBody::Json(v);
            }
        }
        if ct.is_empty() || ct.starts_with("text/") || ct.contains("json") || ct.contains("xml") {
            return match String::from_utf8(bytes.to_vec()) {
                Ok(s) => ResponseBody::Text(s),
                Err(_) => ResponseBody::Bytes(bytes),
            };
        }
        ResponseBody::Bytes(bytes)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Empty)
    }

    /// JSON view of the body; text bodies are parsed opportunistically.
    pub fn as_json(&self) -> Option<Cow<'_, Value>> {
        match self {
            ResponseBody::Json(v) => Some(Cow::Borrowed(v)),
            ResponseBody::Text(s) => serde_json::from_str(s).ok().map(Cow::Owned),
            ResponseBody::Bytes(b) => serde_json::from_slice(b).ok().map(Cow::Owned),
            ResponseBody::Empty => None,
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        match self {
            ResponseBody::Json(v) => T::deserialize(v),
            ResponseBody::Text(s) => serde_json::from_str(s),
            ResponseBody::Bytes(b) => serde_json::from_slice(b),
            ResponseBody::Empty => serde_json::from_str("null"),
        }
    }

    pub fn text(&self) -> Option<Cow<'_, str>> {
        match self {
            ResponseBody::Empty => None,
            ResponseBody::Json(v) => Some(Cow::Owned(v.to_string())),
            ResponseBody::Text(s) => Some(Cow::Borrowed(s)),
            ResponseBody::Bytes(b) => Some(String::from_utf8_lossy(b)),
        }
    }
}

/// Response descriptor returned by a transport.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl Response {
    pub fn new(status: u16, body: ResponseBody) -> Self {
        Self {
            status,
            status_text: status_text(status),
            headers: HeaderMap::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(n, v);
        }
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First non-empty value for any of `names`.
    pub fn header_first(&self, names: &[&str]) -> Option<String> {
        header_first(&self.headers, names)
    }
}

/// Extract the first matching header value from a list of header names.
pub fn header_first(headers: &HeaderMap, names: &[&str]) -> Option<String> {
    for name in names {
        if let Some(v) = headers.get(*name) {
            if let Ok(s) = v.to_str() {
                let s = s.trim();
                if !s.is_empty() {
                    return Some(s.to_string());
                }
            }
        }
    }
    None
}

/// Canonical reason phrase for a status, empty when unknown.
pub fn status_text(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
        .to_string()
}

/// The request a failure belongs to. Its presence means the request left the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRequest {
    pub method: String,
    pub url: String,
}

impl From<&TransportRequest> for FailedRequest {
    fn from(req: &TransportRequest) -> Self {
        Self {
            method: req.method.to_string(),
            url: req.url.clone(),
        }
    }
}

/// Declared kind of a local encode/decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Syntax,
    TypeMismatch,
}

/// Raw failure reported by a transport.
///
/// Every field is optional; the classifier decides what happened from which
/// fields are present.
#[derive(Debug, Clone, Default)]
pub struct TransportFailure {
    /// Transport-level error code, e.g. `ETIMEDOUT` or `ECONNREFUSED`.
    pub code: Option<String>,
    pub message: Option<String>,
    /// Present when the remote endpoint answered.
    pub response: Option<Response>,
    /// Present when the request was sent.
    pub request: Option<FailedRequest>,
    /// Explicit timeout / cancellation flag.
    pub timed_out: bool,
    pub kind: Option<FailureKind>,
}

impl TransportFailure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_response(mut self, response: Response) -> Self {
        self.response = Some(response);
        self
    }

    pub fn with_request(mut self, request: FailedRequest) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_timed_out(mut self, timed_out: bool) -> Self {
        self.timed_out = timed_out;
        self
    }

    pub fn with_kind(mut self, kind: FailureKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Failure for a non-2xx answer.
    pub fn from_response(request: &TransportRequest, response: Response) -> Self {
        Self::new()
            .with_message(format!("Request failed with status code {}", response.status))
            .with_request(FailedRequest::from(request))
            .with_response(response)
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.message) {
            (Some(code), Some(msg)) => write!(f, "{}: {}", code, msg),
            (Some(code), None) => f.write_str(code),
            (None, Some(msg)) => f.write_str(msg),
            (None, None) => match &self.response {
                Some(r) => write!(f, "HTTP {}", r.status),
                None => f.write_str("transport failure"),
            },
        }
    }
}

impl std::error::Error for TransportFailure {}

/// External HTTP collaborator.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one attempt. Non-2xx responses are returned as failures carrying the response.
    async fn send(&self, request: TransportRequest) -> Result<Response, TransportFailure>;

    fn name(&self) -> &'static str {
        "custom"
    }
}
