use super::{FailedRequest, FailureKind, Response, ResponseBody, Transport, TransportFailure, TransportRequest};
use crate::config::TransportConfig;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use reqwest::Proxy;
use std::time::Duration;

/// reqwest-backed [`Transport`].
///
/// Connection pooling, TLS and redirects are whatever reqwest does; this type
/// only maps reqwest outcomes onto the transport contract.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build with defaults, overridden by `RESILIENT_HTTP_*` environment variables.
    pub fn new() -> Result<Self> {
        let mut config = TransportConfig::default();
        config.apply_env()?;
        Self::from_config(&config)
    }

    pub fn from_config(config: &TransportConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.unwrap_or(30)))
            .pool_max_idle_per_host(config.pool_max_idle_per_host.unwrap_or(32))
            .pool_idle_timeout(Some(Duration::from_secs(
                config.pool_idle_timeout_secs.unwrap_or(90),
            )));

        if let Some(proxy_url) = &config.proxy_url {
            let proxy = Proxy::all(proxy_url).map_err(|e| {
                Error::configuration_with_context(
                    format!("invalid proxy url '{}'", proxy_url),
                    ErrorContext::new()
                        .with_field_path("transport.proxy_url")
                        .with_details(e.to_string()),
                )
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Wrap an already configured reqwest client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn failure_from_reqwest(err: reqwest::Error, request: &TransportRequest) -> TransportFailure {
        // The URL is request data, not failure text; keep it out of the classified message.
        let err = err.without_url();
        let mut failure = TransportFailure::new().with_message(err.to_string());

        if err.is_builder() {
            // Never left the client.
            return failure.with_kind(FailureKind::TypeMismatch);
        }

        failure = failure.with_request(FailedRequest::from(request));
        if err.is_timeout() {
            failure = failure.with_code("ETIMEDOUT").with_timed_out(true);
        } else if err.is_connect() {
            failure = failure.with_code("ECONNREFUSED");
        } else if err.is_decode() {
            failure = failure.with_kind(FailureKind::Syntax);
        } else if err.is_body() || err.is_request() {
            failure = failure.with_code("ECONNRESET");
        }
        failure
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> std::result::Result<Response, TransportFailure> {
        let mut req = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());

        if let Some(body) = &request.body {
            req = req.json(body);
        }
        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Self::failure_from_reqwest(e, &request))?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let content_type = super::header_first(&headers, &["content-type"]);
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Self::failure_from_reqwest(e, &request))?;

        // Success bodies that claim JSON must parse; error bodies are kept as text.
        let is_json = content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false);
        if status.is_success() && is_json && !bytes.is_empty() {
            if let Err(e) = serde_json::from_slice::<serde_json::Value>(&bytes) {
                return Err(TransportFailure::new()
                    .with_message(format!("Failed to parse response JSON: {}", e))
                    .with_kind(FailureKind::Syntax)
                    .with_request(FailedRequest::from(&request)));
            }
        }

        let response = Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body: ResponseBody::from_bytes(content_type.as_deref(), bytes),
        };

        if !status.is_success() {
            return Err(TransportFailure::from_response(&request, response));
        }
        Ok(response)
    }

    fn name(&self) -> &'static str {
        "reqwest"
    }
}
