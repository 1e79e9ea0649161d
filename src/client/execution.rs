//! Request execution: path resolution, config merge, idempotency key
//! assignment, dispatch with retries, and typed error construction.

use std::collections::BTreeMap;
use std::time::{Duration, Instant, SystemTime};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::core::Client;
use super::error_classification::{classify, classify_http_status, ClassifiedError};
use super::path::{join_url, resolve_path};
use super::policy::{Decision, RetryEvent, RetryPolicy};
use super::request::{ErrorMessageExtractor, RequestOptions};
use crate::error::RequestMetadata;
use crate::error_code::{codes, ErrorType};
use crate::hooks::ErrorHandling;
use crate::idempotency::{signature_of_value, IdempotencyPolicy, RequestSignature, SignatureError};
use crate::transport::{FailedRequest, Response, TransportFailure, TransportRequest};
use crate::{Error, ErrorContext, Result};

const REDACTED_HEADERS: &[&str] = &["authorization", "proxy-authorization", "cookie", "x-api-key"];

/// Result of one dispatch; `None` means the caller cancelled.
type Attempt = Option<std::result::Result<Response, TransportFailure>>;

impl Client {
    /// Execute one logical request, retrying per the merged retry policy.
    pub async fn execute(&self, opts: RequestOptions) -> Result<Response> {
        let RequestOptions {
            method,
            url,
            body,
            headers: extra_headers,
            timeout,
            path_params,
            retry,
            idempotency,
            error_message,
            cancel,
        } = opts;

        // Init -> PathResolved
        let path = resolve_path(&url, &path_params)?;
        let url = join_url(self.base_url.as_deref(), &path);

        // PathResolved -> ConfigMerged
        let retry = self.retry.merged(&retry);
        retry.validate()?;
        let idem = self.idempotency.merged(&idempotency);
        let extractor = error_message.unwrap_or_else(|| self.error_message.clone());
        let headers = self.merge_headers(&extra_headers)?;

        let mut request = TransportRequest {
            method,
            url,
            headers,
            body: None,
            timeout: timeout.or(self.timeout),
        };

        request.body = match body {
            Some(Ok(value)) => Some(value),
            Some(Err(e)) => {
                let cause = SignatureError::Body(e);
                debug!(method = %request.method, url = %request.url, "request body rejected before dispatch");
                return Err(Error::Serialization {
                    message: cause.to_string(),
                    is_retriable: false,
                    metadata: Box::new(self.request_metadata(&request, 0)),
                    cause: Some(Box::new(cause)),
                });
            }
            None => None,
        };

        // ConfigMerged -> KeyAssigned
        let signature = self.assign_idempotency_key(&mut request, &idem, idempotency.key.as_deref())?;

        // KeyAssigned -> Dispatched
        self.hooks.pre_request(&mut request).await?;
        self.run_attempts(request, &retry, &extractor, signature, cancel.as_ref())
            .await
    }

    fn merge_headers(&self, extra: &[(String, String)]) -> Result<HeaderMap> {
        let mut headers = self.default_headers.clone();
        for (name, value) in extra {
            let invalid = |details: String| {
                Error::validation_with_context(
                    format!("invalid header '{}'", name),
                    ErrorContext::new()
                        .with_field_path(format!("headers.{}", name))
                        .with_details(details)
                        .with_source("request_options"),
                )
            };
            let n = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
            let v = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
            headers.insert(n, v);
        }
        Ok(headers)
    }

    /// Inject the idempotency header when the policy applies.
    ///
    /// Returns the signature whose store entry must be cleared on success, or
    /// `None` when no store entry is involved (policy off, manual key, or a
    /// header the caller set explicitly).
    fn assign_idempotency_key(
        &self,
        request: &mut TransportRequest,
        policy: &IdempotencyPolicy,
        manual_key: Option<&str>,
    ) -> Result<Option<RequestSignature>> {
        if !policy.applies_to(&request.method) {
            return Ok(None);
        }

        let header = HeaderName::from_bytes(policy.header_name.as_bytes()).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid idempotency header name '{}'", policy.header_name),
                ErrorContext::new()
                    .with_field_path("idempotency.header_name")
                    .with_details(e.to_string()),
            )
        })?;
        if request.headers.contains_key(&header) {
            return Ok(None);
        }

        let (key, signature) = match manual_key {
            Some(k) => (k.to_string(), None),
            None => {
                let sig = signature_of_value(request.method.as_str(), &request.url, request.body.as_ref());
                let key = self.store.get_or_create_with(&sig, &policy.generator());
                (key, Some(sig))
            }
        };

        let value = HeaderValue::from_str(&key).map_err(|e| {
            Error::validation_with_context(
                "idempotency key is not a valid header value",
                ErrorContext::new()
                    .with_field_path("idempotency.key")
                    .with_details(e.to_string())
                    .with_source("idempotency"),
            )
        })?;
        request.headers.insert(header, value);
        Ok(signature)
    }

    async fn run_attempts(
        &self,
        request: TransportRequest,
        retry: &RetryPolicy,
        extractor: &ErrorMessageExtractor,
        signature: Option<RequestSignature>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Response> {
        let started = Instant::now();
        let mut retries_done: u32 = 0;

        loop {
            debug!(
                method = %request.method,
                url = %request.url,
                attempt = retries_done + 1,
                transport = self.transport.name(),
                "dispatching request"
            );

            let outcome = match self.dispatch(&request, cancel).await {
                Some(outcome) => outcome,
                None => return Err(self.cancelled(&request, retries_done)),
            };

            let failure = match outcome {
                Ok(response) if response.is_success() => {
                    if let Some(sig) = &signature {
                        self.store.clear(sig);
                    }
                    let metadata = self.request_metadata(&request, retries_done);
                    let mut response = response;
                    self.hooks.post_response(&metadata, &mut response).await?;
                    return Ok(response);
                }
                // A transport that hands back an error status directly is treated as failing.
                Ok(response) => TransportFailure::from_response(&request, response),
                Err(failure) => failure,
            };

            let classified = classify(&failure);
            let metadata = self.request_metadata(&request, retries_done);
            let retry_after = failure
                .response
                .as_ref()
                .and_then(|r| r.header_first(&["retry-after"]));

            match retry.decide(&metadata, &classified, retries_done, retry_after.as_deref()) {
                Decision::Retry { attempt, delay } => {
                    warn!(
                        method = %request.method,
                        url = %request.url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error_type = classified.error_type.as_str(),
                        status = classified.status_code,
                        "request failed, retrying"
                    );
                    if let Some(on_retry) = &retry.on_retry {
                        on_retry(&RetryEvent {
                            request: &metadata,
                            error: &classified,
                            failure: &failure,
                            attempt,
                            delay,
                        });
                    }
                    if !backoff_sleep(delay, cancel).await {
                        return Err(self.cancelled(&request, retries_done));
                    }
                    retries_done = attempt;
                }
                Decision::Fail => {
                    let is_retriable = retry.is_retriable(&metadata, &classified);
                    info!(
                        method = %request.method,
                        url = %request.url,
                        http_status = classified.status_code,
                        error_type = classified.error_type.as_str(),
                        retry_count = retries_done,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "request failed"
                    );
                    return match self.hooks.on_error(&failure, &metadata).await {
                        ErrorHandling::Raise(err) => Err(err),
                        ErrorHandling::Recover(response) => Ok(response),
                        ErrorHandling::Default => Err(typed_error(
                            failure,
                            classified,
                            is_retriable,
                            metadata,
                            extractor,
                        )),
                    };
                }
            }
        }
    }

    async fn dispatch(&self, request: &TransportRequest, cancel: Option<&CancellationToken>) -> Attempt {
        let send = self.send_with_timeout(request);
        match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => None,
                outcome = send => Some(outcome),
            },
            None => Some(send.await),
        }
    }

    async fn send_with_timeout(
        &self,
        request: &TransportRequest,
    ) -> std::result::Result<Response, TransportFailure> {
        let Some(limit) = request.timeout else {
            return self.transport.send(request.clone()).await;
        };
        match tokio::time::timeout(limit, self.transport.send(request.clone())).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TransportFailure::new()
                .with_code("ETIMEDOUT")
                .with_message(format!("timeout of {}ms exceeded", limit.as_millis()))
                .with_request(FailedRequest::from(request))
                .with_timed_out(true)),
        }
    }

    fn cancelled(&self, request: &TransportRequest, retries_done: u32) -> Error {
        debug!(method = %request.method, url = %request.url, "request cancelled");
        Error::Cancelled {
            metadata: Box::new(self.request_metadata(request, retries_done)),
        }
    }

    pub(crate) fn request_metadata(&self, request: &TransportRequest, retry_count: u32) -> RequestMetadata {
        RequestMetadata {
            method: request.method.to_string(),
            url: request.url.clone(),
            base_url: self.base_url.clone(),
            headers: header_snapshot(&request.headers),
            timeout_ms: request.timeout.map(|t| t.as_millis() as u64),
            timestamp: SystemTime::now(),
            retry_count,
            client_name: self.name.clone(),
        }
    }
}

/// Sleep for `delay`; `false` if cancelled first.
async fn backoff_sleep(delay: Duration, cancel: Option<&CancellationToken>) -> bool {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        },
        None => {
            tokio::time::sleep(delay).await;
            true
        }
    }
}

fn header_snapshot(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = if REDACTED_HEADERS.contains(&name.as_str()) {
                "[redacted]".to_string()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            (name.as_str().to_string(), value)
        })
        .collect()
}

/// Build the typed error for a final failure. The raw failure becomes the cause.
fn typed_error(
    failure: TransportFailure,
    classified: ClassifiedError,
    is_retriable: bool,
    metadata: RequestMetadata,
    extractor: &ErrorMessageExtractor,
) -> Error {
    let metadata = Box::new(metadata);
    let message = failure.to_string();

    match (classified.error_type, failure.response.clone()) {
        (ErrorType::Http, Some(response)) => {
            let status = classified.status_code.unwrap_or(response.status);
            let category = classified
                .category
                .unwrap_or_else(|| classify_http_status(status));
            let fallback = if response.status_text.is_empty() {
                message
            } else {
                response.status_text.clone()
            };
            Error::Http {
                status,
                status_text: response.status_text,
                category,
                message: extractor.extract(&response.body, &fallback),
                body: response.body,
                is_retriable,
                metadata,
                cause: Some(Box::new(failure)),
            }
        }
        (ErrorType::Timeout, _) => Error::Timeout {
            message,
            is_retriable,
            metadata,
            cause: Some(Box::new(failure)),
        },
        (ErrorType::Serialization, _) => Error::Serialization {
            message,
            is_retriable,
            metadata,
            cause: Some(Box::new(failure)),
        },
        (ErrorType::Unknown, _) => Error::Network {
            message,
            code: codes::UNKNOWN_ERROR,
            is_retriable,
            metadata,
            cause: Some(Box::new(failure)),
        },
        (ErrorType::Network, _) | (ErrorType::Http, None) => Error::Network {
            message,
            code: codes::NETWORK_ERROR,
            is_retriable,
            metadata,
            cause: Some(Box::new(failure)),
        },
    }
}
