//! Resilience patterns walkthrough
//!
//! Runs offline against an in-memory transport that fails a few times before
//! answering, and shows retries, idempotency keys and typed errors.
//!
//! Usage:
//!   RUST_LOG=resilient_http=debug cargo run --example resilience_patterns

use async_trait::async_trait;
use resilient_http::client::RetryOverride;
use resilient_http::resilience::{BackoffStrategy, JitterMode};
use resilient_http::transport::{FailedRequest, Response, ResponseBody, Transport, TransportFailure, TransportRequest};
use resilient_http::{Client, Error, IdempotencyPolicy, KeyGenerator, RequestOptions, RetryPolicy};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Fails every request `failures` times per URL path, then succeeds.
struct FlakyBackend {
    failures: u32,
    calls: AtomicU32,
}

#[async_trait]
impl Transport for FlakyBackend {
    async fn send(&self, request: TransportRequest) -> Result<Response, TransportFailure> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let key = request
            .headers
            .get("idempotency-key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        println!("  -> {} {} (call {}, idempotency-key {})", request.method, request.url, n + 1, key);

        if request.url.ends_with("/missing") {
            let resp = Response::new(404, ResponseBody::Json(json!({"message": "no such widget"})));
            return Err(TransportFailure::from_response(&request, resp));
        }
        if n % (self.failures + 1) < self.failures {
            return Err(TransportFailure::new()
                .with_code("ECONNRESET")
                .with_message("socket hang up")
                .with_request(FailedRequest::from(&request)));
        }
        Ok(Response::new(200, ResponseBody::Json(json!({"ok": true, "call": n + 1}))))
    }

    fn name(&self) -> &'static str {
        "flaky-demo"
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let client = Client::builder()
        .name("demo")
        .base_url("https://widgets.example.com/v1")
        .retry_policy(
            RetryPolicy::default()
                .with_max_retries(3)
                .with_backoff(BackoffStrategy::Exponential, 50)
                .with_jitter(JitterMode::Equal)
                .with_on_retry(|ev| {
                    println!(
                        "  retry #{} in {:?} after {:?}",
                        ev.attempt, ev.delay, ev.error.error_type
                    )
                }),
        )
        .idempotency(IdempotencyPolicy::enabled().with_key_generator(KeyGenerator::uuid()))
        .transport(Arc::new(FlakyBackend {
            failures: 2,
            calls: AtomicU32::new(0),
        }))
        .build()?;

    println!("1. POST with retries; every attempt carries the same key");
    let resp = client
        .execute(
            RequestOptions::post("/widgets/:id/orders")
                .path_param("id", "w 42")
                .json(&json!({"qty": 3})),
        )
        .await?;
    println!("   status {} body {:?}", resp.status, resp.body);
    println!("   pending keys after success: {}", client.idempotency_store().len());

    println!("\n2. A 404 is not retried and comes back typed");
    match client.get("/widgets/missing").await {
        Err(Error::Http { status, category, message, .. }) => {
            println!("   {} {}: {}", status, category, message)
        }
        other => println!("   unexpected: {:?}", other.map(|r| r.status)),
    }

    println!("\n3. Per-request override: no retries at all");
    match client
        .execute(RequestOptions::get("/widgets").retry(RetryOverride::new().max_retries(0)))
        .await
    {
        Ok(resp) => println!("   status {}", resp.status),
        Err(e) => println!("   {} (code {}, retriable {})", e, e.code(), e.is_retriable()),
    }

    Ok(())
}
