//! reqwest transport against a mock HTTP server.

use mockito::{Matcher, Server};
use resilient_http::resilience::{BackoffStrategy, JitterMode};
use resilient_http::transport::HttpTransport;
use resilient_http::{
    Client, Error, HttpErrorCategory, IdempotencyPolicy, RequestOptions, ResponseBody, RetryPolicy,
};
use serde_json::json;
use std::sync::Arc;

fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy::default()
        .with_max_retries(max_retries)
        .with_backoff(BackoffStrategy::None, 1)
        .with_jitter(JitterMode::None)
}

fn client_for(base_url: &str, max_retries: u32) -> Client {
    Client::builder()
        .name("mock")
        .base_url(base_url)
        .retry_policy(fast_retry(max_retries))
        .idempotency(IdempotencyPolicy::enabled())
        .error_message(resilient_http::client::ErrorMessageExtractor::path("error.message"))
        .transport(Arc::new(HttpTransport::with_client(reqwest::Client::new())))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_server_error_is_retried_then_raised() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/status")
        .with_status(503)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":{"message":"maintenance"}}"#)
        .expect(3)
        .create_async()
        .await;

    let client = client_for(&format!("{}/v1", server.url()), 2);
    let err = client.get("/status").await.unwrap_err();

    match &err {
        Error::Http {
            status,
            category,
            message,
            body,
            metadata,
            ..
        } => {
            assert_eq!(*status, 503);
            assert_eq!(*category, HttpErrorCategory::ServerError);
            assert_eq!(message, "maintenance");
            assert_eq!(body, &ResponseBody::Json(json!({"error": {"message": "maintenance"}})));
            assert_eq!(metadata.retry_count, 2);
        }
        other => panic!("expected http error, got {:?}", other),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_post_carries_idempotency_key_and_body() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/orders/42/items")
        .match_header("idempotency-key", Matcher::Regex(r"^idem-[0-9a-f]+-[0-9a-f]+$".into()))
        .match_body(Matcher::Json(json!({"sku": "A-1"})))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"item-1"}"#)
        .create_async()
        .await;

    let client = client_for(&server.url(), 0);
    let resp = client
        .execute(
            RequestOptions::post("/orders/:order/items")
                .path_param("order", 42)
                .json(&json!({"sku": "A-1"})),
        )
        .await
        .unwrap();

    assert_eq!(resp.status, 201);
    assert_eq!(resp.body.json::<serde_json::Value>().unwrap()["id"], "item-1");
    assert!(client.idempotency_store().is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_malformed_success_json_is_serialization_error() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/broken")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("{not json")
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server.url(), 3);
    let err = client.get("/broken").await.unwrap_err();
    assert!(matches!(err, Error::Serialization { is_retriable: false, .. }), "{:?}", err);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_rate_limit_with_retry_after_zero() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("DELETE", "/sessions/abc")
        .with_status(429)
        .with_header("retry-after", "0")
        .with_body("slow down")
        .expect(2)
        .create_async()
        .await;

    let client = client_for(&server.url(), 1);
    let err = client.delete("/sessions/abc").await.unwrap_err();
    assert_eq!(err.category(), Some(HttpErrorCategory::RateLimit));
    assert!(err.is_retriable());
    // no JSON body: message falls back to the status text
    match err {
        Error::Http { message, .. } => assert_eq!(message, "Too Many Requests"),
        other => panic!("expected http error, got {:?}", other),
    }
    mock.assert_async().await;
}

/// Bind then drop a listener to get a port nothing is listening on.
fn refused_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port())
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let client = client_for(&refused_base_url(), 0);

    let err = client.get("/x").await.unwrap_err();
    assert!(matches!(err, Error::Network { is_retriable: true, .. }), "{:?}", err);
    assert_eq!(err.code(), "NETWORK_ERROR");
}

#[tokio::test]
async fn test_url_text_does_not_drive_classification() {
    let client = client_for(&refused_base_url(), 2);
    for path in ["/export.json", "/v1/parse", "/deserialize", "/timeout/status"] {
        let err = client.get(path).await.unwrap_err();
        assert!(matches!(err, Error::Network { is_retriable: true, .. }), "{}: {:?}", path, err);
        assert_eq!(err.code(), "NETWORK_ERROR", "{}", path);
        assert_eq!(err.metadata().map(|m| m.retry_count), Some(2), "{}", path);
    }
}

#[tokio::test]
async fn test_failure_message_omits_request_url() {
    use resilient_http::transport::{Transport, TransportRequest};

    let base = refused_base_url();
    let transport = HttpTransport::with_client(reqwest::Client::new());
    let request = TransportRequest {
        method: reqwest::Method::GET,
        url: format!("{}/data.json", base),
        headers: reqwest::header::HeaderMap::new(),
        body: None,
        timeout: None,
    };
    let failure = transport.send(request).await.unwrap_err();

    assert_eq!(failure.code.as_deref(), Some("ECONNREFUSED"));
    let message = failure.message.clone().unwrap_or_default();
    assert!(!message.contains("data.json"), "{}", message);
    assert_eq!(
        resilient_http::client::classify(&failure).error_type,
        resilient_http::ErrorType::Network
    );
}
