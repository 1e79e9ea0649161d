//! End-to-end request execution over a scripted transport.

mod common;

use common::{ScriptedTransport, Step};
use resilient_http::client::RetryOverride;
use resilient_http::resilience::{BackoffStrategy, JitterMode};
use resilient_http::transport::{Response, ResponseBody, TransportFailure, TransportRequest};
use resilient_http::{
    Client, Error, ErrorHandling, ErrorType, HttpErrorCategory, IdempotencyOverride, IdempotencyPolicy,
    RequestHooks, RequestMetadata, RequestOptions, RetryPolicy,
};
use serde::ser::{Error as _, Serialize, SerializeMap, Serializer};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

const BASE: &str = "https://api.example.com";

fn deterministic_retry() -> RetryPolicy {
    RetryPolicy::default()
        .with_max_retries(3)
        .with_backoff(BackoffStrategy::Exponential, 100)
        .with_jitter(JitterMode::None)
}

fn scenario_client(transport: &ScriptedTransport) -> Client {
    Client::builder()
        .name("scenario")
        .base_url(BASE)
        .retry_policy(deterministic_retry())
        .idempotency(IdempotencyPolicy::enabled())
        .transport(Arc::new(transport.clone()))
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_get_retries_server_errors_with_exponential_delays() {
    let transport = ScriptedTransport::new([
        Step::status(503),
        Step::status(503),
        Step::status(503),
        Step::json(200, json!({"ok": true})),
    ]);
    let client = scenario_client(&transport);

    let resp = client.get("/health").await.unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, ResponseBody::Json(json!({"ok": true})));

    assert_eq!(transport.call_count(), 4);
    assert_eq!(
        transport.gaps(),
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(400)
        ]
    );
    // GET is not an idempotent-key method by default
    assert!(transport.header_values("idempotency-key").iter().all(Option::is_none));
    assert!(client.idempotency_store().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_post_retry_reuses_idempotency_key_and_clears_on_success() {
    let url = format!("{}/orders", BASE);
    let transport = ScriptedTransport::new([Step::network(&url), Step::json(201, json!({"id": 1}))]);
    let client = scenario_client(&transport);

    let resp = client.post("/orders", &json!({"sku": "A-1"})).await.unwrap();
    assert_eq!(resp.status, 201);

    let keys = transport.header_values("idempotency-key");
    assert_eq!(keys.len(), 2);
    assert!(keys[0].is_some());
    assert_eq!(keys[0], keys[1]);
    assert!(client.idempotency_store().is_empty());
}

/// Linked node whose serializer refuses to walk a cycle.
struct Node {
    name: &'static str,
    next: RefCell<Option<Rc<Node>>>,
    visiting: RefCell<bool>,
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.visiting.replace(true) {
            return Err(S::Error::custom("circular reference in request body"));
        }
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("name", self.name)?;
        let result = map
            .serialize_entry("next", &self.next.borrow().as_deref())
            .and_then(|_| map.end());
        self.visiting.replace(false);
        result
    }
}

#[tokio::test]
async fn test_cyclic_body_fails_before_transport() {
    let transport = ScriptedTransport::default();
    let client = scenario_client(&transport);

    let node = Rc::new(Node {
        name: "a",
        next: RefCell::new(None),
        visiting: RefCell::new(false),
    });
    *node.next.borrow_mut() = Some(node.clone());

    let opts = RequestOptions::patch("/nodes/:id").path_param("id", "a").json(&*node);
    // break the cycle so the test does not leak
    node.next.borrow_mut().take();

    let err = client.execute(opts).await.unwrap_err();
    assert!(matches!(err, Error::Serialization { is_retriable: false, .. }), "{:?}", err);
    assert_eq!(err.code(), "SERIALIZATION_ERROR");
    assert_eq!(err.metadata().map(|m| m.url.as_str()), Some("https://api.example.com/nodes/a"));
    assert_eq!(transport.call_count(), 0);
    assert!(client.idempotency_store().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_is_retriable_and_reported() {
    let transport = ScriptedTransport::new([
        Step::json(429, json!({"message": "slow down"})),
        Step::json(429, json!({"message": "slow down"})),
    ]);
    let client = scenario_client(&transport);

    let err = client
        .execute(RequestOptions::get("/items").retry(RetryOverride::new().max_retries(1)))
        .await
        .unwrap_err();
    match &err {
        Error::Http {
            status,
            category,
            message,
            is_retriable,
            metadata,
            ..
        } => {
            assert_eq!(*status, 429);
            assert_eq!(*category, HttpErrorCategory::RateLimit);
            assert_eq!(message, "slow down");
            assert!(*is_retriable);
            assert_eq!(metadata.retry_count, 1);
            assert_eq!(metadata.client_name, "scenario");
        }
        other => panic!("expected http error, got {:?}", other),
    }
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_write_keeps_key_for_external_retry() {
    let transport = ScriptedTransport::new([Step::status(500), Step::status(201)]);
    let client = scenario_client(&transport);
    let body = json!({"amount": 10});

    let opts = || {
        RequestOptions::post("/payments")
            .json(&body)
            .retry(RetryOverride::new().max_retries(0))
    };
    let err = client.execute(opts()).await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(client.idempotency_store().len(), 1);

    client.execute(opts()).await.unwrap();
    let keys = transport.header_values("idempotency-key");
    assert_eq!(keys[0], keys[1]);
    assert!(client.idempotency_store().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_not_found_is_not_retried_unless_forced() {
    let transport = ScriptedTransport::new([Step::status(404), Step::status(404), Step::status(200)]);
    let client = scenario_client(&transport);

    let err = client.get("/missing").await.unwrap_err();
    assert_eq!(err.category(), Some(HttpErrorCategory::NotFound));
    assert!(!err.is_retriable());
    assert_eq!(transport.call_count(), 1);

    let forced = RetryOverride::new()
        .enable_retry(|_: &RequestMetadata, e| (e.status_code == Some(404)).then_some(true));
    let resp = client
        .execute(RequestOptions::get("/missing").retry(forced))
        .await
        .unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_force_stop_is_reflected_in_error_flag() {
    let transport = ScriptedTransport::new([Step::status(503)]);
    let client = scenario_client(&transport);

    let err = client
        .execute(RequestOptions::get("/x").retry(RetryOverride::new().enable_retry(|_, _| Some(false))))
        .await
        .unwrap_err();
    assert!(!err.is_retriable());
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_header_overrides_backoff() {
    let limited = Response::new(429, ResponseBody::Empty).with_header("retry-after", "2");
    let transport = ScriptedTransport::new([Step::Respond(limited), Step::status(200)]);
    let client = scenario_client(&transport);

    client.get("/limited").await.unwrap();
    assert_eq!(transport.gaps(), vec![Duration::from_secs(2)]);
}

#[tokio::test(start_paused = true)]
async fn test_on_retry_and_retry_delay_overrides() {
    let transport = ScriptedTransport::new([Step::status(502), Step::status(502), Step::status(200)]);
    let client = scenario_client(&transport);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in_hook = seen.clone();

    client
        .execute(
            RequestOptions::get("/flaky").retry(
                RetryOverride::new()
                    .retry_delay(|attempt, _, _| Duration::from_millis(u64::from(attempt) * 7))
                    .on_retry(move |ev| {
                        seen_in_hook
                            .lock()
                            .unwrap()
                            .push((ev.attempt, ev.delay, ev.error.status_code, ev.request.retry_count))
                    }),
            ),
        )
        .await
        .unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (1, Duration::from_millis(7), Some(502), 0),
            (2, Duration::from_millis(14), Some(502), 1)
        ]
    );
    assert_eq!(
        transport.gaps(),
        vec![Duration::from_millis(7), Duration::from_millis(14)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_attempt_timeout_is_classified_and_retried() {
    let transport = ScriptedTransport::new([Step::Hang, Step::status(200)]);
    let client = scenario_client(&transport);

    let resp = client
        .execute(RequestOptions::get("/slow").timeout_ms(50))
        .await
        .unwrap();
    assert_eq!(resp.status, 200);
    // 50ms timeout + 100ms backoff
    assert_eq!(transport.gaps(), vec![Duration::from_millis(150)]);

    let transport = ScriptedTransport::new([Step::Hang]);
    let client = scenario_client(&transport);
    let err = client
        .execute(
            RequestOptions::get("/slow")
                .timeout_ms(50)
                .retry(RetryOverride::new().max_retries(0)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { is_retriable: true, .. }));
    assert_eq!(err.metadata().and_then(|m| m.timeout_ms), Some(50));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff_stops_retrying() {
    let transport = ScriptedTransport::new([Step::status(503), Step::status(200)]);
    let client = scenario_client(&transport);
    let token = CancellationToken::new();

    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let err = client
        .execute(RequestOptions::get("/x").cancel_token(token))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled { .. }));
    assert_eq!(err.code(), "CANCELLED");
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_aborts_in_flight_attempt() {
    let transport = ScriptedTransport::new([Step::Hang]);
    let client = scenario_client(&transport);
    let token = CancellationToken::new();

    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    });

    let err = client
        .execute(RequestOptions::get("/x").cancel_token(token))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled { .. }));
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_missing_path_param_fails_before_transport() {
    let transport = ScriptedTransport::default();
    let client = scenario_client(&transport);

    let err = assert_err!(
        client
            .execute(RequestOptions::get("/users/:id").path_param("other", 1))
            .await
    );
    assert!(matches!(err, Error::Validation { .. }));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_manual_key_and_explicit_header_bypass_store() {
    let transport = ScriptedTransport::default();
    let client = scenario_client(&transport);

    assert_ok!(
        client
            .execute(RequestOptions::post("/a").json(&json!({})).idempotency_key("manual-1"))
            .await
    );
    client
        .execute(
            RequestOptions::post("/b")
                .json(&json!({}))
                .header("Idempotency-Key", "explicit-2"),
        )
        .await
        .unwrap();

    assert_eq!(
        transport.header_values("idempotency-key"),
        vec![Some("manual-1".to_string()), Some("explicit-2".to_string())]
    );
    assert!(client.idempotency_store().is_empty());
}

#[tokio::test]
async fn test_per_request_idempotency_override() {
    let transport = ScriptedTransport::default();
    let client = scenario_client(&transport);

    client
        .execute(
            RequestOptions::put("/things/1")
                .json(&json!({"v": 1}))
                .idempotency(IdempotencyOverride::new().methods([reqwest::Method::PUT]).header_name("X-Dedupe")),
        )
        .await
        .unwrap();
    client
        .execute(
            RequestOptions::post("/things")
                .json(&json!({"v": 1}))
                .idempotency(IdempotencyOverride::new().enabled(false)),
        )
        .await
        .unwrap();

    assert!(transport.header_values("x-dedupe")[0].is_some());
    assert!(transport.header_values("idempotency-key")[1].is_none());
}

#[tokio::test]
async fn test_default_headers_merge_with_request_headers() {
    let transport = ScriptedTransport::default();
    let client = Client::builder()
        .base_url(BASE)
        .header("x-client", "default")
        .header("x-tenant", "t1")
        .transport(Arc::new(transport.clone()))
        .build()
        .unwrap();

    client
        .execute(RequestOptions::get("/x").header("x-client", "override"))
        .await
        .unwrap();
    assert_eq!(transport.header_values("x-client"), vec![Some("override".to_string())]);
    assert_eq!(transport.header_values("x-tenant"), vec![Some("t1".to_string())]);
}

struct Audit {
    pre: Arc<AtomicU32>,
}

#[async_trait::async_trait]
impl RequestHooks for Audit {
    async fn pre_request(&self, request: &mut TransportRequest) -> resilient_http::Result<()> {
        self.pre.fetch_add(1, Ordering::SeqCst);
        if let Some(body) = request.body.as_mut() {
            body["audited"] = json!(true);
        }
        Ok(())
    }

    async fn post_response(&self, _request: &RequestMetadata, response: &mut Response) -> resilient_http::Result<()> {
        response.body = ResponseBody::Text("rewritten".into());
        Ok(())
    }

    async fn on_error(&self, failure: &TransportFailure, _request: &RequestMetadata) -> ErrorHandling {
        match failure.response.as_ref().map(|r| r.status) {
            Some(410) => ErrorHandling::Recover(Response::new(200, ResponseBody::Text("gone is fine".into()))),
            Some(418) => ErrorHandling::Raise(Error::configuration("teapot")),
            _ => ErrorHandling::Default,
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_hooks_run_once_per_logical_call() {
    let transport = ScriptedTransport::new([Step::status(503), Step::status(200)]);
    let pre = Arc::new(AtomicU32::new(0));
    let client = Client::builder()
        .base_url(BASE)
        .retry_policy(deterministic_retry())
        .hook(Audit { pre: pre.clone() })
        .transport(Arc::new(transport.clone()))
        .build()
        .unwrap();

    let resp = client.put("/doc", &json!({"v": 2})).await.unwrap();
    assert_eq!(pre.load(Ordering::SeqCst), 1);
    assert_eq!(resp.body, ResponseBody::Text("rewritten".into()));
    for call in transport.calls() {
        assert_eq!(call.request.body, Some(json!({"v": 2, "audited": true})));
    }
}

#[tokio::test]
async fn test_custom_error_handler_can_recover_or_replace() {
    let transport = ScriptedTransport::new([Step::status(410), Step::status(418)]);
    let client = Client::builder()
        .base_url(BASE)
        .hook(Audit {
            pre: Arc::new(AtomicU32::new(0)),
        })
        .transport(Arc::new(transport.clone()))
        .build()
        .unwrap();

    let resp = client.get("/old").await.unwrap();
    assert_eq!(resp.body, ResponseBody::Text("gone is fine".into()));

    let err = client.get("/pot").await.unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
}

#[tokio::test]
async fn test_unknown_failure_surfaces_as_network_kind() {
    let transport = ScriptedTransport::new([Step::Fail(TransportFailure::new().with_message("adapter exploded"))]);
    let client = scenario_client(&transport);

    let err = client.get("/x").await.unwrap_err();
    assert_eq!(err.error_type(), Some(ErrorType::Unknown));
    assert!(matches!(err, Error::Network { is_retriable: false, .. }));
    assert_eq!(transport.call_count(), 1);
}
