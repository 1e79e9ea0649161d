//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use resilient_http::transport::{
    FailedRequest, Response, ResponseBody, Transport, TransportFailure, TransportRequest,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// What the scripted transport does on its next call.
#[derive(Debug, Clone)]
pub enum Step {
    Respond(Response),
    Fail(TransportFailure),
    /// Never answers; used for timeout and cancellation tests.
    Hang,
}

impl Step {
    pub fn status(status: u16) -> Self {
        Step::Respond(Response::new(status, ResponseBody::Empty))
    }

    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Step::Respond(Response::new(status, ResponseBody::Json(body)))
    }

    /// Connection reset after the request was sent.
    pub fn network(url: &str) -> Self {
        Step::Fail(
            TransportFailure::new()
                .with_code("ECONNRESET")
                .with_message("socket hang up")
                .with_request(FailedRequest {
                    method: "POST".into(),
                    url: url.into(),
                }),
        )
    }
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub at: Instant,
    pub request: TransportRequest,
}

/// In-memory transport that replays a script and records every call.
///
/// Error statuses are returned as failures carrying the response, like a real
/// transport. Once the script runs out every call answers 200.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    steps: Arc<Mutex<VecDeque<Step>>>,
    calls: Arc<Mutex<Vec<Recorded>>>,
}

impl ScriptedTransport {
    pub fn new<I: IntoIterator<Item = Step>>(steps: I) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into_iter().collect())),
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Gaps between consecutive calls.
    pub fn gaps(&self) -> Vec<Duration> {
        let calls = self.calls();
        calls.windows(2).map(|w| w[1].at - w[0].at).collect()
    }

    pub fn header_values(&self, name: &str) -> Vec<Option<String>> {
        self.calls()
            .iter()
            .map(|c| {
                c.request
                    .headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            })
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<Response, TransportFailure> {
        self.calls.lock().unwrap().push(Recorded {
            at: Instant::now(),
            request: request.clone(),
        });
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            None => Ok(Response::new(200, ResponseBody::Empty)),
            Some(Step::Respond(resp)) if resp.is_success() => Ok(resp),
            Some(Step::Respond(resp)) => Err(TransportFailure::from_response(&request, resp)),
            Some(Step::Fail(failure)) => Err(failure),
            Some(Step::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
