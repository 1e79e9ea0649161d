//! Caller-supplied hooks around request execution.
//!
//! Hooks are composed, not inherited: register any number of [`RequestHooks`]
//! implementations on the client and they run in registration order.
//!
//! - `pre_request` runs once per logical call, before the first dispatch, and
//!   may rewrite the outgoing request. Returning an error aborts the call.
//! - `post_response` runs once on success and may rewrite the response.
//! - `on_error` runs once after retries are exhausted and may replace the
//!   default classify-and-raise behaviour.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::RequestMetadata;
use crate::transport::{Response, TransportFailure, TransportRequest};
use crate::{Error, Result};

/// Outcome of a custom error handler.
#[derive(Debug)]
pub enum ErrorHandling {
    /// Build and raise the typed error as usual.
    Default,
    /// Raise this error instead.
    Raise(Error),
    /// Treat the call as successful with this response.
    Recover(Response),
}

#[async_trait]
pub trait RequestHooks: Send + Sync {
    async fn pre_request(&self, _request: &mut TransportRequest) -> Result<()> {
        Ok(())
    }

    async fn post_response(&self, _request: &RequestMetadata, _response: &mut Response) -> Result<()> {
        Ok(())
    }

    async fn on_error(&self, _failure: &TransportFailure, _request: &RequestMetadata) -> ErrorHandling {
        ErrorHandling::Default
    }
}

/// Ordered set of hooks.
#[derive(Clone, Default)]
pub struct HookPipeline {
    hooks: Vec<Arc<dyn RequestHooks>>,
}

impl HookPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<H: RequestHooks + 'static>(mut self, hook: H) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn push(&mut self, hook: Arc<dyn RequestHooks>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub async fn pre_request(&self, request: &mut TransportRequest) -> Result<()> {
        for hook in &self.hooks {
            hook.pre_request(request).await?;
        }
        Ok(())
    }

    pub async fn post_response(&self, request: &RequestMetadata, response: &mut Response) -> Result<()> {
        for hook in &self.hooks {
            hook.post_response(request, response).await?;
        }
        Ok(())
    }

    /// First handler that does not return [`ErrorHandling::Default`] wins.
    pub async fn on_error(&self, failure: &TransportFailure, request: &RequestMetadata) -> ErrorHandling {
        for hook in &self.hooks {
            match hook.on_error(failure, request).await {
                ErrorHandling::Default => continue,
                decided => return decided,
            }
        }
        ErrorHandling::Default
    }
}

impl std::fmt::Debug for HookPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookPipeline").field("hooks", &self.hooks.len()).finish()
    }
}
