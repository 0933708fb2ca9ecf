//! Hook traits and types.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use url::Url;

use crate::Result;
use crate::client::Payload;

/// A request about to be sent. Pre-request hooks may rewrite any field.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    pub url: Url,
    /// Consolidated headers, authorization included.
    pub headers: HeaderMap,
    pub body: Option<Value>,
    /// 1-based attempt number within one dispatch.
    pub attempt: u32,
}

/// What came back for an [`OutgoingRequest`].
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    pub method: Method,
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub attempt: u32,
}

/// Intercepts requests before they are sent and responses after they are
/// classified.
///
/// A `before_request` error aborts the dispatch. `after_response` receives
/// the classified result and returns the result the caller will see, so it
/// can enrich errors (for example with [`ApiError::with_hint`]) or rewrite
/// payloads.
///
/// [`ApiError::with_hint`]: crate::client::ApiError::with_hint
#[async_trait]
pub trait RequestHook: Send + Sync {
    fn name(&self) -> &str;

    /// Higher runs first within a chain.
    fn priority(&self) -> i32 {
        0
    }

    async fn before_request(&self, _request: &mut OutgoingRequest) -> Result<()> {
        Ok(())
    }

    async fn after_response(
        &self,
        _response: &ResponseInfo,
        result: Result<Payload>,
    ) -> Result<Payload> {
        result
    }
}

type BeforeFn = dyn Fn(&mut OutgoingRequest) -> Result<()> + Send + Sync;
type AfterFn = dyn Fn(&ResponseInfo, Result<Payload>) -> Result<Payload> + Send + Sync;

/// Closure-backed [`RequestHook`].
///
/// ```rust
/// use mgmt_client::FnHook;
/// use reqwest::header::HeaderValue;
///
/// let hook = FnHook::new("trace-id").before(|request| {
///     request
///         .headers
///         .insert("x-trace-id", HeaderValue::from_static("abc123"));
///     Ok(())
/// });
/// ```
#[derive(Clone)]
pub struct FnHook {
    name: String,
    priority: i32,
    before: Option<Arc<BeforeFn>>,
    after: Option<Arc<AfterFn>>,
}

impl FnHook {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            before: None,
            after: None,
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn before<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut OutgoingRequest) -> Result<()> + Send + Sync + 'static,
    {
        self.before = Some(Arc::new(f));
        self
    }

    pub fn after<F>(mut self, f: F) -> Self
    where
        F: Fn(&ResponseInfo, Result<Payload>) -> Result<Payload> + Send + Sync + 'static,
    {
        self.after = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for FnHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHook")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .finish()
    }
}

#[async_trait]
impl RequestHook for FnHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn before_request(&self, request: &mut OutgoingRequest) -> Result<()> {
        match &self.before {
            Some(f) => f(request),
            None => Ok(()),
        }
    }

    async fn after_response(
        &self,
        response: &ResponseInfo,
        result: Result<Payload>,
    ) -> Result<Payload> {
        match &self.after {
            Some(f) => f(response, result),
            None => result,
        }
    }
}
