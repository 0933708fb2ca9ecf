//! Ordered hook chain.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use super::{OutgoingRequest, RequestHook, ResponseInfo};
use crate::client::Payload;
use crate::{Error, Result};

const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Hooks run in priority order (higher first, then insertion order).
#[derive(Clone)]
pub struct HookChain {
    hooks: Vec<Arc<dyn RequestHook>>,
    hook_timeout: Duration,
}

impl Default for HookChain {
    fn default() -> Self {
        Self::new()
    }
}

impl HookChain {
    pub fn new() -> Self {
        Self {
            hooks: Vec::new(),
            hook_timeout: DEFAULT_HOOK_TIMEOUT,
        }
    }

    /// Upper bound on a single hook invocation.
    pub fn with_timeout(mut self, hook_timeout: Duration) -> Self {
        self.hook_timeout = hook_timeout;
        self
    }

    pub fn push(&mut self, hook: impl RequestHook + 'static) {
        self.push_arc(Arc::new(hook));
    }

    pub fn push_arc(&mut self, hook: Arc<dyn RequestHook>) {
        self.hooks.push(hook);
        // Stable: equal priorities keep insertion order.
        self.hooks.sort_by_key(|h| std::cmp::Reverse(h.priority()));
    }

    pub fn with(mut self, hook: impl RequestHook + 'static) -> Self {
        self.push(hook);
        self
    }

    pub fn remove(&mut self, name: &str) {
        self.hooks.retain(|h| h.name() != name);
    }

    pub fn names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every pre-request hook. The first failure aborts the chain and
    /// surfaces as [`Error::HookFailed`].
    pub async fn run_before(&self, request: &mut OutgoingRequest) -> Result<()> {
        for hook in &self.hooks {
            let outcome = timeout(self.hook_timeout, hook.before_request(request)).await;
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e @ Error::HookFailed { .. })) => e,
                Ok(Err(e)) => Error::HookFailed {
                    hook: hook.name().to_string(),
                    reason: e.to_string(),
                },
                Err(_) => Error::HookFailed {
                    hook: hook.name().to_string(),
                    reason: format!("timed out after {:?}", self.hook_timeout),
                },
            };
            tracing::warn!(hook = hook.name(), error = %failure, "Pre-request hook failed");
            return Err(failure);
        }
        Ok(())
    }

    /// Thread the classified result through every post-response hook.
    pub async fn run_after(&self, response: &ResponseInfo, mut result: Result<Payload>) -> Result<Payload> {
        for hook in &self.hooks {
            let fallback = match &result {
                Ok(payload) => Some(payload.clone()),
                Err(_) => None,
            };
            result = match timeout(self.hook_timeout, hook.after_response(response, result)).await {
                Ok(next) => next,
                Err(_) => {
                    tracing::warn!(
                        hook = hook.name(),
                        timeout_ms = self.hook_timeout.as_millis() as u64,
                        "Post-response hook timed out"
                    );
                    match fallback {
                        Some(payload) => Ok(payload),
                        None => Err(Error::HookFailed {
                            hook: hook.name().to_string(),
                            reason: format!("timed out after {:?}", self.hook_timeout),
                        }),
                    }
                }
            };
        }
        result
    }
}

impl fmt::Debug for HookChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookChain")
            .field("hooks", &self.names())
            .field("hook_timeout", &self.hook_timeout)
            .finish()
    }
}
