//! Handle on a server-side operation started by a request.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::dispatch::RequestDispatcher;
use super::poll::{AsyncPoller, BackoffPolicy, OperationTarget, id_string, task_completed};
use super::request::Payload;
use crate::Result;

/// A task the API is still working on.
///
/// Obtained from a response tagged as an operation record (see
/// [`Payload::normalize`]); waits go through the dispatcher that produced it.
#[derive(Clone, Debug)]
pub struct PendingOperation {
    operation_id: String,
    dispatcher: Arc<RequestDispatcher>,
    policy: BackoffPolicy,
}

impl PendingOperation {
    pub fn new(
        operation_id: impl Into<String>,
        dispatcher: Arc<RequestDispatcher>,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            operation_id: operation_id.into(),
            dispatcher,
            policy,
        }
    }

    /// `Some` when `payload` is a task record with an id.
    pub fn from_payload(
        payload: &Payload,
        dispatcher: Arc<RequestDispatcher>,
        policy: BackoffPolicy,
    ) -> Option<Self> {
        if !payload.is_task() {
            return None;
        }
        let id = payload.get("id").and_then(id_string)?;
        Some(Self::new(id, dispatcher, policy))
    }

    pub fn id(&self) -> &str {
        &self.operation_id
    }

    pub fn target(&self) -> OperationTarget {
        OperationTarget::Id(self.operation_id.clone())
    }

    /// Backoff used by [`wait_completed`](Self::wait_completed).
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn poller(&self) -> AsyncPoller {
        AsyncPoller::new(Arc::clone(&self.dispatcher))
    }

    /// Fetch the task record once.
    pub async fn fetch(&self) -> Result<Value> {
        self.poller().fetch(&self.target()).await
    }

    /// Poll until `predicate` accepts the task record.
    pub async fn wait<P>(
        &self,
        predicate: P,
        policy: &mut BackoffPolicy,
        cancel: &CancellationToken,
    ) -> Result<Value>
    where
        P: FnMut(&Value) -> Result<bool>,
    {
        self.poller()
            .wait(&self.target(), predicate, policy, cancel)
            .await
    }

    /// Poll with [`task_completed`] and a fresh copy of this operation's
    /// policy.
    pub async fn wait_completed(&self, cancel: &CancellationToken) -> Result<Value> {
        let mut policy = self.policy.clone();
        self.wait(task_completed, &mut policy, cancel).await
    }
}
