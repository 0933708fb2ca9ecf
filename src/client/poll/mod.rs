//! Polling for server-side operations.
//!
//! [`poll_until`] is the generic loop: fetch, test, sleep with backoff, until
//! the predicate accepts a record, returns an error, the deadline passes or
//! the caller cancels. [`AsyncPoller`] runs it against the tasks endpoint
//! through a [`RequestDispatcher`], so polls share the dispatcher's
//! authentication and retry behaviour.

mod backoff;

pub use backoff::{
    BackoffPolicy, DEFAULT_BACKOFF_FACTOR, DEFAULT_INTERVAL, DEFAULT_MAX_INTERVAL, DEFAULT_TIMEOUT,
};

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::dispatch::RequestDispatcher;
use super::request::{Payload, Request};
use crate::{Error, Result};

/// Collection endpoint for server-side tasks, relative to the API root.
pub const TASKS_PATH: &str = "api/tasks/";

pub const STATE_COMPLETED: &str = "completed";
pub const STATE_RUNNING: &str = "running";

/// Poll `fetch` until `predicate` returns `Ok(true)`.
///
/// - `Ok(true)`: the fetched record is returned.
/// - `Ok(false)`: wait [`BackoffPolicy::next_interval`] and poll again.
/// - `Err(e)`: polling stops and `e` is returned.
///
/// Fails with [`Error::Timeout`] once `policy.timeout()` has elapsed and with
/// [`Error::Cancelled`] as soon as `cancel` fires, including mid-fetch and
/// mid-sleep. `operation` names the awaited thing in errors and logs.
pub async fn poll_until<T, F, Fut, P>(
    mut fetch: F,
    mut predicate: P,
    policy: &mut BackoffPolicy,
    cancel: &CancellationToken,
    operation: &str,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: FnMut(&T) -> Result<bool>,
{
    let timeout = policy.timeout();
    // `None` when the timeout is too large to represent: no deadline.
    let deadline = Instant::now().checked_add(timeout);
    let cancelled = || Error::Cancelled {
        operation: operation.to_string(),
    };

    let mut polls: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            tracing::debug!(operation, polls, "Gave up waiting for operation");
            return Err(Error::Timeout {
                operation: operation.to_string(),
                after: timeout,
            });
        }

        polls += 1;
        let record = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            fetched = fetch() => fetched?,
        };

        if predicate(&record)? {
            tracing::debug!(operation, polls, "Operation finished");
            return Ok(record);
        }

        let mut wait = policy.next_interval();
        if let Some(deadline) = deadline {
            wait = wait.min(deadline.saturating_duration_since(Instant::now()));
        }
        tracing::debug!(
            operation,
            polls,
            wait_ms = wait.as_millis() as u64,
            "Operation still pending"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            _ = tokio::time::sleep(wait) => {}
        }
    }
}

/// Render an id (string or number) for messages and URLs.
pub(crate) fn id_string(id: &Value) -> Option<String> {
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn record_id(record: &Value) -> Option<String> {
    record.get("id").and_then(id_string)
}

fn last_message(record: &Value) -> Option<String> {
    let last = record.get("messages")?.as_array()?.last()?;
    match last {
        Value::String(s) => Some(s.clone()),
        other => other.get("message")?.as_str().map(str::to_string),
    }
}

/// Standard task predicate.
///
/// `completed` finishes the wait and `running` keeps polling. Any other state
/// fails with [`Error::TaskFailed`], carrying the task's last message.
pub fn task_completed(record: &Value) -> Result<bool> {
    let Some(state) = record.get("state").and_then(Value::as_str) else {
        return Err(Error::Parse(format!("task record has no state: {record}")));
    };
    match state {
        STATE_COMPLETED => Ok(true),
        STATE_RUNNING => Ok(false),
        other => {
            let id = record_id(record).unwrap_or_else(|| "<unknown>".to_string());
            let message = last_message(record)
                .unwrap_or_else(|| format!("task {id} did not complete successfully"));
            Err(Error::TaskFailed {
                id,
                state: other.to_string(),
                message,
            })
        }
    }
}

/// How to find the task being waited on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationTarget {
    /// `GET api/tasks/{id}/`
    Id(String),
    /// `GET api/tasks/?k=v&...`, first match
    Search(Vec<(String, String)>),
}

impl OperationTarget {
    pub fn id(id: impl ToString) -> Self {
        OperationTarget::Id(id.to_string())
    }

    pub fn search<K, V>(criteria: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: ToString,
    {
        OperationTarget::Search(
            criteria
                .into_iter()
                .map(|(k, v)| (k.into(), v.to_string()))
                .collect(),
        )
    }

    fn request(&self) -> Request {
        match self {
            OperationTarget::Id(id) => Request::get(format!("{TASKS_PATH}{id}/")),
            OperationTarget::Search(criteria) => criteria
                .iter()
                .fold(Request::get(TASKS_PATH), |req, (k, v)| req.query(k.clone(), v)),
        }
    }
}

impl std::fmt::Display for OperationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationTarget::Id(id) => write!(f, "task {id}"),
            OperationTarget::Search(criteria) => {
                let rendered: Vec<String> =
                    criteria.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "task matching {}", rendered.join("&"))
            }
        }
    }
}

/// Dispatcher-backed task poller.
#[derive(Clone, Debug)]
pub struct AsyncPoller {
    dispatcher: Arc<RequestDispatcher>,
}

impl AsyncPoller {
    pub fn new(dispatcher: Arc<RequestDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Fetch the current task record once.
    pub async fn fetch(&self, target: &OperationTarget) -> Result<Value> {
        let payload = self.dispatcher.dispatch(&target.request()).await?;
        match (target, payload) {
            (OperationTarget::Id(_), Payload::Object(record)) => Ok(Value::Object(record)),
            (OperationTarget::Search(_), Payload::List(items)) => first_match(target, items),
            // Paginated search answers wrap matches in `results`.
            (OperationTarget::Search(_), Payload::Object(mut page)) => match page.remove("results") {
                Some(Value::Array(items)) => first_match(target, items),
                _ => Err(Error::Parse(format!(
                    "unexpected search response for {target}"
                ))),
            },
            (_, other) => Err(Error::Parse(format!(
                "unexpected response for {target}: {}",
                other.into_value()
            ))),
        }
    }

    /// Poll `target` until `predicate` accepts it.
    pub async fn wait<P>(
        &self,
        target: &OperationTarget,
        predicate: P,
        policy: &mut BackoffPolicy,
        cancel: &CancellationToken,
    ) -> Result<Value>
    where
        P: FnMut(&Value) -> Result<bool>,
    {
        let operation = target.to_string();
        poll_until(move || self.fetch(target), predicate, policy, cancel, &operation).await
    }

    /// Poll `target` with [`task_completed`].
    pub async fn wait_completed(
        &self,
        target: &OperationTarget,
        policy: &mut BackoffPolicy,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        self.wait(target, task_completed, policy, cancel).await
    }
}

fn first_match(target: &OperationTarget, items: Vec<Value>) -> Result<Value> {
    items
        .into_iter()
        .next()
        .ok_or_else(|| Error::Parse(format!("no {target}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn quick_policy() -> BackoffPolicy {
        BackoffPolicy::new()
            .with_timeout(Duration::from_millis(300))
            .with_interval(Duration::from_millis(10))
            .with_max_interval(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_immediate_success_returns_first_record() {
        let fetches = &AtomicUsize::new(0);
        let record = poll_until(
            move || async move {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"id": 1, "state": "completed"}))
            },
            task_completed,
            &mut quick_policy(),
            &CancellationToken::new(),
            "task 1",
        )
        .await
        .unwrap();

        assert_eq!(record["id"], 1);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_polls_until_predicate_accepts() {
        let fetches = &AtomicUsize::new(0);
        let mut policy = quick_policy();
        let record = poll_until(
            move || async move {
                let n = fetches.fetch_add(1, Ordering::SeqCst);
                let state = if n < 3 { "running" } else { "completed" };
                Ok(json!({"id": "t", "state": state}))
            },
            task_completed,
            &mut policy,
            &CancellationToken::new(),
            "task t",
        )
        .await
        .unwrap();

        assert_eq!(record["state"], "completed");
        assert_eq!(fetches.load(Ordering::SeqCst), 4);
        // Three sleeps grew the interval up to its cap.
        assert_eq!(policy.interval(), Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_predicate_error_stops_polling() {
        let fetches = &AtomicUsize::new(0);
        let err = poll_until(
            move || async move {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"id": 9, "state": "failed", "messages": ["disk full"]}))
            },
            task_completed,
            &mut quick_policy(),
            &CancellationToken::new(),
            "task 9",
        )
        .await
        .unwrap_err();

        match err {
            Error::TaskFailed { id, state, message } => {
                assert_eq!(id, "9");
                assert_eq!(state, "failed");
                assert_eq!(message, "disk full");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_error_stops_polling() {
        let err = poll_until(
            || async { Err::<Value, _>(Error::Parse("boom".into())) },
            |_: &Value| Ok(false),
            &mut quick_policy(),
            &CancellationToken::new(),
            "thing",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[tokio::test]
    async fn test_never_completing_times_out() {
        let started = std::time::Instant::now();
        let err = poll_until(
            || async { Ok(json!({"state": "running"})) },
            task_completed,
            &mut quick_policy(),
            &CancellationToken::new(),
            "task slow",
        )
        .await
        .unwrap_err();

        assert!(err.is_timeout(), "got {err}");
        assert!(err.to_string().contains("task slow"));
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_unbounded_timeout_still_polls() {
        let fetches = &AtomicUsize::new(0);
        let mut policy = quick_policy().with_timeout(Duration::MAX);
        let record = poll_until(
            move || async move {
                let n = fetches.fetch_add(1, Ordering::SeqCst);
                let state = if n < 2 { "running" } else { "completed" };
                Ok(json!({"id": 5, "state": state}))
            },
            task_completed,
            &mut policy,
            &CancellationToken::new(),
            "task 5",
        )
        .await
        .unwrap();

        assert_eq!(record["state"], "completed");
        assert_eq!(fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_sleep() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let mut policy = BackoffPolicy::new()
            .with_timeout(Duration::from_secs(60))
            .with_interval(Duration::from_secs(30));
        let started = std::time::Instant::now();
        let err = poll_until(
            || async { Ok(json!({"state": "running"})) },
            task_completed,
            &mut policy,
            &cancel,
            "task 3",
        )
        .await
        .unwrap_err();

        assert!(err.is_cancelled(), "got {err}");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_already_cancelled_never_fetches() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let fetches = &AtomicUsize::new(0);
        let err = poll_until(
            move || async move {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok(json!({}))
            },
            |_: &Value| Ok(true),
            &mut quick_policy(),
            &cancel,
            "task 4",
        )
        .await
        .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_task_completed_states() {
        assert!(task_completed(&json!({"state": "completed"})).unwrap());
        assert!(!task_completed(&json!({"state": "running"})).unwrap());
        assert!(matches!(task_completed(&json!({"id": 1})), Err(Error::Parse(_))));
    }

    #[test]
    fn test_task_failure_messages() {
        let err = task_completed(&json!({
            "id": "abc",
            "state": "error",
            "messages": [{"message": "starting"}, {"message": "permission denied"}]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("permission denied"));

        let err = task_completed(&json!({"id": 5, "state": "aborted", "messages": []})).unwrap_err();
        match err {
            Error::TaskFailed { message, .. } => {
                assert_eq!(message, "task 5 did not complete successfully")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_target_display() {
        assert_eq!(OperationTarget::id(12).to_string(), "task 12");
        assert_eq!(
            OperationTarget::search([("name", "backup"), ("owner", "ops")]).to_string(),
            "task matching name=backup&owner=ops"
        );
    }
}
