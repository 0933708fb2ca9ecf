//! # mgmt-client
//!
//! Async client core for HTTPS/JSON management APIs.
//!
//! The crate covers the parts of an API client that are hard to get right
//! under concurrency:
//!
//! - **Authentication**: API token, basic and bearer-token (access/refresh)
//!   schemes behind one [`auth::Authenticator`] trait. Bearer tokens are
//!   refreshed single-flight: concurrent callers share one network exchange.
//! - **Deduplication**: an [`auth::AuthenticatorRegistry`] hands out one
//!   shared authenticator per credential set.
//! - **Dispatch**: [`client::RequestDispatcher`] runs hooks, classifies
//!   responses and retries on 401/403 after re-authorizing.
//! - **Polling**: [`client::poll_until`] and [`client::AsyncPoller`] wait for
//!   server-side tasks with bounded exponential backoff.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mgmt_client::{Client, ClientConfig, Request};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), mgmt_client::Error> {
//!     let config = ClientConfig::new("mgmt.example.com")
//!         .with_port(8443)
//!         .with_login("admin", "secret");
//!     let client = Client::builder().config(config).build()?;
//!
//!     let payload = client
//!         .dispatch(Request::post("/api/backups/").json(serde_json::json!({"target": "db"})))
//!         .await?;
//!
//!     if let Some(operation) = client.pending_operation(&payload) {
//!         let record = operation.wait_completed(&CancellationToken::new()).await?;
//!         println!("task finished: {record}");
//!     }
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod auth;
pub mod client;
pub mod config;
pub mod hooks;
pub mod prelude;

use std::time::Duration;

pub use auth::{
    ApiTokenAuth, AuthScheme, Authenticator, AuthenticatorRegistry, BasicAuth, Credentials,
    JwtAuth,
};
pub use client::{
    ApiError, AsyncPoller, BackoffPolicy, Client, ClientBuilder, ClientConfig, OperationTarget,
    Payload, PendingOperation, Request, RequestDispatcher, poll_until, task_completed,
};
pub use config::{ConfigBuilder, ConfigError, ConfigProvider, ConfigProviderExt};
pub use hooks::{FnHook, HookChain, OutgoingRequest, RequestHook, ResponseInfo};

/// Error type for mgmt-client operations.
///
/// Every variant carries enough context (method, URL, status, body or the
/// operation being waited on) to diagnose a failure without re-running with
/// verbose logging.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The API answered with a non-2xx status.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Acquiring or refreshing a credential failed.
    #[error("Authentication failed{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Auth {
        message: String,
        /// Status returned by the token endpoint, if it answered at all.
        status: Option<u16>,
    },

    /// Connection, TLS or other transport-level failure.
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization or deserialization failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Response body had an unexpected shape.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request could not be built (bad path, header or body).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A server-side task finished in a non-success state.
    #[error("Task {id} ended in state '{state}': {message}")]
    TaskFailed {
        id: String,
        state: String,
        message: String,
    },

    /// Waiting on an operation exceeded its deadline.
    #[error("Timed out after {:.1}s waiting for {operation}", .after.as_secs_f64())]
    Timeout { operation: String, after: Duration },

    /// Waiting on an operation was cancelled by the caller.
    #[error("Cancelled while waiting for {operation}")]
    Cancelled { operation: String },

    /// A request hook rejected the request.
    #[error("Hook '{hook}' failed: {reason}")]
    HookFailed { hook: String, reason: String },

    /// An internal invariant was violated.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error category for unified error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Authentication or authorization failures (401, 403)
    Authorization,
    /// Configuration or request construction errors
    Configuration,
    /// Network or server errors that may succeed if tried again later
    Transient,
    /// Deadline exceeded
    ResourceLimit,
    /// Caller asked to stop
    Cancelled,
    /// Everything else: client errors, parse failures, failed tasks
    Internal,
}

impl Error {
    pub fn auth(message: impl Into<String>) -> Self {
        Error::Auth {
            message: message.into(),
            status: None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Auth { .. } => ErrorCategory::Authorization,
            Error::Api(api) if api.is_auth_failure() => ErrorCategory::Authorization,

            Error::Config(_) | Error::InvalidRequest(_) => ErrorCategory::Configuration,

            Error::Network(_) => ErrorCategory::Transient,
            Error::Api(api) if api.status >= 500 => ErrorCategory::Transient,

            Error::Timeout { .. } => ErrorCategory::ResourceLimit,
            Error::Cancelled { .. } => ErrorCategory::Cancelled,

            Error::Api(_)
            | Error::Json(_)
            | Error::Parse(_)
            | Error::TaskFailed { .. }
            | Error::HookFailed { .. }
            | Error::Internal(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_authorization_error(&self) -> bool {
        self.category() == ErrorCategory::Authorization
    }

    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    /// True for responses the dispatcher answers by re-authorizing (401/403).
    pub fn is_auth_retryable(&self) -> bool {
        matches!(self, Error::Api(api) if api.is_auth_failure())
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status_code() == Some(401)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Api(api) => Some(api.status),
            Error::Auth { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::Serialization(e) => Error::Json(e),
            other => Error::Config(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// User agent sent with every request unless overridden.
pub const USER_AGENT: &str = concat!("mgmt-client/", env!("CARGO_PKG_VERSION"));
