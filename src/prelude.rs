//! Prelude module for convenient imports.
//!
//! ```rust
//! use mgmt_client::prelude::*;
//! ```

pub use crate::{Error, ErrorCategory, Result};

pub use crate::auth::{AuthScheme, Authenticator, AuthenticatorRegistry, Credentials};

pub use crate::client::{
    ApiError, AsyncPoller, BackoffPolicy, Client, ClientBuilder, ClientConfig, OperationTarget,
    Payload, PendingOperation, Request, poll_until, task_completed,
};

pub use crate::config::{ConfigBuilder, ConfigProvider, ConfigProviderExt};

pub use crate::hooks::{FnHook, HookChain, OutgoingRequest, RequestHook, ResponseInfo};

pub use tokio_util::sync::CancellationToken;
