//! API client session.

mod config;
mod dispatch;
mod error;
mod operation;
pub mod poll;
mod request;

pub use config::{ClientConfig, DEFAULT_REQUEST_TIMEOUT};
pub use dispatch::{DEFAULT_MAX_ATTEMPTS, RequestDispatcher};
pub use error::ApiError;
pub use operation::PendingOperation;
pub use poll::{AsyncPoller, BackoffPolicy, OperationTarget, poll_until, task_completed};
pub use request::{OBJECT_TYPE_KEY, Payload, Request, TASK_OBJECT_TYPE};

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::auth::{Authenticator, AuthenticatorRegistry};
use crate::hooks::{HookChain, RequestHook};
use crate::{Error, Result};

/// A session against one management API endpoint.
///
/// Cheap to clone; clones share the dispatcher, and through it the
/// authenticator, so a token refreshed by one clone is used by all.
#[derive(Clone)]
pub struct Client {
    dispatcher: Arc<RequestDispatcher>,
    config: Arc<ClientConfig>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Client with its own authenticator registry and no hooks.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    pub async fn dispatch(&self, request: Request) -> Result<Payload> {
        self.dispatcher.dispatch(&request).await
    }

    pub async fn get(&self, path: &str) -> Result<Payload> {
        self.dispatch(Request::get(path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Payload> {
        self.dispatch(Request::post(path).json(body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Payload> {
        self.dispatch(Request::put(path).json(body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> Result<Payload> {
        self.dispatch(Request::patch(path).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Payload> {
        self.dispatch(Request::delete(path)).await
    }

    /// The operation `payload` describes, if it is a task record.
    pub fn pending_operation(&self, payload: &Payload) -> Option<PendingOperation> {
        PendingOperation::from_payload(
            payload,
            Arc::clone(&self.dispatcher),
            self.config.poll_policy().clone(),
        )
    }

    pub fn poller(&self) -> AsyncPoller {
        AsyncPoller::new(Arc::clone(&self.dispatcher))
    }

    /// Wait for task `id` to complete using the configured poll policy.
    pub async fn wait_for_task(&self, id: &str, cancel: &CancellationToken) -> Result<Value> {
        let mut policy = self.config.poll_policy().clone();
        self.poller()
            .wait_completed(&OperationTarget::id(id), &mut policy, cancel)
            .await
    }

    pub fn dispatcher(&self) -> &Arc<RequestDispatcher> {
        &self.dispatcher
    }

    pub fn authenticator(&self) -> &Arc<dyn Authenticator> {
        self.dispatcher.authenticator()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.dispatcher.base_url().as_str())
            .field("scheme", &self.authenticator().scheme())
            .finish()
    }
}

#[derive(Default)]
pub struct ClientBuilder {
    config: Option<ClientConfig>,
    registry: Option<Arc<AuthenticatorRegistry>>,
    http: Option<reqwest::Client>,
    hooks: HookChain,
    default_headers: HeaderMap,
    max_attempts: Option<u32>,
}

impl ClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Share authenticators with every other client built from `registry`.
    ///
    /// An authenticator keeps the HTTP client of the session that created it,
    /// so token requests made through a shared authenticator use the first
    /// session's timeout and TLS settings, not this one's.
    pub fn registry(mut self, registry: Arc<AuthenticatorRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use a preconfigured HTTP client; timeout and TLS settings from the
    /// config are then not applied.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Global hook, run for every request after the request's own hooks.
    pub fn hook(mut self, hook: impl RequestHook + 'static) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn hooks(mut self, hooks: HookChain) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn build(self) -> Result<Client> {
        let config = self
            .config
            .ok_or_else(|| Error::Config("client configuration is required".into()))?;
        let credentials = config.credentials();
        let base_url = credentials.base_url()?;

        let http = match self.http {
            Some(http) => http,
            None => {
                if !credentials.tls_verify() {
                    tracing::warn!(
                        host = %credentials.host(),
                        "TLS certificate verification is disabled"
                    );
                }
                reqwest::Client::builder()
                    .timeout(config.timeout())
                    .user_agent(crate::USER_AGENT)
                    .danger_accept_invalid_certs(!credentials.tls_verify())
                    .build()
                    .map_err(Error::Network)?
            }
        };

        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(AuthenticatorRegistry::new()));
        let authenticator = registry.get_or_create(credentials, &http)?;

        let mut dispatcher = RequestDispatcher::new(http, base_url, authenticator)
            .with_hooks(self.hooks)
            .with_default_headers(self.default_headers);
        if let Some(max_attempts) = self.max_attempts {
            dispatcher = dispatcher.with_max_attempts(max_attempts);
        }

        Ok(Client {
            dispatcher: Arc::new(dispatcher),
            config: Arc::new(config),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthScheme;

    #[test]
    fn test_build_requires_config() {
        let err = Client::builder().build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_build_requires_credentials() {
        let err = Client::new(ClientConfig::new("mgmt.example.com")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_clients_share_registry_entries() {
        let registry = Arc::new(AuthenticatorRegistry::new());
        let config = ClientConfig::new("mgmt.example.com").with_login("u", "p");

        let a = Client::builder()
            .config(config.clone())
            .registry(Arc::clone(&registry))
            .build()
            .unwrap();
        let b = Client::builder()
            .config(config)
            .registry(Arc::clone(&registry))
            .build()
            .unwrap();

        assert!(Arc::ptr_eq(a.authenticator(), b.authenticator()));
        assert_eq!(a.authenticator().scheme(), AuthScheme::Jwt);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            a.dispatcher().base_url().as_str(),
            "https://mgmt.example.com/"
        );
    }

    #[test]
    fn test_shared_authenticator_ignores_later_session_settings() {
        let registry = Arc::new(AuthenticatorRegistry::new());
        let config = ClientConfig::new("mgmt.example.com").with_login("u", "p");

        let first = Client::builder()
            .config(config.clone().with_timeout(std::time::Duration::from_secs(5)))
            .registry(Arc::clone(&registry))
            .build()
            .unwrap();
        let second = Client::builder()
            .config(config.with_timeout(std::time::Duration::from_secs(90)))
            .registry(Arc::clone(&registry))
            .build()
            .unwrap();

        // Timeout is a session setting, not part of the credential tuple.
        assert!(Arc::ptr_eq(first.authenticator(), second.authenticator()));
        assert_eq!(second.config().timeout(), std::time::Duration::from_secs(90));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_pending_operation_only_for_tasks() {
        let client = Client::new(ClientConfig::new("h").with_api_token("tok")).unwrap();

        let task = Payload::from_value(serde_json::json!({"task": {"id": 7, "state": "running"}}))
            .unwrap()
            .normalize();
        let op = client.pending_operation(&task).unwrap();
        assert_eq!(op.id(), "7");
        assert_eq!(op.policy(), client.config().poll_policy());

        let plain = Payload::from_value(serde_json::json!({"id": 7})).unwrap();
        assert!(client.pending_operation(&plain).is_none());
    }
}
