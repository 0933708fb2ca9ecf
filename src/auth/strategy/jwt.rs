//! Bearer-token authentication with single-flight refresh.
//!
//! The access token is acquired lazily with username/password and refreshed
//! with the refresh token when the server rejects it. Any number of callers
//! may ask for a refresh at once; exactly one of them performs the network
//! exchange while the rest wait on a completion signal and reuse its result.

use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use url::Url;

use super::{Authenticator, insert_authorization, insert_tenant};
use crate::auth::{AuthScheme, Credentials};
use crate::{Error, Result};

/// Token acquisition endpoint, relative to the API root.
pub const TOKEN_PATH: &str = "api/token/";
/// Token refresh endpoint, relative to the API root.
pub const REFRESH_PATH: &str = "api/token/refresh/";

#[derive(Deserialize)]
struct TokenResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

#[derive(Default)]
struct TokenState {
    access: Option<SecretString>,
    refresh: Option<SecretString>,
    initialized: bool,
    /// Present while an exchange is running; closes when it finishes.
    in_flight: Option<watch::Receiver<()>>,
}

/// Clears the in-flight marker and wakes every waiter when dropped, including
/// when the attempting future is cancelled mid-exchange.
struct InFlight<'a> {
    state: &'a RwLock<TokenState>,
    _done: watch::Sender<()>,
}

impl InFlight<'_> {
    fn commit(self, tokens: TokenResponse) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.access = Some(SecretString::from(tokens.access));
        if let Some(refresh) = tokens.refresh {
            state.refresh = Some(SecretString::from(refresh));
        }
        state.initialized = true;
        drop(state);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.in_flight = None;
    }
}

/// Bearer-token authenticator (`Authorization: Bearer <access>`).
pub struct JwtAuth {
    credentials: Credentials,
    http: reqwest::Client,
    token_url: Url,
    refresh_url: Url,
    state: RwLock<TokenState>,
}

impl std::fmt::Debug for JwtAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("JwtAuth")
            .field("credentials", &self.credentials)
            .field("token_url", &self.token_url.as_str())
            .field("has_access_token", &state.access.is_some())
            .field("initialized", &state.initialized)
            .field("refreshing", &state.in_flight.is_some())
            .finish()
    }
}

impl JwtAuth {
    /// Build an authenticator; no network traffic happens until the first
    /// [`authorize`](Authenticator::authorize).
    pub fn new(credentials: Credentials, http: reqwest::Client) -> Result<Self> {
        if credentials.login().is_none() {
            return Err(Error::Config(
                "bearer-token authentication needs a username and password".into(),
            ));
        }
        let base = credentials.base_url()?;
        let token_url = base
            .join(TOKEN_PATH)
            .map_err(|e| Error::Config(format!("invalid token URL: {e}")))?;
        let refresh_url = base
            .join(REFRESH_PATH)
            .map_err(|e| Error::Config(format!("invalid token refresh URL: {e}")))?;

        Ok(Self {
            credentials,
            http,
            token_url,
            refresh_url,
            state: RwLock::new(TokenState::default()),
        })
    }

    /// Whether an exchange is currently running.
    pub fn is_refreshing(&self) -> bool {
        self.read_state().in_flight.is_some()
    }

    /// Whether an access token is currently held.
    pub fn has_token(&self) -> bool {
        self.read_state().access.is_some()
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, TokenState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait for any running exchange, then either reuse its token or claim the
    /// next exchange. Returns `None` when a waiter found a fresh token, or,
    /// with `reuse_established`, when a token from an earlier exchange is held.
    async fn claim_or_wait(
        &self,
        reuse_established: bool,
    ) -> Option<(InFlight<'_>, bool, Option<SecretString>)> {
        let mut waited = false;
        loop {
            let mut done = {
                let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
                if let Some(rx) = state.in_flight.clone() {
                    rx
                } else {
                    let reusable = waited || (reuse_established && state.initialized);
                    if reusable && state.access.is_some() {
                        return None;
                    }
                    let (tx, rx) = watch::channel(());
                    state.in_flight = Some(rx);
                    state.access = None;
                    let refresh = state
                        .refresh
                        .as_ref()
                        .map(|t| SecretString::from(t.expose_secret().to_owned()));
                    let initialized = state.initialized;
                    let flight = InFlight {
                        state: &self.state,
                        _done: tx,
                    };
                    return Some((flight, initialized, refresh));
                }
            };
            // The sender is only ever dropped, so this resolves once the
            // running exchange finishes or its future is dropped.
            let _ = done.changed().await;
            waited = true;
        }
    }

    async fn exchange(&self, initialized: bool, refresh: Option<SecretString>) -> Result<TokenResponse> {
        if initialized {
            let refresh = refresh.ok_or_else(|| {
                Error::Internal("authenticator is initialized but holds no refresh token".into())
            })?;
            let body = json!({ "refresh": refresh.expose_secret() });
            match self.request_tokens(&self.refresh_url, &body).await {
                Ok(tokens) => {
                    tracing::debug!(host = %self.credentials.host(), "Refreshed access token");
                    return Ok(tokens);
                }
                Err(e) if e.is_unauthorized() => {
                    tracing::debug!(
                        host = %self.credentials.host(),
                        "Refresh token rejected, acquiring a new token pair"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        let (username, password) = self.credentials.login().ok_or_else(|| {
            Error::Internal("bearer-token authenticator lost its login".into())
        })?;
        let body = json!({ "username": username, "password": password.expose_secret() });
        let tokens = self.request_tokens(&self.token_url, &body).await?;
        tracing::debug!(host = %self.credentials.host(), "Acquired access token");
        Ok(tokens)
    }

    async fn request_tokens(&self, url: &Url, body: &serde_json::Value) -> Result<TokenResponse> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        insert_tenant(&mut headers, &self.credentials)?;

        let response = self
            .http
            .post(url.clone())
            .headers(headers)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Auth {
                message: format!("POST {url} was rejected: {}", text.trim()),
                status: Some(status.as_u16()),
            });
        }

        let tokens: TokenResponse = response.json().await?;
        if tokens.access.is_empty() {
            return Err(Error::Auth {
                message: format!("POST {url} returned an empty access token"),
                status: Some(status.as_u16()),
            });
        }
        Ok(tokens)
    }

    async fn run_exchange(&self, reuse_established: bool) -> Result<()> {
        let Some((flight, initialized, refresh)) = self.claim_or_wait(reuse_established).await
        else {
            return Ok(());
        };

        match self.exchange(initialized, refresh).await {
            Ok(tokens) => {
                flight.commit(tokens);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    host = %self.credentials.host(),
                    error = %e,
                    "Token exchange failed"
                );
                drop(flight);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Authenticator for JwtAuth {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::Jwt
    }

    fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    async fn authorize(&self) -> Result<()> {
        self.run_exchange(false).await
    }

    async fn ensure_initialized(&self) -> Result<()> {
        self.run_exchange(true).await
    }

    fn set_auth_header(&self, headers: &mut HeaderMap) -> Result<()> {
        let bearer = self
            .read_state()
            .access
            .as_ref()
            .map(|t| format!("Bearer {}", t.expose_secret()));
        if let Some(value) = bearer {
            insert_authorization(headers, value)?;
        }
        insert_tenant(headers, &self.credentials)
    }

    fn is_initialized(&self) -> bool {
        self.read_state().initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::AUTHORIZATION;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials(server: &MockServer) -> Credentials {
        let address = server.address();
        Credentials::new(format!("http://{}", address.ip()))
            .with_port(address.port())
            .with_login("u", "p")
    }

    fn tokens(access: &str, refresh: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({ "access": access, "refresh": refresh }))
    }

    #[tokio::test]
    async fn test_construction_is_lazy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(tokens("a", "r"))
            .expect(0)
            .mount(&server)
            .await;

        let auth = JwtAuth::new(credentials(&server), reqwest::Client::new()).unwrap();
        assert!(!auth.is_initialized());
        assert!(!auth.has_token());

        let mut headers = HeaderMap::new();
        auth.set_auth_header(&mut headers).unwrap();
        assert!(!headers.contains_key(AUTHORIZATION));
    }

    #[tokio::test]
    async fn test_first_authorize_acquires() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/"))
            .and(body_json(serde_json::json!({ "username": "u", "password": "p" })))
            .respond_with(tokens("access-1", "refresh-1"))
            .expect(1)
            .mount(&server)
            .await;

        let auth = JwtAuth::new(credentials(&server), reqwest::Client::new()).unwrap();
        auth.authorize().await.unwrap();

        assert!(auth.is_initialized());
        assert!(!auth.is_refreshing());
        let mut headers = HeaderMap::new();
        auth.set_auth_header(&mut headers).unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer access-1");
    }

    #[tokio::test]
    async fn test_second_authorize_refreshes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/"))
            .respond_with(tokens("access-1", "refresh-1"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .and(body_json(serde_json::json!({ "refresh": "refresh-1" })))
            .respond_with(tokens("access-2", "refresh-2"))
            .expect(1)
            .mount(&server)
            .await;

        let auth = JwtAuth::new(credentials(&server), reqwest::Client::new()).unwrap();
        auth.authorize().await.unwrap();
        auth.authorize().await.unwrap();

        let mut headers = HeaderMap::new();
        auth.set_auth_header(&mut headers).unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer access-2");
    }

    #[tokio::test]
    async fn test_expired_refresh_falls_back_to_acquisition() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/"))
            .respond_with(tokens("access-n", "refresh-n"))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
            .expect(1)
            .mount(&server)
            .await;

        let auth = JwtAuth::new(credentials(&server), reqwest::Client::new()).unwrap();
        auth.authorize().await.unwrap();
        auth.authorize().await.unwrap();
        assert!(auth.has_token());
        assert!(auth.is_initialized());
    }

    #[tokio::test]
    async fn test_refresh_server_error_is_not_masked() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/"))
            .respond_with(tokens("access-1", "refresh-1"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let auth = JwtAuth::new(credentials(&server), reqwest::Client::new()).unwrap();
        auth.authorize().await.unwrap();
        let err = auth.authorize().await.unwrap_err();
        assert_eq!(err.status_code(), Some(500));
        assert!(!auth.has_token());
        assert!(auth.is_initialized());
    }

    #[tokio::test]
    async fn test_failed_acquisition_leaves_uninitialized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token/"))
            .respond_with(tokens("access-1", "refresh-1"))
            .mount(&server)
            .await;

        let auth = JwtAuth::new(credentials(&server), reqwest::Client::new()).unwrap();
        let err = auth.authorize().await.unwrap_err();
        assert!(matches!(err, Error::Auth { status: Some(401), .. }));
        assert!(!auth.is_initialized());
        assert!(!auth.is_refreshing());

        auth.authorize().await.unwrap();
        assert!(auth.is_initialized());
    }

    #[tokio::test]
    async fn test_ensure_initialized_reuses_established_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/"))
            .respond_with(tokens("access-1", "refresh-1"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(tokens("access-2", "refresh-2"))
            .expect(0)
            .mount(&server)
            .await;

        let auth = JwtAuth::new(credentials(&server), reqwest::Client::new()).unwrap();
        auth.ensure_initialized().await.unwrap();
        auth.ensure_initialized().await.unwrap();

        assert!(auth.is_initialized());
        let mut headers = HeaderMap::new();
        auth.set_auth_header(&mut headers).unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer access-1");
    }

    #[test]
    fn test_requires_login() {
        let creds = Credentials::new("a").with_api_token("tok");
        assert!(JwtAuth::new(creds, reqwest::Client::new()).is_err());
    }
}
