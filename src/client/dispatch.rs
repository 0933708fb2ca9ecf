//! Request dispatch with re-authorization on credential rejection.

use std::sync::Arc;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use url::Url;

use super::error::ApiError;
use super::request::{Payload, Request};
use crate::auth::Authenticator;
use crate::hooks::{HookChain, OutgoingRequest, ResponseInfo};
use crate::{Error, Result};

/// Total attempts per dispatch, the first one included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// Sends [`Request`]s against one API root with one shared authenticator.
///
/// A 401 or 403 answer triggers [`Authenticator::authorize`] followed by a
/// full resend (URL, headers and hooks are rebuilt so the new credential is
/// picked up), up to [`DEFAULT_MAX_ATTEMPTS`] attempts. Every other failure
/// is returned as is.
pub struct RequestDispatcher {
    http: reqwest::Client,
    base_url: Url,
    authenticator: Arc<dyn Authenticator>,
    default_headers: HeaderMap,
    hooks: HookChain,
    max_attempts: u32,
}

impl RequestDispatcher {
    pub fn new(http: reqwest::Client, base_url: Url, authenticator: Arc<dyn Authenticator>) -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        default_headers.insert(USER_AGENT, HeaderValue::from_static(crate::USER_AGENT));

        Self {
            http,
            base_url,
            authenticator,
            default_headers,
            hooks: HookChain::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Global hooks, run after each request's own hooks.
    pub fn with_hooks(mut self, hooks: HookChain) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers.extend(headers);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn authenticator(&self) -> &Arc<dyn Authenticator> {
        &self.authenticator
    }

    pub fn hooks(&self) -> &HookChain {
        &self.hooks
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Absolute URL for `path` (relative to the API root) plus query pairs.
    pub fn resolve_url(&self, path: &str, query: &[(String, String)]) -> Result<Url> {
        let mut url = if path.contains("://") {
            Url::parse(path)
        } else {
            self.base_url.join(path.trim_start_matches('/'))
        }
        .map_err(|e| Error::InvalidRequest(format!("invalid path '{path}': {e}")))?;

        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    pub async fn dispatch(&self, request: &Request) -> Result<Payload> {
        if !self.authenticator.is_initialized() {
            tracing::debug!(
                scheme = self.authenticator.scheme().name(),
                "Authenticator not initialized, authorizing before first request"
            );
        }
        self.authenticator.ensure_initialized().await?;

        let mut attempt = 1;
        loop {
            match self.send_once(request, attempt).await {
                Err(e) if e.is_auth_retryable() && attempt < self.max_attempts => {
                    tracing::warn!(
                        method = %request.method(),
                        path = request.path(),
                        status = e.status_code(),
                        attempt,
                        "Credential rejected, re-authorizing"
                    );
                    self.authenticator.authorize().await?;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn send_once(&self, request: &Request, attempt: u32) -> Result<Payload> {
        let url = self.resolve_url(request.path(), request.query_pairs())?;

        let mut headers = self.default_headers.clone();
        for (name, value) in request.headers() {
            headers.insert(name.clone(), value.clone());
        }
        self.authenticator.set_auth_header(&mut headers)?;

        let mut outgoing = OutgoingRequest {
            method: request.method().clone(),
            url,
            headers,
            body: request.body().cloned(),
            attempt,
        };
        request.hooks().run_before(&mut outgoing).await?;
        self.hooks.run_before(&mut outgoing).await?;

        tracing::debug!(
            method = %outgoing.method,
            url = %outgoing.url,
            attempt,
            "Sending request"
        );

        let OutgoingRequest {
            method,
            url,
            headers,
            body,
            attempt,
        } = outgoing;

        let builder = self.http.request(method.clone(), url.clone());
        let response = attach_body(builder, headers, body)?.send().await?;

        let status = response.status();
        let response_headers = response.headers().clone();
        let text = response.text().await?;

        tracing::debug!(
            method = %method,
            url = %url,
            status = status.as_u16(),
            attempt,
            "Received response"
        );

        let result = if status.is_success() {
            Payload::from_body(&text)
        } else {
            Err(ApiError::new(method.clone(), url.as_str(), status.as_u16(), text).into())
        };

        let info = ResponseInfo {
            method,
            url,
            status,
            headers: response_headers,
            attempt,
        };
        let result = request.hooks().run_after(&info, result).await;
        let result = self.hooks.run_after(&info, result).await;
        result.map(Payload::normalize)
    }
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().starts_with(MULTIPART_FORM_DATA))
}

fn attach_body(
    builder: reqwest::RequestBuilder,
    mut headers: HeaderMap,
    body: Option<Value>,
) -> Result<reqwest::RequestBuilder> {
    let Some(body) = body else {
        return Ok(builder.headers(headers));
    };

    if !is_multipart(&headers) {
        return Ok(builder.headers(headers).json(&body));
    }

    // The form sets its own Content-Type with the boundary.
    headers.remove(CONTENT_TYPE);
    let Value::Object(fields) = body else {
        return Err(Error::InvalidRequest(
            "multipart body must be a JSON object".into(),
        ));
    };
    let form = fields
        .into_iter()
        .fold(reqwest::multipart::Form::new(), |form, (name, value)| {
            let text = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            form.text(name, text)
        });
    Ok(builder.headers(headers).multipart(form))
}

impl std::fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("base_url", &self.base_url.as_str())
            .field("scheme", &self.authenticator.scheme())
            .field("hooks", &self.hooks)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ApiTokenAuth, Credentials};

    fn dispatcher(base: &str) -> RequestDispatcher {
        let creds = Credentials::new("mgmt.example.com").with_api_token("tok");
        let auth = Arc::new(ApiTokenAuth::new(creds).unwrap());
        RequestDispatcher::new(reqwest::Client::new(), Url::parse(base).unwrap(), auth)
    }

    #[test]
    fn test_resolve_url() {
        let d = dispatcher("https://mgmt.example.com:8443/");
        let url = d.resolve_url("/api/tasks/42/", &[]).unwrap();
        assert_eq!(url.as_str(), "https://mgmt.example.com:8443/api/tasks/42/");

        let url = d
            .resolve_url("api/tasks/", &[("name".into(), "backup db".into())])
            .unwrap();
        assert_eq!(url.as_str(), "https://mgmt.example.com:8443/api/tasks/?name=backup+db");

        let url = d.resolve_url("https://other.example.com/x", &[]).unwrap();
        assert_eq!(url.host_str(), Some("other.example.com"));
    }

    #[test]
    fn test_resolve_url_keeps_prefix() {
        let d = dispatcher("https://mgmt.example.com/mgmt/");
        let url = d.resolve_url("/api/things/", &[]).unwrap();
        assert_eq!(url.as_str(), "https://mgmt.example.com/mgmt/api/things/");
    }

    #[test]
    fn test_multipart_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_multipart(&headers));
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("multipart/form-data; boundary=x"),
        );
        assert!(is_multipart(&headers));
    }

    #[test]
    fn test_multipart_requires_object() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(MULTIPART_FORM_DATA));
        let builder = reqwest::Client::new().post("https://mgmt.example.com/");
        let result = attach_body(builder, headers, Some(serde_json::json!([1, 2])));
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_max_attempts_floor() {
        assert_eq!(dispatcher("https://h/").with_max_attempts(0).max_attempts(), 1);
        assert_eq!(dispatcher("https://h/").max_attempts(), DEFAULT_MAX_ATTEMPTS);
    }
}
