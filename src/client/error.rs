//! API error response.

use reqwest::Method;
use serde_json::Value;
use thiserror::Error;

const BODY_DISPLAY_LIMIT: usize = 512;

/// A non-2xx answer from the API.
#[derive(Debug, Clone, Error)]
#[error(
    "{method} {url} returned HTTP {status}: {}{}",
    body_snippet(.body),
    hints_suffix(.hints)
)]
pub struct ApiError {
    pub method: Method,
    pub url: String,
    /// HTTP status code
    pub status: u16,
    /// Raw response body
    pub body: String,
    /// Troubleshooting hints attached by the calling layer
    pub hints: Vec<String>,
}

fn body_snippet(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return "<empty body>".to_string();
    }
    match body.char_indices().nth(BODY_DISPLAY_LIMIT) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

fn hints_suffix(hints: &[String]) -> String {
    if hints.is_empty() {
        String::new()
    } else {
        format!(" (hint: {})", hints.join("; "))
    }
}

impl ApiError {
    pub fn new(method: Method, url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            status,
            body: body.into(),
            hints: Vec::new(),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    /// 401 or 403: the credential was rejected.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status, 401 | 403)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn is_server_error(&self) -> bool {
        (500..=599).contains(&self.status)
    }

    /// The body parsed as JSON, when it is JSON.
    pub fn json_body(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}
