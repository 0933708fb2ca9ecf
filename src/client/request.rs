//! Request description and decoded response payload.

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};

use crate::hooks::{HookChain, RequestHook};
use crate::{Error, Result};

/// Tag written into operation records by response normalization.
pub const OBJECT_TYPE_KEY: &str = "object_type";
pub const TASK_OBJECT_TYPE: &str = "task";
/// Envelope field under which an endpoint returns the operation it started.
const TASK_ENVELOPE_KEY: &str = "task";

/// One API call, relative to the client's base URL.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<Value>,
    hooks: HookChain,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            hooks: HookChain::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Set a header, overriding the client defaults for this request.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Send the body as `multipart/form-data`; top-level fields become parts.
    pub fn multipart(self, fields: Value) -> Self {
        self.header(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("multipart/form-data"),
        )
        .json(fields)
    }

    /// Hook that runs for this request only, before the client's hooks.
    pub fn hook(mut self, hook: impl RequestHook + 'static) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn hooks(&self) -> &HookChain {
        &self.hooks
    }
}

/// Decoded 2xx response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Object(Map<String, Value>),
    List(Vec<Value>),
    Empty,
}

impl Payload {
    /// Decode a response body. Blank bodies are [`Payload::Empty`].
    pub fn from_body(body: &str) -> Result<Self> {
        if body.trim().is_empty() {
            return Ok(Payload::Empty);
        }
        Self::from_value(serde_json::from_str(body)?)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Payload::Object(map)),
            Value::Array(items) => Ok(Payload::List(items)),
            Value::Null => Ok(Payload::Empty),
            other => Err(Error::Parse(format!(
                "expected a JSON object or array, got {other}"
            ))),
        }
    }

    /// Replace an operation envelope (`{"task": {...}}`) with the record it
    /// wraps, tagged as a task.
    pub fn normalize(self) -> Self {
        match self {
            Payload::Object(mut map) => {
                if matches!(map.get(TASK_ENVELOPE_KEY), Some(Value::Object(_)))
                    && let Some(Value::Object(mut record)) = map.remove(TASK_ENVELOPE_KEY)
                {
                    record.insert(OBJECT_TYPE_KEY.into(), Value::from(TASK_OBJECT_TYPE));
                    return Payload::Object(record);
                }
                Payload::Object(map)
            }
            other => other,
        }
    }

    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            Payload::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Payload::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }

    /// Whether this payload is a tagged operation record.
    pub fn is_task(&self) -> bool {
        self.get(OBJECT_TYPE_KEY).and_then(Value::as_str) == Some(TASK_OBJECT_TYPE)
    }

    pub fn into_value(self) -> Value {
        match self {
            Payload::Object(map) => Value::Object(map),
            Payload::List(items) => Value::Array(items),
            Payload::Empty => Value::Null,
        }
    }
}
