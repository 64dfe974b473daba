//! HTTP transport capability
//!
//! The SDK only needs "send this GET/POST with these headers and give me the
//! JSON back". [`HttpClient`] is that seam. Two implementations ship here:
//! - [`ScriptedTransport`] - in-memory, records calls and replays canned replies
//! - `ReqwestTransport` - blocking reqwest client (feature `http`)

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Field carrying the payload of an IAM reply
pub const FIELD_DATA: &str = "data";
/// Field carrying the business status of an IAM reply
pub const FIELD_STATUS: &str = "status";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("Response from {url} is not valid JSON: {message}")]
    Decode { url: String, message: String },

    #[error("No route for {method} {url}")]
    Unrouted { method: Method, url: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// A single outbound header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: &'static str,
    pub value: String,
}

impl Header {
    pub fn new(name: &'static str, value: impl Into<String>) -> Self {
        Header {
            name,
            value: value.into(),
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Performs one HTTP exchange and returns the decoded JSON body
pub trait HttpClient: Send + Sync {
    fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        headers: &[Header],
    ) -> Result<Value, TransportError>;
}

/// Decoded reply of the IAM service
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    body: Value,
}

impl ApiResponse {
    pub fn new(body: Value) -> Self {
        ApiResponse { body }
    }

    /// Explicit `status` flag, if the reply carries one
    pub fn status(&self) -> Option<bool> {
        self.body.get(FIELD_STATUS).and_then(Value::as_bool)
    }

    /// `true` only when the reply carries `status: false`
    pub fn is_failure(&self) -> bool {
        self.status() == Some(false)
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }

    /// The `data` payload
    pub fn data(&self) -> Option<&Value> {
        self.field(FIELD_DATA)
    }

    pub fn into_data(self) -> Option<Value> {
        match self.body {
            Value::Object(mut map) => map.remove(FIELD_DATA),
            _ => None,
        }
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn into_body(self) -> Value {
        self.body
    }
}

/// One request seen by a [`ScriptedTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
    pub headers: Vec<Header>,
}

impl RecordedCall {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name == name)
            .map(|h| h.value.as_str())
    }
}

/// In-memory transport that replays canned replies keyed by exact URL
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, Value>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `body` every time `url` is requested
    pub fn respond(&self, url: impl Into<String>, body: Value) -> &Self {
        self.routes.lock().insert(url.into(), body);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Number of calls made to `url`
    pub fn count(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.url == url).count()
    }

    pub fn last_call(&self) -> Option<RecordedCall> {
        self.calls.lock().last().cloned()
    }
}

impl HttpClient for ScriptedTransport {
    fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        headers: &[Header],
    ) -> Result<Value, TransportError> {
        self.calls.lock().push(RecordedCall {
            method,
            url: url.to_string(),
            body: body.cloned(),
            headers: headers.to_vec(),
        });

        self.routes
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::Unrouted {
                method,
                url: url.to_string(),
            })
    }
}

/// Blocking reqwest transport
#[cfg(feature = "http")]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| TransportError::Request {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        ReqwestTransport { client }
    }
}

#[cfg(feature = "http")]
impl HttpClient for ReqwestTransport {
    fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        headers: &[Header],
    ) -> Result<Value, TransportError> {
        let mut builder = match method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };
        for header in headers {
            builder = builder.header(header.name, header.value.as_str());
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().map_err(|e| TransportError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        // Business failures arrive as JSON with any HTTP status; decode regardless.
        response.json::<Value>().map_err(|e| TransportError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_flag() {
        assert_eq!(ApiResponse::new(json!({"status": true})).status(), Some(true));
        assert!(ApiResponse::new(json!({"status": false})).is_failure());
        assert!(!ApiResponse::new(json!({"data": []})).is_failure());
        assert!(!ApiResponse::new(json!(["not", "an", "object"])).is_failure());
    }

    #[test]
    fn test_into_data() {
        let response = ApiResponse::new(json!({"status": true, "data": {"_key": "u1"}}));
        assert_eq!(response.data(), Some(&json!({"_key": "u1"})));
        assert_eq!(response.into_data(), Some(json!({"_key": "u1"})));
        assert_eq!(ApiResponse::new(json!({"status": true})).into_data(), None);
    }

    #[test]
    fn test_scripted_transport_records_calls() {
        let transport = ScriptedTransport::new();
        transport.respond("https://iam/x", json!({"data": 1}));

        let headers = vec![Header::new("x-application", "app")];
        let reply = transport
            .request(Method::Post, "https://iam/x", Some(&json!({"a": 1})), &headers)
            .unwrap();
        assert_eq!(reply, json!({"data": 1}));

        let call = transport.last_call().unwrap();
        assert_eq!(call.method, Method::Post);
        assert_eq!(call.header("x-application"), Some("app"));
        assert_eq!(call.body, Some(json!({"a": 1})));
        assert_eq!(transport.count("https://iam/x"), 1);
    }

    #[test]
    fn test_scripted_transport_unrouted() {
        let transport = ScriptedTransport::new();
        let err = transport
            .request(Method::Get, "https://iam/missing", None, &[])
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::Unrouted {
                method: Method::Get,
                url: "https://iam/missing".to_string()
            }
        );
    }

    #[test]
    fn test_header_display() {
        let header = Header::new("x-application", "app-1");
        assert_eq!(header.to_string(), "x-application: app-1");
    }
}
