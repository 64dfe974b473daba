//! The enclosing inbound request and the effects queued for its response
//!
//! The SDK never touches a web framework directly. The calling edge fills an
//! [`InboundRequest`] from whatever it receives, and applies the
//! [`ResponseEffects`] the SDK queued once processing is done.

use std::collections::HashMap;
use url::Url;

/// Header carrying the client IP forwarded by a trusted proxy
pub const HEADER_OVERRIDE_IP: &str = "x-override-ip";

/// Base for resolving path-only request URLs
const RELATIVE_BASE: &str = "http://localhost/";

/// Snapshot of the inbound request the SDK is acting for
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    client_ip: String,
    url: String,
    path: String,
    segments: Vec<String>,
    headers: HashMap<String, String>,
    cookies: HashMap<String, String>,
    query: HashMap<String, String>,
}

impl InboundRequest {
    /// Create a request snapshot for a client address and the current URL
    pub fn new(client_ip: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        let mut request = InboundRequest {
            client_ip: client_ip.into(),
            ..Default::default()
        };

        if let Some(parsed) = parse_url(&url) {
            request.path = percent_decode(parsed.path());
            request.segments = parsed
                .path_segments()
                .map(|segments| segments.map(percent_decode).collect())
                .unwrap_or_default();
            request.query = parsed.query_pairs().into_owned().collect();
        }
        request.url = url;
        request
    }

    /// Add a header (names are case-insensitive)
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Percent-decoded query parameter
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Current URL including its query string
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Percent-decoded path component of the current URL
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment, percent-decoded
    pub fn last_path_segment(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn origin(&self) -> Option<&str> {
        self.header("origin")
    }

    /// Client address, honouring `x-override-ip` when the proxy is trusted
    pub fn client_ip(&self, trust_override: bool) -> &str {
        if trust_override {
            if let Some(ip) = self.header(HEADER_OVERRIDE_IP) {
                return ip;
            }
        }
        &self.client_ip
    }
}

/// Absolute URLs parse as-is; path-only URLs resolve against a local base
fn parse_url(url: &str) -> Option<Url> {
    Url::parse(url)
        .ok()
        .or_else(|| Url::parse(RELATIVE_BASE).ok()?.join(url).ok())
}

fn percent_decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// A cookie change the edge must apply to its response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieDirective {
    Set { name: String, value: String },
    /// Overwrite with `null` and an expiry in the past
    Expire { name: String },
}

/// Side effects queued while serving a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseEffects {
    pub cookies: Vec<CookieDirective>,
}

impl ResponseEffects {
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub(crate) fn set_cookie(&mut self, name: &str, value: &str) {
        self.cookies.push(CookieDirective::Set {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    pub(crate) fn expire_cookie(&mut self, name: &str) {
        self.cookies.push(CookieDirective::Expire {
            name: name.to_string(),
        });
    }
}
