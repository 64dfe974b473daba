//! Calls to sibling applications through their SSO gateway link
//!
//! The IAM service publishes a base URL for every registered application.
//! Links are resolved once per request and reused.

use crate::core::session::{CallFlags, SessionManager};
use crate::core::transport::ApiResponse;
use crate::error::{IamError, Result};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

pub const PATH_API_LINK: &str = "api/sso/application/link";

const PATH_STRUCTURE: &str = "structure";
const PATH_API: &str = "api";

/// Request-scoped gateway with a link cache
#[derive(Debug, Default)]
pub struct Gateway {
    links: HashMap<String, String>,
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base URL of application `basename`, `None` when the IAM has no link
    pub fn link(
        &mut self,
        sessions: &mut SessionManager,
        basename: &str,
    ) -> Result<Option<String>> {
        if let Some(link) = self.links.get(basename) {
            return Ok(Some(link.clone()));
        }

        let url = format!("{}/{}", sessions.config().endpoint(PATH_API_LINK), basename);
        let response = sessions.call_api(&url, None, CallFlags::NONE)?;

        let link = match response.into_data() {
            Some(Value::String(link)) if !link.is_empty() => link,
            _ => return Ok(None),
        };

        debug!("Gateway link for '{}' is {}", basename, link);
        self.links.insert(basename.to_string(), link.clone());
        Ok(Some(link))
    }

    /// Structure document `path` published by application `basename`
    pub fn structure(
        &mut self,
        sessions: &mut SessionManager,
        basename: &str,
        path: &str,
    ) -> Result<Option<Value>> {
        let url = format!("{}{}/{}", self.require_link(sessions, basename)?, PATH_STRUCTURE, path);
        let response = sessions.call_api(&url, None, CallFlags::NONE)?;
        Ok(response.into_data())
    }

    /// Call API `path` of application `basename` with the session headers
    pub fn call(
        &mut self,
        sessions: &mut SessionManager,
        basename: &str,
        path: &str,
        post: Option<&Value>,
    ) -> Result<ApiResponse> {
        let url = format!("{}{}/{}", self.require_link(sessions, basename)?, PATH_API, path);
        sessions.call_api(&url, post, CallFlags::NONE)
    }

    fn require_link(&mut self, sessions: &mut SessionManager, basename: &str) -> Result<String> {
        self.link(sessions, basename)?
            .ok_or_else(|| IamError::UnknownApplication(basename.to_string()))
    }
}
