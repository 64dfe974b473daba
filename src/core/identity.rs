//! Identity facade
//!
//! [`IdentityFacade`] bundles the request's [`SessionManager`] and
//! [`PolicyEngine`] and exposes the identity-level operations on top of them:
//! whoami, policy queries, directory reads and the SSO callback.
//!
//! Secondary reads (users, applications, hierarchy, escalation) soft-fail to
//! `None` when the reply carries no `data`. Whoami is a bootstrap call: a
//! missing payload drops the session.

use crate::core::iam::PolicyEngine;
use crate::core::request::ResponseEffects;
use crate::core::session::{CallFlags, Credentials, Session, SessionManager};
use crate::core::transport::FIELD_STATUS;
use crate::error::{IamError, Result};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const PATH_API_WHOAMI: &str = "api/iam/user/whoami";
pub const PATH_API_POLICY_MANDATORIES: &str = "api/iam/policy/mandatories";
pub const PATH_API_USER_READ: &str = "api/iam/user/read";
pub const PATH_API_USER_HIERARCHY: &str = "api/iam/user/hierarchy";
pub const PATH_API_USER_ESCALATION: &str = "api/iam/user/escalation";
pub const PATH_API_APPLICATION_READ: &str = "api/sso/application/read";

/// Identity property of users and applications
pub const IDENTITY: &str = "_key";
pub const USER_LANGUAGE: &str = "language";

/// Query parameter carrying the base64 return target of the SSO callback
pub const RETURN_URL: &str = "return_url";

pub const DEFAULT_HIERARCHY_KIND: &str = IDENTITY;
pub const DEFAULT_ESCALATION_SKIP: &str = "none";

/// Records keyed by their `_key`
pub type KeyedRecords = BTreeMap<String, Value>;

/// Redirect produced by the SSO callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRedirect {
    pub status: u16,
    pub location: String,
}

/// Identity operations for one inbound request
pub struct IdentityFacade {
    sessions: SessionManager,
    policies: PolicyEngine,
    whoami: Option<Value>,
}

impl IdentityFacade {
    pub fn new(sessions: SessionManager) -> Self {
        Self::with_policy_engine(sessions, PolicyEngine::new())
    }

    /// Use an engine built elsewhere (e.g. sharing a pattern cache)
    pub fn with_policy_engine(sessions: SessionManager, policies: PolicyEngine) -> Self {
        IdentityFacade {
            sessions,
            policies,
            whoami: None,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn sessions_mut(&mut self) -> &mut SessionManager {
        &mut self.sessions
    }

    pub fn policy_engine(&self) -> &PolicyEngine {
        &self.policies
    }

    pub fn get_session(&mut self, credentials: Credentials<'_>) -> Result<&Session> {
        self.sessions.get_session(credentials)
    }

    /// Profile of the current identity, fetched once per request
    pub fn whoami(&mut self) -> Result<&Value> {
        let profile = match self.whoami.take() {
            Some(profile) => profile,
            None => self.fetch_whoami()?,
        };
        Ok(self.whoami.insert(profile))
    }

    fn fetch_whoami(&mut self) -> Result<Value> {
        let url = self.sessions.config().endpoint(PATH_API_WHOAMI);
        let response = self.sessions.call_api(&url, None, CallFlags::SKIP_STATUS)?;
        match response.into_data() {
            Some(Value::Null) | None => Err(self.sessions.reject_session(PATH_API_WHOAMI)),
            Some(profile) => {
                debug!("Whoami resolved");
                Ok(profile)
            }
        }
    }

    pub fn whoami_key(&mut self) -> Result<Option<String>> {
        self.whoami_string(IDENTITY)
    }

    pub fn whoami_language(&mut self) -> Result<Option<String>> {
        self.whoami_string(USER_LANGUAGE)
    }

    fn whoami_string(&mut self, field: &str) -> Result<Option<String>> {
        Ok(self
            .whoami()?
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    /// Granted rules (plus overload) matching any of `filters`
    pub fn get_policies<S: AsRef<str>>(&mut self, filters: &[S]) -> Result<Vec<String>> {
        self.policies.get_policies(&mut self.sessions, filters)
    }

    /// `true` when at least one required filter matches no granted rule
    pub fn you_have_no_policies<S: AsRef<str>>(&mut self, required: &[S]) -> Result<bool> {
        self.policies.you_have_no_policies(&mut self.sessions, required)
    }

    /// Ask the IAM service whether the identity holds the mandatory policies
    pub fn request_mandatory_policies<S: AsRef<str>>(&mut self, filters: &[S]) -> Result<bool> {
        if filters.is_empty() {
            return Ok(false);
        }

        let body = Value::Array(
            filters
                .iter()
                .map(|f| Value::String(f.as_ref().to_string()))
                .collect(),
        );
        let url = self.sessions.config().endpoint(PATH_API_POLICY_MANDATORIES);
        let response = self
            .sessions
            .call_api(&url, Some(&body), CallFlags::SKIP_STATUS)?;

        Ok(response
            .field(FIELD_STATUS)
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    /// Users selected by `keys`, keyed by `_key`
    ///
    /// `query` is appended verbatim after `?`; `post` carries extra body fields.
    pub fn get_users<S: AsRef<str>>(
        &mut self,
        query: &str,
        post: Option<Map<String, Value>>,
        keys: &[S],
    ) -> Result<Option<KeyedRecords>> {
        self.read_keyed(PATH_API_USER_READ, query, post, keys)
    }

    /// Applications selected by `keys`, keyed by `_key`
    pub fn get_applications<S: AsRef<str>>(
        &mut self,
        query: &str,
        post: Option<Map<String, Value>>,
        keys: &[S],
    ) -> Result<Option<KeyedRecords>> {
        self.read_keyed(PATH_API_APPLICATION_READ, query, post, keys)
    }

    fn read_keyed<S: AsRef<str>>(
        &mut self,
        path: &str,
        query: &str,
        post: Option<Map<String, Value>>,
        keys: &[S],
    ) -> Result<Option<KeyedRecords>> {
        let mut body = post.unwrap_or_default();
        body.insert(
            IDENTITY.to_string(),
            Value::Array(
                keys.iter()
                    .map(|k| Value::String(k.as_ref().to_string()))
                    .collect(),
            ),
        );

        let url = format!("{}?{}", self.sessions.config().endpoint(path), query);
        let response = self
            .sessions
            .call_api(&url, Some(&Value::Object(body)), CallFlags::NONE)?;

        let records = match response.into_data() {
            Some(Value::Array(records)) => records,
            _ => return Ok(None),
        };
        Ok(Some(rekey(records)))
    }

    /// Hierarchy of the identity, projected on `kind` (`_key`, `email`, ...)
    pub fn get_hierarchy(&mut self, kind: &str) -> Result<Option<Vec<Value>>> {
        let url = format!(
            "{}/{}",
            self.sessions.config().endpoint(PATH_API_USER_HIERARCHY),
            kind
        );
        let response = self.sessions.call_api(&url, None, CallFlags::NONE)?;
        Ok(data_list(response.into_data()))
    }

    /// Escalation chain for `route`, skipping the `skip` level
    pub fn get_escalation(&mut self, route: &str, skip: &str) -> Result<Option<Vec<Value>>> {
        self.sessions.get_session(Credentials::none())?;

        let url = format!(
            "{}/{}?skip={}",
            self.sessions.config().endpoint(PATH_API_USER_ESCALATION),
            route,
            skip
        );
        let response = self.sessions.call_api(&url, None, CallFlags::SKIP_STATUS)?;
        Ok(data_list(response.into_data()))
    }

    /// Complete the SSO return leg
    ///
    /// The last path segment of the current URL is the base64 token handed
    /// back by the IAM login page. It seeds the session, must resolve a
    /// whoami, and is stored in the session cookie. Segment and `return_url`
    /// are percent-decoded before the base64 decode.
    pub fn auth_callback(&mut self) -> Result<AuthRedirect> {
        let segment = self
            .sessions
            .request()
            .last_path_segment()
            .unwrap_or_default()
            .to_string();
        let token = decode_base64(&segment)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                IamError::InvalidCallback(format!("undecodable token segment '{}'", segment))
            })?;

        self.whoami = None;
        self.sessions.get_session(Credentials::token(&token))?;
        self.whoami()?;
        self.sessions.remember(&token);

        let request = self.sessions.request();
        let location = request
            .query(RETURN_URL)
            .and_then(decode_base64)
            .or_else(|| request.origin().map(str::to_string))
            .unwrap_or_else(|| request.url().to_string());

        info!("SSO callback accepted; redirecting to {}", location);
        Ok(AuthRedirect {
            status: 301,
            location,
        })
    }

    pub fn take_effects(&mut self) -> ResponseEffects {
        self.sessions.take_effects()
    }
}

fn data_list(data: Option<Value>) -> Option<Vec<Value>> {
    match data {
        Some(Value::Array(items)) => Some(items),
        _ => None,
    }
}

/// Index records by `_key`; the first record wins, records without a key are dropped
fn rekey(records: Vec<Value>) -> KeyedRecords {
    let mut keyed = KeyedRecords::new();
    for record in records {
        let key = match record.get(IDENTITY) {
            Some(Value::String(key)) => key.clone(),
            Some(Value::Number(key)) => key.to_string(),
            _ => continue,
        };
        keyed.entry(key).or_insert(record);
    }
    keyed
}

/// Decode base64 in either alphabet, padded or not
fn decode_base64(encoded: &str) -> Option<String> {
    let encoded = encoded.trim();
    [URL_SAFE_NO_PAD, URL_SAFE, STANDARD, STANDARD_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(encoded).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rekey_first_write_wins() {
        let keyed = rekey(vec![
            json!({"_key": "1", "name": "first"}),
            json!({"name": "anonymous"}),
            json!({"_key": "1", "name": "second"}),
            json!({"_key": 2, "name": "numeric"}),
        ]);

        assert_eq!(keyed.len(), 2);
        assert_eq!(keyed["1"]["name"], "first");
        assert_eq!(keyed["2"]["name"], "numeric");
    }

    #[test]
    fn test_decode_base64_alphabets() {
        assert_eq!(decode_base64("aGVsbG8"), Some("hello".to_string()));
        assert_eq!(decode_base64("aGVsbG8="), Some("hello".to_string()));
        assert_eq!(
            decode_base64(&URL_SAFE_NO_PAD.encode("a?b>c")),
            Some("a?b>c".to_string())
        );
        assert_eq!(
            decode_base64(&STANDARD.encode("a?b>c")),
            Some("a?b>c".to_string())
        );
        assert_eq!(decode_base64("!!!"), None);
    }

    #[test]
    fn test_data_list() {
        assert_eq!(data_list(Some(json!([1, 2]))), Some(vec![json!(1), json!(2)]));
        assert_eq!(data_list(Some(json!({"a": 1}))), None);
        assert_eq!(data_list(None), None);
    }
}
