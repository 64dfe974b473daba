//! Configuration for the IAM client
//!
//! Values come from any [`ConfigSource`] (a plain map, the process environment,
//! or a TOML document) and are validated into an [`IamConfig`].

use crate::error::{IamError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Key for the application basename
pub const KEY_APPLICATION_BASENAME: &str = "application_basename";
/// Key for the application key sent in `x-application`
pub const KEY_APPLICATION_KEY: &str = "application_key";
/// Key for the policy separator token
pub const KEY_POLICY_SEPARATOR: &str = "policy_separator";
/// Key for the IAM host URL
pub const KEY_HOST: &str = "host";
/// Key for the session cookie name
pub const KEY_COOKIE_NAME: &str = "cookie_name";
/// Key for trusting an inbound `x-override-ip` header
pub const KEY_TRUST_OVERRIDE_IP: &str = "trust_override_ip";

/// Opaque key/value configuration lookup
pub trait ConfigSource {
    fn get(&self, key: &str) -> Option<String>;
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Reads `IAM_<KEY>` environment variables (e.g. `IAM_HOST`).
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    prefix: String,
}

impl EnvSource {
    pub fn new() -> Self {
        Self::with_prefix("IAM_")
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        EnvSource {
            prefix: prefix.into(),
        }
    }
}

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(format!("{}{}", self.prefix, key.to_uppercase())).ok()
    }
}

impl ConfigSource for toml::Table {
    fn get(&self, key: &str) -> Option<String> {
        match toml::Table::get(self, key)? {
            toml::Value::String(s) => Some(s.clone()),
            toml::Value::Boolean(b) => Some(b.to_string()),
            toml::Value::Integer(i) => Some(i.to_string()),
            _ => None,
        }
    }
}

/// Validated IAM client configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IamConfig {
    /// Base URL of the IAM service, always ending in `/`
    pub host: String,
    /// Name of the cookie holding the session token
    pub cookie_name: String,
    /// Application key sent in `x-application`
    pub application_key: String,
    /// Basename of the calling application
    pub application_basename: String,
    /// Separator between a policy name and its parameters
    pub policy_separator: String,
    /// Honour an inbound `x-override-ip` header when resolving the client IP
    #[serde(default = "default_trust_override_ip")]
    pub trust_override_ip: bool,
}

fn default_trust_override_ip() -> bool {
    true
}

impl IamConfig {
    /// Build a configuration from a key/value source
    pub fn from_source(source: &dyn ConfigSource) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            source
                .get(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| IamError::MissingConfig(key.to_string()))
        };

        let trust_override_ip = match source.get(KEY_TRUST_OVERRIDE_IP) {
            None => default_trust_override_ip(),
            Some(v) => parse_bool(&v)?,
        };

        let config = IamConfig {
            host: required(KEY_HOST)?,
            cookie_name: required(KEY_COOKIE_NAME)?,
            application_key: required(KEY_APPLICATION_KEY)?,
            application_basename: required(KEY_APPLICATION_BASENAME)?,
            policy_separator: required(KEY_POLICY_SEPARATOR)?,
            trust_override_ip,
        };
        config.normalized()
    }

    /// Parse a TOML document, either top-level keys or an `[iam]` table
    pub fn from_toml_str(document: &str) -> Result<Self> {
        let mut table: toml::Table = toml::from_str(document)?;
        let settings = match table.remove("iam") {
            Some(toml::Value::Table(iam)) => iam,
            Some(_) => return Err(IamError::Config("[iam] must be a table".to_string())),
            None => table,
        };
        let config: IamConfig = toml::Value::Table(settings).try_into()?;
        config.normalized()
    }

    /// Load a TOML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let document = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&document)
    }

    /// Full URL of an endpoint path on the IAM host
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    fn normalized(mut self) -> Result<Self> {
        if !(self.host.starts_with("http://") || self.host.starts_with("https://")) {
            return Err(IamError::Config(format!(
                "host must be an http(s) URL, got '{}'",
                self.host
            )));
        }
        if !self.host.ends_with('/') {
            self.host.push('/');
        }
        if self.cookie_name.is_empty() {
            return Err(IamError::MissingConfig(KEY_COOKIE_NAME.to_string()));
        }
        Ok(self)
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(IamError::Config(format!(
            "{} must be a boolean, got '{}'",
            KEY_TRUST_OVERRIDE_IP, other
        ))),
    }
}
