//! Policy grant evaluation
//!
//! The engine fetches the identity's rule list once, merges the session's
//! overload list on every evaluation, and answers filter queries:
//! - [`PolicyEngine::get_policies`] - rules matching any of the filters
//! - [`PolicyEngine::you_have_no_policies`] - whether any required filter is unmet

use super::{CompiledPattern, PatternCache, PatternMatcher, WILDCARD_ALL};
use crate::core::session::{CallFlags, Credentials, SessionManager};
use crate::core::transport::FIELD_DATA;
use crate::error::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

pub const PATH_API_POLICY: &str = "api/iam/user/rules";

/// Request-scoped policy evaluation engine
pub struct PolicyEngine {
    rules: Option<Vec<String>>,
    patterns: Arc<PatternCache>,
}

impl PolicyEngine {
    /// Create an engine with its own pattern cache
    pub fn new() -> Self {
        Self::with_pattern_cache(Arc::new(PatternCache::new_default()))
    }

    /// Create an engine sharing a pattern cache with other engines
    pub fn with_pattern_cache(patterns: Arc<PatternCache>) -> Self {
        PolicyEngine {
            rules: None,
            patterns,
        }
    }

    /// Granted rules, once loaded (overload not included)
    pub fn rules(&self) -> Option<&[String]> {
        self.rules.as_deref()
    }

    pub fn pattern_cache(&self) -> &Arc<PatternCache> {
        &self.patterns
    }

    /// Load the rule list on first use
    ///
    /// A reply without `data` is fatal: the session cookie is expired and
    /// [`crate::IamError::SessionRejected`] returned.
    fn ensure_rules(&mut self, sessions: &mut SessionManager) -> Result<()> {
        if self.rules.is_some() {
            return Ok(());
        }

        let url = sessions.config().endpoint(PATH_API_POLICY);
        let response = sessions.call_api(&url, None, CallFlags::SKIP_STATUS)?;

        let rules: Vec<String> = match response.into_data() {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(rule) => Some(rule),
                    _ => None,
                })
                .collect(),
            Some(Value::Null) | None => return Err(sessions.reject_session(PATH_API_POLICY)),
            Some(other) => {
                debug!("Unexpected {} payload: {}", FIELD_DATA, other);
                return Err(sessions.reject_session(PATH_API_POLICY));
            }
        };

        info!("Loaded {} granted rules", rules.len());
        let adopt_overload = !rules.is_empty();
        self.rules = Some(rules);

        if adopt_overload {
            sessions.adopt_inbound_overload()?;
        }
        Ok(())
    }

    /// Granted rules (plus overload) matching any of `filters`
    ///
    /// `%` filters are dropped; with nothing left, the whole merged set is
    /// returned. Order follows the merged set.
    pub fn get_policies<S: AsRef<str>>(
        &mut self,
        sessions: &mut SessionManager,
        filters: &[S],
    ) -> Result<Vec<String>> {
        sessions.get_session(Credentials::none())?;
        self.ensure_rules(sessions)?;

        let mut rules = self.rules.clone().unwrap_or_default();
        if let Some(overload) = sessions.overload() {
            rules.extend(overload.iter().cloned());
        }

        let filters: Vec<&str> = filters
            .iter()
            .map(|f| f.as_ref())
            .filter(|f| *f != WILDCARD_ALL)
            .collect();
        if filters.is_empty() {
            return Ok(rules);
        }

        let pattern = self
            .patterns
            .compile(&PatternMatcher::alternation(filters.as_slice(), false))?;
        Ok(rules.into_iter().filter(|rule| pattern.is_match(rule)).collect())
    }

    /// `true` when at least one required filter matches no granted rule
    ///
    /// Each occurrence of a filter is checked on its own; an empty requirement
    /// list is always satisfied.
    pub fn you_have_no_policies<S: AsRef<str>>(
        &mut self,
        sessions: &mut SessionManager,
        required: &[S],
    ) -> Result<bool> {
        let policies = self.get_policies(sessions, required)?;

        let mut missing = required.len();
        for filter in required {
            let pattern: CompiledPattern = self
                .patterns
                .compile(&PatternMatcher::wildcard_to_pattern(filter.as_ref(), true))?;
            if policies.iter().any(|rule| pattern.is_match(rule)) {
                missing -= 1;
            }
        }

        if missing != 0 {
            debug!("{} of {} required filters unmet", missing, required.len());
        }
        Ok(missing != 0)
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}
