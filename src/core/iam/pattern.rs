//! Wildcard filters for IAM policy names
//!
//! A filter is a policy name where `%` stands for any run of characters
//! (slashes included), e.g. `billing/%/read` or `%/invoice/%`. Everything else
//! is passed to the regex as written, so `a/(read|write)` is an alternation and
//! `.` matches any character. Filters are compiled to anchored regexes:
//!
//! ```text
//! "a/%/read"               ->  ^(a/.*/read)$
//! ["a/%/read", "c/d/%"]    ->  ^(a/.*/read|c/d/.*)$
//! ```

use regex::Regex;

/// Wildcard character in filters
pub const WILDCARD: char = '%';

/// Filter matching every policy
pub const WILDCARD_ALL: &str = "%";

/// Builds regex sources from wildcard filters
pub struct PatternMatcher;

impl PatternMatcher {
    /// Regex fragment for one filter
    ///
    /// With `capture` the wildcard becomes a capturing `(.*)`; matching is the
    /// same either way. Other characters keep their regex meaning.
    pub fn fragment(filter: &str, capture: bool) -> String {
        let wildcard = if capture { "(.*)" } else { ".*" };
        filter.replace(WILDCARD, wildcard)
    }

    /// Anchored alternation of several filters
    pub fn alternation<S: AsRef<str>>(filters: &[S], capture: bool) -> String {
        let fragments = filters
            .iter()
            .map(|f| Self::fragment(f.as_ref(), capture))
            .collect::<Vec<_>>()
            .join("|");
        format!("^({})$", fragments)
    }

    /// Anchored regex source for a single filter
    pub fn wildcard_to_pattern(filter: &str, capture: bool) -> String {
        Self::alternation(&[filter], capture)
    }

    /// Check a policy against a filter without caching
    ///
    /// A filter that is not a valid regex matches nothing.
    ///
    /// # Examples
    /// ```
    /// use iam_sso::core::iam::PatternMatcher;
    ///
    /// assert!(PatternMatcher::matches("a/%/read", "a/b/read"));
    /// assert!(PatternMatcher::matches("%", "anything/at/all"));
    /// assert!(!PatternMatcher::matches("a/%/read", "a/b/write"));
    /// ```
    pub fn matches(filter: &str, policy: &str) -> bool {
        Regex::new(&Self::wildcard_to_pattern(filter, false))
            .map(|re| re.is_match(policy))
            .unwrap_or(false)
    }
}
