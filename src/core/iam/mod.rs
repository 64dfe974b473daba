//! Identity and Access Management (IAM) policy matching
//!
//! Evaluates the identity's granted policies against caller filters:
//! - Fetch-once rule list per request scope
//! - Overload policies merged at evaluation time
//! - `%` wildcard filters compiled to anchored regexes
//! - LRU caching of compiled patterns, shareable across requests

mod cache;
mod engine;
mod pattern;

pub use cache::{CompiledPattern, PatternCache, DEFAULT_CAPACITY};
pub use engine::{PolicyEngine, PATH_API_POLICY};
pub use pattern::{PatternMatcher, WILDCARD, WILDCARD_ALL};

#[cfg(test)]
mod tests;
