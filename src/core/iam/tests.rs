//! Scenario tests for the policy engine

use super::*;
use crate::core::cipher::OverloadCodec;
use crate::core::config::IamConfig;
use crate::core::request::{CookieDirective, InboundRequest};
use crate::core::session::{SessionManager, HEADER_OVERLOAD};
use crate::core::transport::ScriptedTransport;
use crate::error::IamError;
use serde_json::json;
use std::sync::Arc;

const HOST: &str = "https://iam.example.com/";
const CLIENT_IP: &str = "192.0.2.10";

fn config() -> IamConfig {
    IamConfig {
        host: HOST.to_string(),
        cookie_name: "iam_session".to_string(),
        application_key: "app-123".to_string(),
        application_basename: "orders".to_string(),
        policy_separator: "::".to_string(),
        trust_override_ip: true,
    }
}

fn rules_url() -> String {
    format!("{}{}", HOST, PATH_API_POLICY)
}

fn sessions_with(
    request: InboundRequest,
    rules: serde_json::Value,
) -> (SessionManager, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond(rules_url(), rules);
    let sessions = SessionManager::new(config(), request, transport.clone());
    (sessions, transport)
}

fn authenticated() -> InboundRequest {
    InboundRequest::new(CLIENT_IP, "https://app.example.com/").with_cookie("iam_session", "tok")
}

fn standard_rules() -> serde_json::Value {
    json!({"status": true, "data": ["a/b/read", "a/b/write", "c/d/read"]})
}

#[test]
fn test_wildcard_filter() {
    let (mut sessions, _) = sessions_with(authenticated(), standard_rules());
    let mut engine = PolicyEngine::new();

    let found = engine.get_policies(&mut sessions, &["a/%/read"]).unwrap();
    assert_eq!(found, vec!["a/b/read".to_string()]);
}

#[test]
fn test_filters_are_or_joined_in_rule_order() {
    let (mut sessions, _) = sessions_with(authenticated(), standard_rules());
    let mut engine = PolicyEngine::new();

    let found = engine
        .get_policies(&mut sessions, &["c/d/read", "a/b/%"])
        .unwrap();
    assert_eq!(found, vec!["a/b/read", "a/b/write", "c/d/read"]);
}

#[test]
fn test_match_all_filter_returns_everything() {
    let (mut sessions, _) = sessions_with(authenticated(), standard_rules());
    let mut engine = PolicyEngine::new();

    let all = engine.get_policies(&mut sessions, &["%"]).unwrap();
    assert_eq!(all.len(), 3);

    let none: [&str; 0] = [];
    assert_eq!(engine.get_policies(&mut sessions, &none).unwrap().len(), 3);
}

#[test]
fn test_rules_are_fetched_once() {
    let (mut sessions, transport) = sessions_with(authenticated(), standard_rules());
    let mut engine = PolicyEngine::new();

    engine.get_policies(&mut sessions, &["a/%"]).unwrap();
    engine.get_policies(&mut sessions, &["c/%"]).unwrap();
    engine.you_have_no_policies(&mut sessions, &["a/b/read"]).unwrap();

    assert_eq!(transport.count(&rules_url()), 1);
    assert_eq!(engine.rules().map(|r| r.len()), Some(3));
}

#[test]
fn test_all_of_requirement() {
    let (mut sessions, _) = sessions_with(authenticated(), standard_rules());
    let mut engine = PolicyEngine::new();

    assert!(!engine
        .you_have_no_policies(&mut sessions, &["a/b/read", "c/d/read"])
        .unwrap());
    assert!(engine
        .you_have_no_policies(&mut sessions, &["a/b/read", "x/y/z"])
        .unwrap());
    assert!(!engine
        .you_have_no_policies(&mut sessions, &["a/%", "%/read"])
        .unwrap());
}

#[test]
fn test_empty_requirement_is_satisfied() {
    let (mut sessions, _) = sessions_with(authenticated(), json!({"data": []}));
    let mut engine = PolicyEngine::new();

    let required: [&str; 0] = [];
    assert!(!engine.you_have_no_policies(&mut sessions, &required).unwrap());
}

#[test]
fn test_duplicate_required_filters_count_independently() {
    let (mut sessions, _) = sessions_with(authenticated(), standard_rules());
    let mut engine = PolicyEngine::new();

    assert!(!engine
        .you_have_no_policies(&mut sessions, &["a/b/read", "a/b/read"])
        .unwrap());
    assert!(engine
        .you_have_no_policies(&mut sessions, &["x/y/z", "x/y/z"])
        .unwrap());
}

#[test]
fn test_overload_is_merged_but_not_cached() {
    let (mut sessions, _) = sessions_with(authenticated(), standard_rules());
    let mut engine = PolicyEngine::new();

    sessions.set_overload(vec!["z/z/z".to_string()]).unwrap();
    let all = engine.get_policies(&mut sessions, &["%"]).unwrap();
    assert_eq!(all.last().map(String::as_str), Some("z/z/z"));
    assert_eq!(all.len(), 4);

    assert!(!engine.you_have_no_policies(&mut sessions, &["z/%"]).unwrap());
    assert!(!engine.rules().unwrap().contains(&"z/z/z".to_string()));
}

#[test]
fn test_overload_duplicates_are_kept() {
    let (mut sessions, _) = sessions_with(authenticated(), standard_rules());
    let mut engine = PolicyEngine::new();

    sessions.set_overload(vec!["a/b/read".to_string()]).unwrap();
    let found = engine.get_policies(&mut sessions, &["a/b/read"]).unwrap();
    assert_eq!(found, vec!["a/b/read", "a/b/read"]);
}

#[test]
fn test_inbound_overload_header_is_adopted() {
    let header = OverloadCodec::for_client(CLIENT_IP)
        .encode(&["extra/grant/read".to_string()])
        .unwrap();
    let request = authenticated().with_header(HEADER_OVERLOAD, header);
    let (mut sessions, transport) = sessions_with(request, standard_rules());
    let mut engine = PolicyEngine::new();

    let found = engine.get_policies(&mut sessions, &["extra/%"]).unwrap();
    assert_eq!(found, vec!["extra/grant/read"]);

    // Subsequent calls carry the overload header
    transport.respond(format!("{}ping", HOST), json!({"status": true}));
    sessions
        .call_api(&format!("{}ping", HOST), None, crate::core::session::CallFlags::NONE)
        .unwrap();
    assert!(transport.last_call().unwrap().header(HEADER_OVERLOAD).is_some());
}

#[test]
fn test_inbound_overload_ignored_without_granted_rules() {
    let header = OverloadCodec::for_client(CLIENT_IP)
        .encode(&["extra/grant/read".to_string()])
        .unwrap();
    let request = authenticated().with_header(HEADER_OVERLOAD, header);
    let (mut sessions, _) = sessions_with(request, json!({"data": []}));
    let mut engine = PolicyEngine::new();

    assert!(engine.get_policies(&mut sessions, &["%"]).unwrap().is_empty());
}

#[test]
fn test_missing_rules_payload_rejects_session() {
    let (mut sessions, transport) =
        sessions_with(authenticated(), json!({"status": false, "notice": "expired"}));
    let mut engine = PolicyEngine::new();

    let err = engine.get_policies(&mut sessions, &["%"]).unwrap_err();
    assert!(matches!(err, IamError::SessionRejected { .. }));
    assert_eq!(
        sessions.take_effects().cookies,
        vec![CookieDirective::Expire {
            name: "iam_session".to_string()
        }]
    );
    assert_eq!(transport.count(&rules_url()), 1);
    assert!(engine.rules().is_none());
}

#[test]
fn test_unauthenticated_request_redirects_before_fetching() {
    let request = InboundRequest::new(CLIENT_IP, "https://app.example.com/");
    let (mut sessions, transport) = sessions_with(request, standard_rules());
    let mut engine = PolicyEngine::new();

    let err = engine.get_policies(&mut sessions, &["%"]).unwrap_err();
    assert!(matches!(err, IamError::LoginRequired { .. }));
    assert!(transport.calls().is_empty());
}

#[test]
fn test_shared_pattern_cache() {
    let cache = Arc::new(PatternCache::new(16));

    for _ in 0..3 {
        let (mut sessions, _) = sessions_with(authenticated(), standard_rules());
        let mut engine = PolicyEngine::with_pattern_cache(Arc::clone(&cache));
        engine.get_policies(&mut sessions, &["a/%/read"]).unwrap();
    }

    assert_eq!(cache.len(), 1);
    assert!(cache.contains("^(a/.*/read)$"));
}

#[test]
fn test_non_string_rules_are_skipped() {
    let (mut sessions, _) =
        sessions_with(authenticated(), json!({"data": ["a/b/read", 42, null, "c/d/read"]}));
    let mut engine = PolicyEngine::new();

    let all = engine.get_policies(&mut sessions, &["%"]).unwrap();
    assert_eq!(all, vec!["a/b/read", "c/d/read"]);
}
