//! Pattern cache shared by request-scoped engines on many threads

use iam_sso::{
    IamConfig, InboundRequest, PatternCache, PatternMatcher, PolicyEngine, ScriptedTransport,
    SessionManager,
};
use serde_json::json;
use std::sync::Arc;

fn sessions(user: usize) -> SessionManager {
    let config = IamConfig {
        host: "https://iam.example.com/".to_string(),
        cookie_name: "iam_session".to_string(),
        application_key: "app".to_string(),
        application_basename: "app".to_string(),
        policy_separator: "::".to_string(),
        trust_override_ip: true,
    };
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond(
        "https://iam.example.com/api/iam/user/rules",
        json!({"data": [format!("user{}/profile/read", user), "shared/doc/read"]}),
    );
    let request = InboundRequest::new("192.0.2.1", "https://app.example.com/")
        .with_cookie("iam_session", format!("token-{}", user));
    SessionManager::new(config, request, transport)
}

#[test]
fn test_concurrent_engines_share_compiled_patterns() {
    let cache = Arc::new(PatternCache::new(64));

    let handles: Vec<_> = (0..8)
        .map(|user| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let mut sessions = sessions(user);
                    let mut engine = PolicyEngine::with_pattern_cache(Arc::clone(&cache));

                    let own = format!("user{}/%", user);
                    assert!(!engine.you_have_no_policies(&mut sessions, &[own.as_str()]).unwrap());

                    // Grants never leak between identities
                    let other = format!("user{}/%", (user + 1) % 8);
                    assert!(engine.you_have_no_policies(&mut sessions, &[other.as_str()]).unwrap());
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert!(cache.len() <= 64);
    assert!(cache.contains(&PatternMatcher::wildcard_to_pattern("user0/%", true)));
}

#[test]
fn test_concurrent_compile_under_eviction() {
    let cache = Arc::new(PatternCache::new(4));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let idx = rand::random::<usize>() % 16;
                    let source = PatternMatcher::wildcard_to_pattern(&format!("m{}/%", idx), false);
                    let pattern = cache.compile(&source).unwrap();
                    assert!(pattern.is_match(&format!("m{}/x", idx)));
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert!(cache.len() <= 4);
}
