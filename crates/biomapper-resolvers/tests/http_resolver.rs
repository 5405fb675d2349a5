// biomapper-resolvers/tests/http_resolver.rs
// ============================================================================
// Module: HTTP Resolver Tests
// Description: Transport behavior against a local stub endpoint.
// Purpose: Pin status mapping, policy checks, and malformed handling.
// Dependencies: biomapper-resolvers, biomapper-core, tiny_http
// ============================================================================
//! ## Overview
//! Validates the HTTP resolver against a local `tiny_http` stub: JSON
//! round trips, 429 maps to a retriable rate limit, 5xx to unavailable,
//! and uninterpretable bodies to the fatal malformed error. Scheme policy
//! is checked without any network.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::thread;

use biomapper_core::ResolveRequest;
use biomapper_core::Resolver;
use biomapper_core::ResolverCapability;
use biomapper_core::ResolverError;
use biomapper_resolvers::HttpResolver;
use biomapper_resolvers::HttpResolverConfig;

/// Starts a one-shot stub server returning the given status and body.
fn stub_server(status: u16, body: &'static str) -> String {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_string();
    thread::spawn(move || {
        if let Ok(request) = server.recv() {
            let response = tiny_http::Response::from_string(body)
                .with_status_code(tiny_http::StatusCode(status));
            let _ = request.respond(response);
        }
    });
    format!("http://{addr}/resolve")
}

/// Builds a resolver config for a stub endpoint.
fn config(endpoint: String) -> HttpResolverConfig {
    HttpResolverConfig {
        name: "stub_http".to_string(),
        endpoint,
        allow_http: true,
        ..HttpResolverConfig::default()
    }
}

/// Builds an exact-lookup request over two identifiers.
fn request() -> ResolveRequest {
    ResolveRequest {
        capability: ResolverCapability::ExactLookup,
        sources: vec!["P12345".to_string(), "Q11111".to_string()],
        options: BTreeMap::new(),
    }
}

/// Verifies a well-formed response round trips into candidates.
#[test]
fn well_formed_response_round_trips() {
    let endpoint = stub_server(
        200,
        r#"{"candidates":{"P12345":[{"target_id":"UKBB_1","confidence":0.9,"method":"historical_api"}]}}"#,
    );
    let resolver = HttpResolver::new(config(endpoint)).unwrap();
    let response = resolver.resolve(&request()).unwrap();
    let candidates = response.candidates.get("P12345").unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].target_id, "UKBB_1");
}

/// Verifies 429 maps to a retriable rate limit.
#[test]
fn status_429_maps_to_rate_limited() {
    let endpoint = stub_server(429, "slow down");
    let resolver = HttpResolver::new(config(endpoint)).unwrap();
    let error = resolver.resolve(&request()).unwrap_err();
    assert!(matches!(error, ResolverError::RateLimited { .. }));
    assert!(error.to_engine_error().retriable);
}

/// Verifies 5xx maps to retriable unavailability.
#[test]
fn status_500_maps_to_unavailable() {
    let endpoint = stub_server(500, "boom");
    let resolver = HttpResolver::new(config(endpoint)).unwrap();
    let error = resolver.resolve(&request()).unwrap_err();
    assert!(matches!(error, ResolverError::Unavailable(_)));
    assert!(error.to_engine_error().retriable);
}

/// Verifies an uninterpretable body is the fatal malformed error.
#[test]
fn bad_body_maps_to_malformed() {
    let endpoint = stub_server(200, "not json at all");
    let resolver = HttpResolver::new(config(endpoint)).unwrap();
    let error = resolver.resolve(&request()).unwrap_err();
    assert!(matches!(error, ResolverError::Malformed(_)));
    assert!(!error.to_engine_error().retriable);
}

/// Verifies out-of-range candidate confidence is malformed.
#[test]
fn out_of_range_confidence_rejected() {
    let endpoint = stub_server(
        200,
        r#"{"candidates":{"P12345":[{"target_id":"X","confidence":1.7,"method":"m"}]}}"#,
    );
    let resolver = HttpResolver::new(config(endpoint)).unwrap();
    let error = resolver.resolve(&request()).unwrap_err();
    assert!(matches!(error, ResolverError::Malformed(_)));
}

/// Verifies cleartext endpoints are rejected unless explicitly allowed.
#[test]
fn cleartext_requires_opt_in() {
    let mut denied = config("http://resolver.example/batch".to_string());
    denied.allow_http = false;
    assert!(matches!(
        HttpResolver::new(denied).unwrap_err(),
        ResolverError::Unavailable(_)
    ));
}

/// Verifies the host allowlist is enforced at construction.
#[test]
fn host_allowlist_enforced() {
    let mut config = config("http://resolver.example/batch".to_string());
    config.allowed_hosts = Some(["other.example".to_string()].into_iter().collect());
    assert!(matches!(
        HttpResolver::new(config).unwrap_err(),
        ResolverError::Unavailable(_)
    ));
}
