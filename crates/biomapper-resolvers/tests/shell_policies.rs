// biomapper-resolvers/tests/shell_policies.rs
// ============================================================================
// Module: Resolver Shell Tests
// Description: Deadline, rate-limit, and cache behavior of the shell.
// Purpose: Pin the uniform policies every outward call inherits.
// Dependencies: biomapper-resolvers, biomapper-core, tempfile
// ============================================================================
//! ## Overview
//! Validates the invocation shell: slow resolvers surface as timeouts, a
//! drained token bucket surfaces as a retriable rate limit, and cached
//! responses short-circuit repeat calls within the TTL.

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

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use biomapper_core::ResolveRequest;
use biomapper_core::ResolveResponse;
use biomapper_core::Resolver;
use biomapper_core::ResolverCandidate;
use biomapper_core::ResolverCapability;
use biomapper_core::ResolverError;
use biomapper_core::ResolverName;
use biomapper_resolvers::ResolverCache;
use biomapper_resolvers::ResolverShell;

/// Stub resolver with configurable latency and an invocation counter.
struct StubResolver {
    /// Artificial latency per call.
    delay: Duration,
    /// Observed call count.
    calls: Arc<Mutex<u32>>,
}

impl Resolver for StubResolver {
    fn name(&self) -> ResolverName {
        ResolverName::new("stub")
    }

    fn capabilities(&self) -> Vec<ResolverCapability> {
        vec![ResolverCapability::ExactLookup]
    }

    fn resolve(&self, request: &ResolveRequest) -> Result<ResolveResponse, ResolverError> {
        *self.calls.lock().unwrap() += 1;
        std::thread::sleep(self.delay);
        let mut response = ResolveResponse::default();
        for source in &request.sources {
            response.candidates.insert(
                source.clone(),
                vec![ResolverCandidate {
                    target_id: format!("T:{source}"),
                    confidence: 0.9,
                    method: "historical_api".to_string(),
                    details: None,
                }],
            );
        }
        Ok(response)
    }
}

/// Builds an exact-lookup request over one identifier.
fn request() -> ResolveRequest {
    ResolveRequest {
        capability: ResolverCapability::ExactLookup,
        sources: vec!["P12345".to_string()],
        options: std::collections::BTreeMap::new(),
    }
}

/// Verifies a slow call surfaces as a retriable timeout.
#[test]
fn slow_call_times_out() {
    let calls = Arc::new(Mutex::new(0));
    let shell = ResolverShell::new(
        Arc::new(StubResolver {
            delay: Duration::from_millis(250),
            calls: Arc::clone(&calls),
        }),
        50,
    );
    let error = shell.resolve(&request()).unwrap_err();
    assert!(matches!(error, ResolverError::Timeout { timeout_ms: 50 }));
    assert!(error.to_engine_error().retriable);
}

/// Verifies a fast call completes under the deadline.
#[test]
fn fast_call_completes() {
    let calls = Arc::new(Mutex::new(0));
    let shell = ResolverShell::new(
        Arc::new(StubResolver {
            delay: Duration::from_millis(0),
            calls: Arc::clone(&calls),
        }),
        1_000,
    );
    let response = shell.resolve(&request()).unwrap();
    assert_eq!(response.candidates.len(), 1);
}

/// Verifies a drained bucket surfaces as a retriable rate limit.
#[test]
fn drained_bucket_rate_limits() {
    let calls = Arc::new(Mutex::new(0));
    let shell = ResolverShell::new(
        Arc::new(StubResolver {
            delay: Duration::from_millis(0),
            calls: Arc::clone(&calls),
        }),
        1_000,
    )
    .with_rate_limit(2);

    assert!(shell.resolve(&request()).is_ok());
    assert!(shell.resolve(&request()).is_ok());
    let error = shell.resolve(&request()).unwrap_err();
    let ResolverError::RateLimited { retry_after_ms } = error else {
        panic!("expected rate limit, got {error}");
    };
    assert!(retry_after_ms.is_some_and(|ms| ms > 0));
}

/// Verifies cached responses short-circuit repeat calls.
#[test]
fn cache_short_circuits_repeat_calls() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(Mutex::new(0));
    let shell = ResolverShell::new(
        Arc::new(StubResolver {
            delay: Duration::from_millis(0),
            calls: Arc::clone(&calls),
        }),
        1_000,
    )
    .with_cache(ResolverCache::new(dir.path().to_path_buf(), Duration::from_secs(3600)));

    let first = shell.resolve(&request()).unwrap();
    let second = shell.resolve(&request()).unwrap();
    assert_eq!(first, second);
    assert_eq!(*calls.lock().unwrap(), 1);

    // A different request misses the cache.
    let mut other = request();
    other.sources = vec!["Q99999".to_string()];
    shell.resolve(&other).unwrap();
    assert_eq!(*calls.lock().unwrap(), 2);
}

/// Verifies concurrent writers of one cache key never corrupt the entry.
#[test]
fn concurrent_cache_writers_stay_atomic() {
    let dir = tempfile::tempdir().unwrap();
    let cache = std::sync::Arc::new(ResolverCache::new(
        dir.path().to_path_buf(),
        Duration::from_secs(3600),
    ));

    let mut response = ResolveResponse::default();
    response.candidates.insert(
        "P12345".to_string(),
        vec![ResolverCandidate {
            target_id: "T:P12345".to_string(),
            confidence: 0.9,
            method: "historical_api".to_string(),
            details: None,
        }],
    );

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let cache = std::sync::Arc::clone(&cache);
            let response = response.clone();
            scope.spawn(move || {
                for _ in 0..20 {
                    cache.put("stub", &request(), &response);
                }
            });
        }
    });

    // Every writer stored the same payload; the entry must parse cleanly.
    let cached = cache.get("stub", &request()).unwrap();
    assert_eq!(cached, response);
}

/// Verifies expired entries are misses.
#[test]
fn expired_cache_entries_miss() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(Mutex::new(0));
    let shell = ResolverShell::new(
        Arc::new(StubResolver {
            delay: Duration::from_millis(0),
            calls: Arc::clone(&calls),
        }),
        1_000,
    )
    .with_cache(ResolverCache::new(dir.path().to_path_buf(), Duration::from_millis(1)));

    shell.resolve(&request()).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    shell.resolve(&request()).unwrap();
    assert_eq!(*calls.lock().unwrap(), 2);
}
