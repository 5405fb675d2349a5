// biomapper-resolvers/src/shell.rs
// ============================================================================
// Module: Resolver Invocation Shell
// Description: Timeout, rate limiting, and caching around resolvers.
// Purpose: Give every outward call uniform deadlines and budgets.
// Dependencies: biomapper-core, crate::{cache, rate}
// ============================================================================

//! ## Overview
//! Every resolver call from a mapping action routes through this shell;
//! direct network calls from actions are a contract violation. The shell
//! enforces a per-call deadline (a call past its deadline surfaces as
//! `RESOLVER_TIMEOUT` while the worker runs to completion in the
//! background), applies token-bucket rate limiting, and consults the
//! on-disk TTL cache before going outward.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use biomapper_core::ResolveRequest;
use biomapper_core::ResolveResponse;
use biomapper_core::Resolver;
use biomapper_core::ResolverCapability;
use biomapper_core::ResolverError;
use biomapper_core::ResolverName;

use crate::cache::ResolverCache;
use crate::rate::TokenBucket;

// ============================================================================
// SECTION: Shell
// ============================================================================

/// Shell wrapping one resolver with timeout, rate, and cache policies.
pub struct ResolverShell {
    /// Wrapped resolver.
    inner: Arc<dyn Resolver>,
    /// Per-call deadline in milliseconds.
    timeout_ms: u64,
    /// Optional token-bucket limiter.
    rate: Option<TokenBucket>,
    /// Optional on-disk response cache.
    cache: Option<ResolverCache>,
}

impl ResolverShell {
    /// Creates a shell with only the deadline policy.
    #[must_use]
    pub fn new(inner: Arc<dyn Resolver>, timeout_ms: u64) -> Self {
        Self {
            inner,
            timeout_ms,
            rate: None,
            cache: None,
        }
    }

    /// Adds a token-bucket limiter.
    #[must_use]
    pub fn with_rate_limit(mut self, per_sec: u32) -> Self {
        self.rate = Some(TokenBucket::new(per_sec));
        self
    }

    /// Adds an on-disk response cache.
    #[must_use]
    pub fn with_cache(mut self, cache: ResolverCache) -> Self {
        self.cache = Some(cache);
        self
    }
}

impl Resolver for ResolverShell {
    fn name(&self) -> ResolverName {
        self.inner.name()
    }

    fn capabilities(&self) -> Vec<ResolverCapability> {
        self.inner.capabilities()
    }

    fn resolve(&self, request: &ResolveRequest) -> Result<ResolveResponse, ResolverError> {
        let name = self.inner.name();
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(name.as_str(), request) {
                return Ok(hit);
            }
        }
        if let Some(rate) = &self.rate {
            if !rate.try_acquire() {
                return Err(ResolverError::RateLimited {
                    retry_after_ms: Some(rate.retry_after_ms()),
                });
            }
        }

        let response = self.call_with_deadline(request)?;
        if let Some(cache) = &self.cache {
            cache.put(name.as_str(), request, &response);
        }
        Ok(response)
    }
}

impl ResolverShell {
    /// Runs the wrapped call on a worker thread under the deadline.
    fn call_with_deadline(
        &self,
        request: &ResolveRequest,
    ) -> Result<ResolveResponse, ResolverError> {
        let (sender, receiver) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let request = request.clone();
        thread::spawn(move || {
            let result = inner.resolve(&request);
            // The receiver may have timed out and gone away.
            let _ = sender.send(result);
        });
        match receiver.recv_timeout(Duration::from_millis(self.timeout_ms)) {
            Ok(result) => result,
            Err(_) => Err(ResolverError::Timeout {
                timeout_ms: self.timeout_ms,
            }),
        }
    }
}
