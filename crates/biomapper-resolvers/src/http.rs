// biomapper-resolvers/src/http.rs
// ============================================================================
// Module: HTTP Resolver
// Description: Batch resolver over an HTTP+JSON endpoint.
// Purpose: Reach external identifier services with strict limits.
// Dependencies: biomapper-core, reqwest, serde_json, url
// ============================================================================

//! ## Overview
//! The HTTP resolver posts the batch request as JSON and expects the
//! per-source candidate map back. Scheme restrictions (https unless
//! cleartext is explicitly allowed), an optional host allowlist, disabled
//! redirects, and a response size cap keep the call surface bounded.
//! Transport failures are retriable; an uninterpretable body is fatal.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::io::Read;
use std::time::Duration;

use biomapper_core::ResolveRequest;
use biomapper_core::ResolveResponse;
use biomapper_core::Resolver;
use biomapper_core::ResolverCapability;
use biomapper_core::ResolverError;
use biomapper_core::ResolverName;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use url::Url;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for the HTTP resolver.
#[derive(Debug, Clone)]
pub struct HttpResolverConfig {
    /// Resolver name exposed to mapping actions.
    pub name: String,
    /// Batch endpoint URL.
    pub endpoint: String,
    /// Capabilities the endpoint offers.
    pub capabilities: Vec<ResolverCapability>,
    /// Allow cleartext HTTP (disabled by default).
    pub allow_http: bool,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum response size allowed, in bytes.
    pub max_response_bytes: usize,
    /// Optional host allowlist.
    pub allowed_hosts: Option<BTreeSet<String>>,
    /// User agent string for outbound requests.
    pub user_agent: String,
}

impl Default for HttpResolverConfig {
    fn default() -> Self {
        Self {
            name: "http".to_string(),
            endpoint: String::new(),
            capabilities: vec![ResolverCapability::ExactLookup],
            allow_http: false,
            timeout_ms: 5_000,
            max_response_bytes: 4 * 1024 * 1024,
            allowed_hosts: None,
            user_agent: "biomapper/0.1".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Resolver Implementation
// ============================================================================

/// Batch resolver over HTTP+JSON.
#[derive(Debug)]
pub struct HttpResolver {
    /// Resolver configuration, including limits and policy.
    config: HttpResolverConfig,
    /// Validated endpoint URL.
    endpoint: Url,
    /// HTTP client used for outbound requests.
    client: Client,
}

impl HttpResolver {
    /// Creates a new HTTP resolver with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::Unavailable`] when the endpoint is invalid
    /// or the HTTP client cannot be created.
    pub fn new(config: HttpResolverConfig) -> Result<Self, ResolverError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|_| ResolverError::Unavailable("invalid endpoint url".to_string()))?;
        validate_endpoint(&endpoint, &config)?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .redirect(Policy::none())
            .build()
            .map_err(|_| ResolverError::Unavailable("http client build failed".to_string()))?;
        Ok(Self {
            config,
            endpoint,
            client,
        })
    }
}

impl Resolver for HttpResolver {
    fn name(&self) -> ResolverName {
        ResolverName::new(self.config.name.clone())
    }

    fn capabilities(&self) -> Vec<ResolverCapability> {
        self.config.capabilities.clone()
    }

    fn resolve(&self, request: &ResolveRequest) -> Result<ResolveResponse, ResolverError> {
        if !self.config.capabilities.contains(&request.capability) {
            return Err(ResolverError::Malformed(format!(
                "capability not offered by {}: {:?}",
                self.config.name, request.capability
            )));
        }
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .map_err(|err| {
                if err.is_timeout() {
                    ResolverError::Timeout {
                        timeout_ms: self.config.timeout_ms,
                    }
                } else {
                    ResolverError::Unavailable(format!("http request failed: {err}"))
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .map(|seconds| seconds.saturating_mul(1_000));
            return Err(ResolverError::RateLimited { retry_after_ms });
        }
        if status.is_server_error() {
            return Err(ResolverError::Unavailable(format!("endpoint returned {status}")));
        }
        if !status.is_success() {
            return Err(ResolverError::Malformed(format!("endpoint returned {status}")));
        }

        let body = read_limited(response, self.config.max_response_bytes)?;
        let parsed: ResolveResponse = serde_json::from_slice(&body)
            .map_err(|err| ResolverError::Malformed(format!("invalid response body: {err}")))?;
        validate_response(&parsed)?;
        Ok(parsed)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates the endpoint against scheme and host policy.
fn validate_endpoint(endpoint: &Url, config: &HttpResolverConfig) -> Result<(), ResolverError> {
    match endpoint.scheme() {
        "https" => {}
        "http" if config.allow_http => {}
        other => {
            return Err(ResolverError::Unavailable(format!(
                "endpoint scheme not allowed: {other}"
            )));
        }
    }
    if let Some(allowed) = &config.allowed_hosts {
        let host = endpoint.host_str().unwrap_or_default();
        if !allowed.contains(host) {
            return Err(ResolverError::Unavailable(format!(
                "endpoint host not in allowlist: {host}"
            )));
        }
    }
    Ok(())
}

/// Reads the response body up to the size cap.
fn read_limited(
    response: reqwest::blocking::Response,
    max_bytes: usize,
) -> Result<Vec<u8>, ResolverError> {
    let mut body = Vec::new();
    let limit = u64::try_from(max_bytes)
        .map_err(|_| ResolverError::Malformed("response size cap overflow".to_string()))?;
    let mut limited = response.take(limit.saturating_add(1));
    limited
        .read_to_end(&mut body)
        .map_err(|err| ResolverError::Unavailable(format!("read failed: {err}")))?;
    if body.len() > max_bytes {
        return Err(ResolverError::Malformed(format!(
            "response exceeds size cap of {max_bytes} bytes"
        )));
    }
    Ok(body)
}

/// Validates candidate shapes before the response crosses into the core.
fn validate_response(response: &ResolveResponse) -> Result<(), ResolverError> {
    for (source, candidates) in &response.candidates {
        if source.trim().is_empty() {
            return Err(ResolverError::Malformed(
                "response carries an empty source identifier".to_string(),
            ));
        }
        for candidate in candidates {
            if candidate.target_id.trim().is_empty() {
                return Err(ResolverError::Malformed(format!(
                    "candidate for {source} carries an empty target"
                )));
            }
            if !(0.0..=1.0).contains(&candidate.confidence) {
                return Err(ResolverError::Malformed(format!(
                    "candidate for {source} carries confidence {}",
                    candidate.confidence
                )));
            }
        }
    }
    Ok(())
}
