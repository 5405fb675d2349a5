// biomapper-server/src/lib.rs
// ============================================================================
// Module: Biomapper Server Library
// Description: Public API surface for the job-oriented HTTP server.
// Purpose: Wire registry, resolvers, library, store, and routes together.
// Dependencies: crate::{audit, error, events, jobs, routes}, axum, tokio
// ============================================================================

//! ## Overview
//! The server crate owns process assembly: it builds the action registry
//! (built-ins plus the resolver mapper), loads the strategy library from
//! disk, opens the durable job store, runs the restart recovery sweep, and
//! exposes the HTTP+JSON surface over axum. The CLI calls [`serve`] for
//! the long-running server and [`build_manager`] for offline execution.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod error;
pub mod events;
pub mod jobs;
pub mod routes;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::FileJobAuditSink;
pub use audit::JobAuditEvent;
pub use audit::JobAuditSink;
pub use audit::NoopJobAuditSink;
pub use audit::StderrJobAuditSink;
pub use error::ApiError;
pub use events::EventHub;
pub use jobs::CancelOutcome;
pub use jobs::JobManager;
pub use routes::AppState;
pub use routes::router;

// ============================================================================
// SECTION: Assembly
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use biomapper_config::BiomapperConfig;
use biomapper_config::ResolverKind;
use biomapper_config::StrategyLibrary;
use biomapper_core::ActionRegistry;
use biomapper_core::JobStore;
use biomapper_core::ResolverCapability;
use biomapper_core::SharedJobStore;
use biomapper_core::Timestamp;
use biomapper_core::confidence;
use biomapper_resolvers::HttpResolver;
use biomapper_resolvers::HttpResolverConfig;
use biomapper_resolvers::ResolverCache;
use biomapper_resolvers::ResolverMatch;
use biomapper_resolvers::ResolverRegistry;
use biomapper_resolvers::ResolverShell;
use biomapper_resolvers::TableResolver;
use biomapper_store_sqlite::PROCESS_RESTART_REASON;
use biomapper_store_sqlite::SqliteJobStore;
use biomapper_store_sqlite::SqliteStoreConfig;
use thiserror::Error;

/// Server assembly and runtime errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration failed to validate.
    #[error("config error: {0}")]
    Config(String),
    /// Strategy library failed to load.
    #[error("strategy load error: {0}")]
    StrategyLoad(String),
    /// Registry or resolver assembly failed.
    #[error("assembly error: {0}")]
    Assembly(String),
    /// Job store failed to open.
    #[error("store error: {0}")]
    Store(String),
    /// The listener could not bind or serve.
    #[error("io error: {0}")]
    Io(String),
}

/// Builds the action registry with built-ins and the resolver mapper.
///
/// # Errors
///
/// Returns [`ServerError::Assembly`] when registration or resolver
/// construction fails.
pub fn build_registry(config: &BiomapperConfig) -> Result<Arc<ActionRegistry>, ServerError> {
    let registry = Arc::new(ActionRegistry::new());
    biomapper_actions::register_builtin_actions(&registry)
        .map_err(|err| ServerError::Assembly(err.to_string()))?;

    let mut resolvers = ResolverRegistry::new();
    for entry in &config.resolvers {
        let shell = build_resolver_shell(config, entry)?;
        resolvers.register(shell);
    }
    registry
        .register(Arc::new(ResolverMatch::new(Arc::new(resolvers))))
        .map_err(|err| ServerError::Assembly(err.to_string()))?;
    Ok(registry)
}

/// Builds one shell-wrapped resolver from its config entry.
fn build_resolver_shell(
    config: &BiomapperConfig,
    entry: &biomapper_config::ResolverConfig,
) -> Result<ResolverShell, ServerError> {
    let inner: Arc<dyn biomapper_core::Resolver> = match entry.kind {
        ResolverKind::Http => {
            let endpoint = entry
                .endpoint
                .clone()
                .ok_or_else(|| ServerError::Config(format!("resolver {} has no endpoint", entry.name)))?;
            let resolver = HttpResolver::new(HttpResolverConfig {
                name: entry.name.clone(),
                endpoint,
                capabilities: parse_capabilities(&entry.capabilities),
                timeout_ms: entry.timeout_ms,
                ..HttpResolverConfig::default()
            })
            .map_err(|err| ServerError::Assembly(err.to_string()))?;
            Arc::new(resolver)
        }
        ResolverKind::Table => {
            let path = entry
                .table_path
                .clone()
                .ok_or_else(|| ServerError::Config(format!("resolver {} has no table_path", entry.name)))?;
            let resolver = TableResolver::from_tsv_path(
                entry.name.clone(),
                "direct_merge",
                confidence::DIRECT,
                &path,
            )
            .map_err(|err| ServerError::Assembly(err.to_string()))?;
            Arc::new(resolver)
        }
    };
    let mut shell = ResolverShell::new(inner, entry.timeout_ms);
    if let Some(per_sec) = entry.rate_limit_per_sec {
        shell = shell.with_rate_limit(per_sec);
    }
    if let Some(ttl_seconds) = entry.cache_ttl_seconds {
        shell = shell.with_cache(ResolverCache::new(
            config.paths.resolver_cache.clone(),
            Duration::from_secs(ttl_seconds),
        ));
    }
    Ok(shell)
}

/// Parses capability labels, defaulting to exact lookup.
fn parse_capabilities(labels: &[String]) -> Vec<ResolverCapability> {
    let mut capabilities = Vec::new();
    for label in labels {
        let capability = match label.as_str() {
            "exact-lookup" => Some(ResolverCapability::ExactLookup),
            "bridge-lookup" => Some(ResolverCapability::BridgeLookup),
            "fuzzy-match" => Some(ResolverCapability::FuzzyMatch),
            "vector-search" => Some(ResolverCapability::VectorSearch),
            "semantic-match" => Some(ResolverCapability::SemanticMatch),
            _ => None,
        };
        if let Some(capability) = capability {
            capabilities.push(capability);
        }
    }
    if capabilities.is_empty() {
        capabilities.push(ResolverCapability::ExactLookup);
    }
    capabilities
}

/// Builds the job manager: registry, library, store, recovery, and hub.
///
/// # Errors
///
/// Returns [`ServerError`] when any assembly stage fails.
pub fn build_manager(
    config: &BiomapperConfig,
    audit: Arc<dyn JobAuditSink>,
) -> Result<Arc<JobManager>, ServerError> {
    let registry = build_registry(config)?;
    let library = StrategyLibrary::load_dir(&config.paths.strategies_dir, &registry)
        .map_err(|err| ServerError::StrategyLoad(err.to_engine_error().to_string()))?;
    let store = SqliteJobStore::new(&SqliteStoreConfig::at(&config.paths.job_store))
        .map_err(|err| ServerError::Store(err.to_string()))?;
    let recovered = store
        .recover_inflight(PROCESS_RESTART_REASON, Timestamp::now())
        .map_err(|err| ServerError::Store(err.to_string()))?;
    if recovered > 0 {
        audit.record(&JobAuditEvent {
            time: Timestamp::now(),
            job_id: biomapper_core::JobId::new("<recovery>"),
            strategy: String::new(),
            status: biomapper_core::JobStatus::Failed,
            detail: Some(format!("{recovered} in-flight jobs failed on restart")),
        });
    }
    Ok(Arc::new(JobManager::new(
        library,
        registry,
        SharedJobStore::from_store(store),
        Arc::new(EventHub::new()),
        audit,
        config.paths.output_root.clone(),
        config.paths.checkpoint_root.clone(),
    )))
}

/// Runs the HTTP server until the task is aborted.
///
/// # Errors
///
/// Returns [`ServerError`] when assembly fails or the listener cannot
/// bind.
pub async fn serve(config: BiomapperConfig) -> Result<(), ServerError> {
    config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
    let audit: Arc<dyn JobAuditSink> = Arc::new(StderrJobAuditSink);
    let manager = build_manager(&config, audit)?;
    let app = router(manager);
    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .map_err(|err| ServerError::Io(err.to_string()))?;
    axum::serve(listener, app)
        .await
        .map_err(|err| ServerError::Io(err.to_string()))
}
