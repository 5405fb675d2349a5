// biomapper-config/src/settings.rs
// ============================================================================
// Module: Biomapper Settings
// Description: Engine configuration loading and validation.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, toml
// ============================================================================

//! ## Overview
//! Engine settings load from a TOML file with strict size and path limits.
//! Missing or invalid configuration fails closed. Strategies themselves are
//! YAML and load through the strategy loader; this module only covers the
//! process-level settings: listen address, directories, worker bounds, and
//! resolver endpoints.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "biomapper.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "BIOMAPPER_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum DAG worker pool bound.
pub(crate) const MAX_WORKERS_LIMIT: usize = 64;
/// Minimum resolver timeout in milliseconds.
pub(crate) const MIN_RESOLVER_TIMEOUT_MS: u64 = 100;
/// Maximum resolver timeout in milliseconds.
pub(crate) const MAX_RESOLVER_TIMEOUT_MS: u64 = 120_000;
/// Maximum resolver requests per second.
pub(crate) const MAX_RESOLVER_RATE_PER_SEC: u32 = 10_000;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Biomapper engine configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BiomapperConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Filesystem layout configuration.
    #[serde(default)]
    pub paths: PathsConfig,
    /// Execution configuration.
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Resolver endpoint configuration entries.
    #[serde(default)]
    pub resolvers: Vec<ResolverConfig>,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address for the HTTP API.
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { listen: default_listen() }
    }
}

/// Returns the default listen address.
fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

/// Filesystem layout configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Directory scanned for `<strategy_name>.yaml` files.
    #[serde(default = "default_strategies_dir")]
    pub strategies_dir: PathBuf,
    /// Root directory for per-job output trees.
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    /// Root directory for checkpoint snapshots.
    #[serde(default = "default_checkpoint_root")]
    pub checkpoint_root: PathBuf,
    /// Path of the embedded job store database file.
    #[serde(default = "default_job_store")]
    pub job_store: PathBuf,
    /// Root directory for the resolver response cache.
    #[serde(default = "default_resolver_cache")]
    pub resolver_cache: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            strategies_dir: default_strategies_dir(),
            output_root: default_output_root(),
            checkpoint_root: default_checkpoint_root(),
            job_store: default_job_store(),
            resolver_cache: default_resolver_cache(),
        }
    }
}

/// Returns the default strategies directory.
fn default_strategies_dir() -> PathBuf {
    PathBuf::from("strategies")
}

/// Returns the default output root.
fn default_output_root() -> PathBuf {
    PathBuf::from("output")
}

/// Returns the default checkpoint root.
fn default_checkpoint_root() -> PathBuf {
    PathBuf::from("checkpoints")
}

/// Returns the default job store path.
fn default_job_store() -> PathBuf {
    PathBuf::from("biomapper-jobs.db")
}

/// Returns the default resolver cache root.
fn default_resolver_cache() -> PathBuf {
    PathBuf::from("resolver-cache")
}

/// Execution configuration.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ExecutionConfig {
    /// Worker bound for DAG-parallel steps and parallel `for_each`.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self { max_workers: default_max_workers() }
    }
}

/// Returns the default worker bound.
const fn default_max_workers() -> usize {
    4
}

/// Resolver transport kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverKind {
    /// HTTP batch endpoint.
    Http,
    /// Local identifier table loaded from a delimited file.
    Table,
}

/// One resolver endpoint entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    /// Resolver name referenced by mapping actions.
    pub name: String,
    /// Transport kind.
    pub kind: ResolverKind,
    /// Endpoint URL (http resolvers).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Table file path (table resolvers).
    #[serde(default)]
    pub table_path: Option<PathBuf>,
    /// Capability labels the resolver offers.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Per-call timeout in milliseconds.
    #[serde(default = "default_resolver_timeout_ms")]
    pub timeout_ms: u64,
    /// Token-bucket refill rate (requests per second); unlimited when
    /// absent.
    #[serde(default)]
    pub rate_limit_per_sec: Option<u32>,
    /// On-disk response cache TTL in seconds; caching disabled when
    /// absent.
    #[serde(default)]
    pub cache_ttl_seconds: Option<u64>,
}

/// Returns the default resolver timeout.
const fn default_resolver_timeout_ms() -> u64 {
    5_000
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// Config file failed to parse.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Config failed validation.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl BiomapperConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server
            .listen
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::Invalid(format!("invalid listen address: {}", self.server.listen)))?;
        if self.execution.max_workers == 0 || self.execution.max_workers > MAX_WORKERS_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_workers must be in 1..={MAX_WORKERS_LIMIT}"
            )));
        }
        for dir in [
            &self.paths.strategies_dir,
            &self.paths.output_root,
            &self.paths.checkpoint_root,
            &self.paths.job_store,
            &self.paths.resolver_cache,
        ] {
            validate_path(dir)?;
        }
        let mut seen = std::collections::BTreeSet::new();
        for resolver in &self.resolvers {
            resolver.validate()?;
            if !seen.insert(resolver.name.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate resolver name: {}",
                    resolver.name
                )));
            }
        }
        Ok(())
    }
}

impl ResolverConfig {
    /// Validates one resolver entry.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the entry is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("resolver name must be non-empty".to_string()));
        }
        match self.kind {
            ResolverKind::Http => {
                if self.endpoint.as_deref().is_none_or(str::is_empty) {
                    return Err(ConfigError::Invalid(format!(
                        "http resolver {} requires an endpoint",
                        self.name
                    )));
                }
            }
            ResolverKind::Table => {
                if self.table_path.is_none() {
                    return Err(ConfigError::Invalid(format!(
                        "table resolver {} requires a table_path",
                        self.name
                    )));
                }
            }
        }
        if !(MIN_RESOLVER_TIMEOUT_MS..=MAX_RESOLVER_TIMEOUT_MS).contains(&self.timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "resolver {} timeout_ms outside {MIN_RESOLVER_TIMEOUT_MS}..={MAX_RESOLVER_TIMEOUT_MS}",
                self.name
            )));
        }
        if let Some(rate) = self.rate_limit_per_sec {
            if rate == 0 || rate > MAX_RESOLVER_RATE_PER_SEC {
                return Err(ConfigError::Invalid(format!(
                    "resolver {} rate_limit_per_sec outside 1..={MAX_RESOLVER_RATE_PER_SEC}",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Path Helpers
// ============================================================================

/// Resolves the config path from the argument, env override, or default.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(value) = env::var(CONFIG_ENV_VAR) {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value));
        }
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates a path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let rendered = path.display().to_string();
    if rendered.is_empty() {
        return Err(ConfigError::Invalid("path must be non-empty".to_string()));
    }
    if rendered.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(
                "path contains an overlong component".to_string(),
            ));
        }
    }
    Ok(())
}
