// biomapper-config/src/loader.rs
// ============================================================================
// Module: Biomapper Strategy Loader
// Description: YAML strategy directory scanning and validation.
// Purpose: Build the immutable strategy library at process startup.
// Dependencies: biomapper-core, serde_yaml
// ============================================================================

//! ## Overview
//! At startup the loader scans the configured strategies directory for
//! `<strategy_name>.yaml` files, parses each, and validates structure,
//! action types (against the registry), dependencies, and embedded
//! expressions. Any failure is a `STRATEGY_LOAD_ERROR` carrying file path
//! and parse location; a process with an invalid strategy directory does
//! not start. Loaded strategies are immutable for process lifetime.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use biomapper_core::ActionRegistry;
use biomapper_core::EngineError;
use biomapper_core::ErrorKind;
use biomapper_core::Strategy;
use biomapper_core::StrategyName;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum strategy file size in bytes.
const MAX_STRATEGY_FILE_SIZE: usize = 1024 * 1024;

/// Accepted strategy file extensions.
const STRATEGY_EXTENSIONS: &[&str] = &["yaml", "yml"];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Strategy loading errors.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The strategies directory could not be read.
    #[error("strategy directory unreadable: {path}: {message}")]
    Directory {
        /// Directory path.
        path: PathBuf,
        /// Underlying I/O message.
        message: String,
    },
    /// A strategy file could not be read.
    #[error("strategy file unreadable: {path}: {message}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying I/O message.
        message: String,
    },
    /// A strategy file failed to parse.
    #[error("strategy parse error in {path} at {location}: {message}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Parse location (line:column when available).
        location: String,
        /// Parser message.
        message: String,
    },
    /// A strategy failed validation.
    #[error("strategy validation error in {path}: {message}")]
    Validation {
        /// File path.
        path: PathBuf,
        /// Validation message.
        message: String,
    },
    /// Two strategy files declare the same name.
    #[error("duplicate strategy name {name} (first declared in {first})")]
    DuplicateName {
        /// Conflicting strategy name.
        name: String,
        /// File that declared the name first.
        first: PathBuf,
    },
    /// A file's stem does not match the declared strategy name.
    #[error("strategy file {path} declares mismatched name {name}")]
    NameMismatch {
        /// File path.
        path: PathBuf,
        /// Declared strategy name.
        name: String,
    },
}

impl LoaderError {
    /// Converts the loader error into the engine taxonomy.
    #[must_use]
    pub fn to_engine_error(&self) -> EngineError {
        EngineError::new(ErrorKind::StrategyLoad, self.to_string())
    }
}

// ============================================================================
// SECTION: Strategy Library
// ============================================================================

/// Summary of one loaded strategy for listing endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategySummary {
    /// Strategy name.
    pub name: String,
    /// Strategy description.
    pub description: String,
    /// Parameter defaults, doubling as the parameter schema surface.
    #[serde(rename = "parameters_schema")]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

/// Immutable library of loaded strategies.
#[derive(Debug, Default, Clone)]
pub struct StrategyLibrary {
    /// Strategies keyed by name.
    strategies: BTreeMap<StrategyName, Arc<Strategy>>,
}

impl StrategyLibrary {
    /// Scans a directory and builds the library.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError`] when any file fails to read, parse, or
    /// validate.
    pub fn load_dir(dir: &Path, registry: &ActionRegistry) -> Result<Self, LoaderError> {
        let entries = fs::read_dir(dir).map_err(|err| LoaderError::Directory {
            path: dir.to_path_buf(),
            message: err.to_string(),
        })?;
        let mut files: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| LoaderError::Directory {
                path: dir.to_path_buf(),
                message: err.to_string(),
            })?;
            let path = entry.path();
            let is_strategy = path
                .extension()
                .and_then(|extension| extension.to_str())
                .is_some_and(|extension| STRATEGY_EXTENSIONS.contains(&extension));
            if is_strategy {
                files.push(path);
            }
        }
        files.sort();

        let mut library = Self::default();
        let mut sources: BTreeMap<String, PathBuf> = BTreeMap::new();
        for path in files {
            let strategy = load_file(&path, registry)?;
            if let Some(first) = sources.get(&strategy.name) {
                return Err(LoaderError::DuplicateName {
                    name: strategy.name.clone(),
                    first: first.clone(),
                });
            }
            sources.insert(strategy.name.clone(), path);
            library
                .strategies
                .insert(StrategyName::new(strategy.name.clone()), Arc::new(strategy));
        }
        Ok(library)
    }

    /// Builds a library from in-memory strategies (tests and demos).
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Validation`] when a strategy fails
    /// validation or a name repeats.
    pub fn from_strategies(
        strategies: Vec<Strategy>,
        registry: Option<&ActionRegistry>,
    ) -> Result<Self, LoaderError> {
        let mut library = Self::default();
        for strategy in strategies {
            strategy.validate(registry).map_err(|err| LoaderError::Validation {
                path: PathBuf::from(format!("<memory:{}>", strategy.name)),
                message: err.to_string(),
            })?;
            let name = StrategyName::new(strategy.name.clone());
            if library.strategies.contains_key(&name) {
                return Err(LoaderError::DuplicateName {
                    name: strategy.name.clone(),
                    first: PathBuf::from("<memory>"),
                });
            }
            library.strategies.insert(name, Arc::new(strategy));
        }
        Ok(library)
    }

    /// Returns a strategy by name.
    #[must_use]
    pub fn get(&self, name: &StrategyName) -> Option<Arc<Strategy>> {
        self.strategies.get(name).cloned()
    }

    /// Returns the number of loaded strategies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Returns true when no strategies are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Lists strategy summaries in name order.
    #[must_use]
    pub fn list(&self) -> Vec<StrategySummary> {
        self.strategies
            .values()
            .map(|strategy| StrategySummary {
                name: strategy.name.clone(),
                description: strategy.description.clone(),
                parameters: strategy.parameters.clone(),
            })
            .collect()
    }
}

// ============================================================================
// SECTION: File Loading
// ============================================================================

/// Loads and validates one strategy file.
fn load_file(path: &Path, registry: &ActionRegistry) -> Result<Strategy, LoaderError> {
    let bytes = fs::read(path).map_err(|err| LoaderError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    if bytes.len() > MAX_STRATEGY_FILE_SIZE {
        return Err(LoaderError::Validation {
            path: path.to_path_buf(),
            message: "strategy file exceeds size limit".to_string(),
        });
    }
    let content = std::str::from_utf8(&bytes).map_err(|_| LoaderError::Validation {
        path: path.to_path_buf(),
        message: "strategy file must be utf-8".to_string(),
    })?;
    let strategy: Strategy = serde_yaml::from_str(content).map_err(|err| LoaderError::Parse {
        path: path.to_path_buf(),
        location: err
            .location()
            .map_or_else(|| "unknown".to_string(), |at| format!("{}:{}", at.line(), at.column())),
        message: err.to_string(),
    })?;

    let stem = path.file_stem().and_then(|stem| stem.to_str()).unwrap_or_default();
    if stem != strategy.name {
        return Err(LoaderError::NameMismatch {
            path: path.to_path_buf(),
            name: strategy.name,
        });
    }
    strategy.validate(Some(registry)).map_err(|err| LoaderError::Validation {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    Ok(strategy)
}
