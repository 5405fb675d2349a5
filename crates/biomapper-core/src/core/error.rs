// biomapper-core/src/core/error.rs
// ============================================================================
// Module: Biomapper Error Taxonomy
// Description: Engine-wide error kinds and the step-attributed error record.
// Purpose: Make every failure a typed value with retry classification.
// Dependencies: crate::core::identifiers, serde, thiserror
// ============================================================================

//! ## Overview
//! Errors are values throughout the engine. Every failure carries a kind
//! from the closed taxonomy, an optional step/action attribution, and a
//! retriable flag. The executor converts fatal kinds into control-flow
//! decisions; nothing in the engine unwinds across a step boundary.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::ActionType;
use crate::core::identifiers::StepName;

// ============================================================================
// SECTION: Error Kinds
// ============================================================================

/// Closed taxonomy of engine error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Strategy file failed to parse or validate at startup.
    StrategyLoad,
    /// Action type is not present in the registry.
    UnknownActionType,
    /// Action type was registered twice with different factories.
    DuplicateActionType,
    /// Expression failed to parse, resolve, or type-check.
    Expression,
    /// Action parameters violated the declared schema.
    ParamValidation,
    /// A referenced dataset key is absent from the context.
    DatasetNotFound,
    /// A referenced column is absent from a dataset.
    MissingColumn,
    /// A join did not name a column for one of its datasets.
    JoinColumnUnspecified,
    /// A named join column is absent from its dataset.
    JoinColumnNotFound,
    /// A loader input file does not exist.
    FileNotFound,
    /// A sink failed to write its output file.
    FileWriteFailed,
    /// A resolver is unreachable or reported a transient fault.
    ResolverUnavailable,
    /// A resolver rejected the request due to rate limiting.
    ResolverRateLimited,
    /// A resolver call exceeded its deadline.
    ResolverTimeout,
    /// A resolver returned a response the shell cannot interpret.
    ResolverMalformedResponse,
    /// A canonical mapping record violated its invariants.
    Validation,
    /// The job was cancelled externally.
    Cancelled,
    /// Unclassified failure; treated as fatal.
    Internal,
}

impl ErrorKind {
    /// Returns the stable uppercase error code for this kind.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::StrategyLoad => "STRATEGY_LOAD_ERROR",
            Self::UnknownActionType => "UNKNOWN_ACTION_TYPE",
            Self::DuplicateActionType => "DUPLICATE_ACTION_TYPE",
            Self::Expression => "EXPRESSION_ERROR",
            Self::ParamValidation => "PARAM_VALIDATION_ERROR",
            Self::DatasetNotFound => "DATASET_NOT_FOUND",
            Self::MissingColumn => "MISSING_COLUMN",
            Self::JoinColumnUnspecified => "JOIN_COLUMN_UNSPECIFIED",
            Self::JoinColumnNotFound => "JOIN_COLUMN_NOT_FOUND",
            Self::FileNotFound => "FILE_NOT_FOUND",
            Self::FileWriteFailed => "FILE_WRITE_FAILED",
            Self::ResolverUnavailable => "RESOLVER_UNAVAILABLE",
            Self::ResolverRateLimited => "RESOLVER_RATE_LIMITED",
            Self::ResolverTimeout => "RESOLVER_TIMEOUT",
            Self::ResolverMalformedResponse => "RESOLVER_MALFORMED_RESPONSE",
            Self::Validation => "VALIDATION_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// Returns true when the kind is retriable by default.
    #[must_use]
    pub const fn default_retriable(self) -> bool {
        matches!(
            self,
            Self::ResolverUnavailable | Self::ResolverRateLimited | Self::ResolverTimeout
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// SECTION: Engine Error
// ============================================================================

/// Step-attributed engine error record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct EngineError {
    /// Error kind from the closed taxonomy.
    pub kind: ErrorKind,
    /// Human-readable description of the failure.
    pub message: String,
    /// Step the error is attributed to, when known.
    pub step: Option<StepName>,
    /// Action type the error is attributed to, when known.
    pub action_type: Option<ActionType>,
    /// Whether the failure may be retried under an `on_error` policy.
    pub retriable: bool,
}

impl EngineError {
    /// Creates a new error with the kind's default retry classification.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            step: None,
            action_type: None,
            retriable: kind.default_retriable(),
        }
    }

    /// Attributes the error to a step.
    #[must_use]
    pub fn with_step(mut self, step: StepName) -> Self {
        self.step = Some(step);
        self
    }

    /// Attributes the error to an action type.
    #[must_use]
    pub fn with_action_type(mut self, action_type: ActionType) -> Self {
        self.action_type = Some(action_type);
        self
    }

    /// Overrides the retriable flag.
    #[must_use]
    pub const fn with_retriable(mut self, retriable: bool) -> Self {
        self.retriable = retriable;
        self
    }

    /// Shorthand for an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl From<biomapper_expr::ExprError> for EngineError {
    fn from(error: biomapper_expr::ExprError) -> Self {
        Self::new(ErrorKind::Expression, error.to_string())
    }
}
