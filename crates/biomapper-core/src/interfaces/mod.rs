// biomapper-core/src/interfaces/mod.rs
// ============================================================================
// Module: Biomapper Interfaces
// Description: Contract surfaces for actions, resolvers, stores, and events.
// Purpose: Define the seams the executor and collaborators integrate through.
// Dependencies: crate::{core, schema}
// ============================================================================

//! ## Overview
//! This leaf module defines the contracts the rest of the workspace plugs
//! into: the typed [`Action`] interface, the black-box [`Resolver`]
//! collaborator interface, the [`JobStore`] persistence seam, and the
//! [`StepEventSink`] observability seam. Actions and the executor both
//! depend on this module, never on each other.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::context::ExecutionContext;
use crate::core::error::EngineError;
use crate::core::error::ErrorKind;
use crate::core::identifiers::ActionType;
use crate::core::identifiers::JobId;
use crate::core::identifiers::ResolverName;
use crate::core::identifiers::StepName;
use crate::core::job::JobRecord;
use crate::core::mapping::StandardMappingResult;
use crate::core::time::Timestamp;
use crate::schema::ParamsSchema;

// ============================================================================
// SECTION: Action Contract
// ============================================================================

/// Validated action parameters.
pub type ParamMap = BTreeMap<String, serde_json::Value>;

/// Result of one action execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// True when the action succeeded.
    pub success: bool,
    /// One-line result summary.
    pub message: String,
    /// Action-specific metrics.
    pub metrics: BTreeMap<String, serde_json::Value>,
    /// Named outputs for later steps.
    pub outputs: BTreeMap<String, serde_json::Value>,
    /// Canonical mapping records, for mapper actions.
    pub mapping_results: Vec<StandardMappingResult>,
    /// Structured error for soft failures (`success == false`).
    pub error: Option<EngineError>,
}

impl ActionOutcome {
    /// Creates a successful outcome.
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            metrics: BTreeMap::new(),
            outputs: BTreeMap::new(),
            mapping_results: Vec::new(),
            error: None,
        }
    }

    /// Creates a failed outcome carrying a structured error.
    #[must_use]
    pub fn failed(error: EngineError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            metrics: BTreeMap::new(),
            outputs: BTreeMap::new(),
            mapping_results: Vec::new(),
            error: Some(error),
        }
    }

    /// Attaches a metric.
    #[must_use]
    pub fn with_metric(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    /// Attaches a named output.
    #[must_use]
    pub fn with_output(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.outputs.insert(key.into(), value);
        self
    }

    /// Attaches mapping results.
    #[must_use]
    pub fn with_mapping_results(mut self, results: Vec<StandardMappingResult>) -> Self {
        self.mapping_results = results;
        self
    }
}

/// A registered unit of work with declared parameter and result schemas.
///
/// Actions are synchronous; blocking I/O is acceptable because the
/// surrounding job runs on a blocking worker. Actions must document the
/// context keys they consume and produce via [`Action::consumes`] and
/// [`Action::produces`], and must not touch anything else.
pub trait Action: Send + Sync {
    /// Returns the registry key for this action.
    fn action_type(&self) -> ActionType;

    /// Returns the parameter schema validated before execution.
    fn parameters_schema(&self) -> ParamsSchema;

    /// Context key prefixes this action reads.
    fn consumes(&self) -> Vec<String> {
        Vec::new()
    }

    /// Context key prefixes this action writes.
    fn produces(&self) -> Vec<String> {
        Vec::new()
    }

    /// Executes the action against validated parameters and the context.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] for typed failures; soft failures may also
    /// be reported through [`ActionOutcome::failed`].
    fn execute(
        &self,
        params: &ParamMap,
        ctx: &mut ExecutionContext,
    ) -> Result<ActionOutcome, EngineError>;
}

impl std::fmt::Debug for dyn Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn Action")
            .field("action_type", &self.action_type())
            .finish()
    }
}

// ============================================================================
// SECTION: Resolver Contract
// ============================================================================

/// Capability kinds external resolvers may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolverCapability {
    /// Exact identifier lookup.
    ExactLookup,
    /// Lookup through a bridging namespace (e.g. gene symbols).
    BridgeLookup,
    /// Fuzzy string matching.
    FuzzyMatch,
    /// Vector similarity search.
    VectorSearch,
    /// Semantic matching through a language model.
    SemanticMatch,
}

/// Batch resolution request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveRequest {
    /// Requested capability.
    pub capability: ResolverCapability,
    /// Source identifiers to resolve.
    pub sources: Vec<String>,
    /// Resolver-specific options.
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

/// One candidate mapping proposed by a resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverCandidate {
    /// Proposed target identifier.
    pub target_id: String,
    /// Resolver-reported confidence in `[0, 1]`.
    pub confidence: f64,
    /// Method label for provenance.
    pub method: String,
    /// Free-form detail string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Batch resolution response: per-source candidate lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResolveResponse {
    /// Candidates keyed by source identifier. Sources with no candidates
    /// may be omitted.
    pub candidates: BTreeMap<String, Vec<ResolverCandidate>>,
}

/// Resolver failure modes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolverError {
    /// Resolver unreachable or transiently failing (retriable).
    #[error("resolver unavailable: {0}")]
    Unavailable(String),
    /// Resolver rejected the request due to rate limiting (retriable).
    #[error("resolver rate limited")]
    RateLimited {
        /// Suggested delay before retrying, when the resolver provided one.
        retry_after_ms: Option<u64>,
    },
    /// Resolver call exceeded its deadline (retriable).
    #[error("resolver timed out after {timeout_ms} ms")]
    Timeout {
        /// Deadline that was exceeded.
        timeout_ms: u64,
    },
    /// Resolver returned an uninterpretable response (fatal).
    #[error("resolver returned malformed response: {0}")]
    Malformed(String),
}

impl ResolverError {
    /// Converts the failure into an engine error with retry classification.
    #[must_use]
    pub fn to_engine_error(&self) -> EngineError {
        let kind = match self {
            Self::Unavailable(_) => ErrorKind::ResolverUnavailable,
            Self::RateLimited { .. } => ErrorKind::ResolverRateLimited,
            Self::Timeout { .. } => ErrorKind::ResolverTimeout,
            Self::Malformed(_) => ErrorKind::ResolverMalformedResponse,
        };
        EngineError::new(kind, self.to_string())
    }
}

/// Black-box external resolution service.
pub trait Resolver: Send + Sync {
    /// Returns the resolver name.
    fn name(&self) -> ResolverName;

    /// Returns the capabilities this resolver offers.
    fn capabilities(&self) -> Vec<ResolverCapability>;

    /// Resolves a batch of source identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError`] on transport or protocol failures.
    fn resolve(&self, request: &ResolveRequest) -> Result<ResolveResponse, ResolverError>;
}

// ============================================================================
// SECTION: Job Store
// ============================================================================

/// Job store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("job store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("job store corruption: {0}")]
    Corrupt(String),
    /// Store schema version is incompatible.
    #[error("job store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data is invalid.
    #[error("job store invalid data: {0}")]
    Invalid(String),
    /// A record already exists or a transition is illegal.
    #[error("job store conflict: {0}")]
    Conflict(String),
    /// Store reported an error.
    #[error("job store error: {0}")]
    Store(String),
}

/// Durable job record store.
///
/// Implementations serialize status transitions per job and must survive
/// process restart.
pub trait JobStore: Send + Sync {
    /// Creates a new job record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the job already exists.
    fn create(&self, record: &JobRecord) -> Result<(), StoreError>;

    /// Loads a job record by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load(&self, job_id: &JobId) -> Result<Option<JobRecord>, StoreError>;

    /// Updates an existing job record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the stored record is terminal
    /// and the update would change its status.
    fn update(&self, record: &JobRecord) -> Result<(), StoreError>;

    /// Lists all job records in submission order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when listing fails.
    fn list(&self) -> Result<Vec<JobRecord>, StoreError>;

    /// Marks non-terminal jobs failed after a process restart.
    ///
    /// Returns the number of jobs transitioned.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the sweep fails.
    fn recover_inflight(&self, reason: &str, at: Timestamp) -> Result<u64, StoreError>;
}

// ============================================================================
// SECTION: Step Events
// ============================================================================

/// Step lifecycle event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepEventKind {
    /// The step began executing.
    Started,
    /// The step completed successfully.
    Finished,
    /// The step terminated in error state.
    Failed,
    /// The step was skipped by condition or existence check.
    Skipped,
}

/// One step lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEvent {
    /// Job the event belongs to.
    pub job_id: JobId,
    /// Step the event describes.
    pub step_name: StepName,
    /// Event kind.
    pub event: StepEventKind,
    /// Metrics snapshot attached to finished/failed events.
    #[serde(default)]
    pub metrics: BTreeMap<String, serde_json::Value>,
    /// Optional message (error text for failures).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Event time.
    pub time: Timestamp,
}

/// Observability sink for step lifecycle events.
pub trait StepEventSink: Send + Sync {
    /// Emits one event. Sinks must not fail the job; errors are swallowed
    /// at the sink boundary.
    fn emit(&self, event: &StepEvent);
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStepEventSink;

impl StepEventSink for NoopStepEventSink {
    fn emit(&self, _event: &StepEvent) {}
}
