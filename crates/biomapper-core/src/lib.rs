// biomapper-core/src/lib.rs
// ============================================================================
// Module: Biomapper Core Library
// Description: Public API surface for the strategy execution engine core.
// Purpose: Expose the data model, interfaces, registry, and runtime.
// Dependencies: crate::{core, interfaces, registry, runtime, schema, strategy}
// ============================================================================

//! ## Overview
//! Biomapper core provides the strategy execution engine: the canonical
//! mapping data model, the typed-action framework with its registry, the
//! strategy model, the executor with progressive-stage support, and the
//! interfaces external collaborators (resolvers, job stores, event sinks)
//! plug into. API surfaces must call into the executor through these
//! types; nothing else mutates an execution context.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod registry;
pub mod runtime;
pub mod schema;
pub mod strategy;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::ActionType;
pub use crate::core::CellValue;
pub use crate::core::Dataset;
pub use crate::core::EXPANSION_COUNT_COLUMN;
pub use crate::core::EngineError;
pub use crate::core::ErrorKind;
pub use crate::core::ExecutionContext;
pub use crate::core::JobId;
pub use crate::core::JobRecord;
pub use crate::core::JobStatus;
pub use crate::core::ORIGINAL_COMPOSITE_COLUMN;
pub use crate::core::ORIGINAL_INDEX_COLUMN;
pub use crate::core::ProgressiveStats;
pub use crate::core::RESULT_COLUMNS;
pub use crate::core::Record;
pub use crate::core::ResolverName;
pub use crate::core::SKIPPED_COLUMN;
pub use crate::core::StageStats;
pub use crate::core::StandardMappingResult;
pub use crate::core::StepName;
pub use crate::core::StepOutput;
pub use crate::core::StrategyName;
pub use crate::core::Timestamp;
pub use crate::core::UNMAPPED_METHOD;
pub use crate::core::composite_provenance;
pub use crate::core::confidence;
pub use crate::interfaces::Action;
pub use crate::interfaces::ActionOutcome;
pub use crate::interfaces::JobStore;
pub use crate::interfaces::NoopStepEventSink;
pub use crate::interfaces::ParamMap;
pub use crate::interfaces::ResolveRequest;
pub use crate::interfaces::ResolveResponse;
pub use crate::interfaces::Resolver;
pub use crate::interfaces::ResolverCandidate;
pub use crate::interfaces::ResolverCapability;
pub use crate::interfaces::ResolverError;
pub use crate::interfaces::StepEvent;
pub use crate::interfaces::StepEventKind;
pub use crate::interfaces::StepEventSink;
pub use crate::interfaces::StoreError;
pub use crate::registry::ActionRegistry;
pub use crate::runtime::CancellationFlag;
pub use crate::runtime::ExecutorConfig;
pub use crate::runtime::InMemoryJobStore;
pub use crate::runtime::JobOutcome;
pub use crate::runtime::ProgressiveFinalize;
pub use crate::runtime::ProgressiveStage;
pub use crate::runtime::SharedJobStore;
pub use crate::runtime::StrategyExecutor;
pub use crate::schema::FieldSpec;
pub use crate::schema::FieldType;
pub use crate::schema::ParamsSchema;
pub use crate::strategy::ExecutionMode;
pub use crate::strategy::Step;
pub use crate::strategy::Strategy;
pub use crate::strategy::StrategyError;
