// biomapper-core/src/core/mod.rs
// ============================================================================
// Module: Biomapper Core Data Model
// Description: Canonical data model for the strategy execution engine.
// Purpose: Wire together identifiers, values, datasets, results, and jobs.
// Dependencies: crate::core::*
// ============================================================================

//! ## Overview
//! The core data model: opaque identifiers, cell values and datasets, the
//! canonical mapping result, progressive statistics, the execution context,
//! the job model, canonical hashing, and the engine-wide error taxonomy.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod context;
pub mod dataset;
pub mod error;
pub mod hashing;
pub mod identifiers;
pub mod job;
pub mod mapping;
pub mod progressive;
pub mod time;
pub mod value;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use context::ExecutionContext;
pub use context::StepOutput;
pub use dataset::Dataset;
pub use dataset::Record;
pub use error::EngineError;
pub use error::ErrorKind;
pub use identifiers::ActionType;
pub use identifiers::DatasetKey;
pub use identifiers::JobId;
pub use identifiers::ResolverName;
pub use identifiers::StepName;
pub use identifiers::StrategyName;
pub use job::JobRecord;
pub use job::JobStatus;
pub use mapping::EXPANSION_COUNT_COLUMN;
pub use mapping::ORIGINAL_COMPOSITE_COLUMN;
pub use mapping::ORIGINAL_INDEX_COLUMN;
pub use mapping::RESULT_COLUMNS;
pub use mapping::SKIPPED_COLUMN;
pub use mapping::StandardMappingResult;
pub use mapping::UNMAPPED_METHOD;
pub use mapping::composite_provenance;
pub use mapping::confidence;
pub use progressive::ProgressiveStats;
pub use progressive::StageStats;
pub use time::Timestamp;
pub use value::CellValue;
