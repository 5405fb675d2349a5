// biomapper-actions/src/lib.rs
// ============================================================================
// Module: Biomapper Actions Library
// Description: Built-in primitive actions for the strategy engine.
// Purpose: Register loaders, transformers, analyzers, and sinks.
// Dependencies: biomapper-core, csv, regex
// ============================================================================

//! ## Overview
//! The built-in action set: delimited dataset loading, composite
//! identifier expansion, row filtering, dataset joins, set overlap
//! analysis, and delimited export. [`register_builtin_actions`] is the
//! build-time manifest that makes them reachable through the registry;
//! the executor never references these types directly.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod composite;
pub mod export;
pub mod filter;
pub mod load;
pub mod merge;
pub mod overlap;
pub(crate) mod params;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use composite::EXPANSION_COUNT_COLUMN;
pub use composite::ORIGINAL_COMPOSITE_COLUMN;
pub use composite::ORIGINAL_INDEX_COLUMN;
pub use composite::PARSE_COMPOSITE_IDENTIFIERS;
pub use composite::ParseCompositeIdentifiers;
pub use composite::SKIPPED_COLUMN;
pub use export::EXPORT_DATASET;
pub use export::ExportDataset;
pub use filter::FILTER_DATASET;
pub use filter::FilterDataset;
pub use load::LOAD_DATASET_IDENTIFIERS;
pub use load::LoadDatasetIdentifiers;
pub use merge::MERGE_DATASETS;
pub use merge::MergeDatasets;
pub use overlap::CALCULATE_SET_OVERLAP;
pub use overlap::CalculateSetOverlap;
pub use overlap::jaccard;

// ============================================================================
// SECTION: Registration
// ============================================================================

use std::sync::Arc;

use biomapper_core::ActionRegistry;
use biomapper_core::EngineError;
use biomapper_core::ProgressiveFinalize;
use biomapper_core::ProgressiveStage;

/// Registers every built-in action plus the progressive wrapper actions.
///
/// # Errors
///
/// Returns an [`EngineError`] when a type is registered twice, which is a
/// startup configuration bug.
pub fn register_builtin_actions(registry: &Arc<ActionRegistry>) -> Result<(), EngineError> {
    registry.register(Arc::new(LoadDatasetIdentifiers))?;
    registry.register(Arc::new(ParseCompositeIdentifiers))?;
    registry.register(Arc::new(FilterDataset))?;
    registry.register(Arc::new(MergeDatasets))?;
    registry.register(Arc::new(CalculateSetOverlap))?;
    registry.register(Arc::new(ExportDataset))?;
    registry.register(Arc::new(ProgressiveStage::new(Arc::clone(registry))))?;
    registry.register(Arc::new(ProgressiveFinalize))?;
    Ok(())
}
