// biomapper-core/src/runtime/mod.rs
// ============================================================================
// Module: Biomapper Runtime
// Description: Strategy execution, progressive wrapping, and checkpoints.
// Purpose: Wire together the executor and its supporting runtime pieces.
// Dependencies: crate::{core, interfaces, registry, strategy}
// ============================================================================

//! ## Overview
//! The runtime contains the strategy executor, the context-backed
//! expression scope, the progressive stage wrapper, checkpoint persistence,
//! and the in-memory job store used by tests and demos.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod checkpoint;
pub mod executor;
pub mod progressive;
pub mod scope;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use checkpoint::checkpoint_path;
pub use checkpoint::read_checkpoint;
pub use checkpoint::write_checkpoint;
pub use executor::CancellationFlag;
pub use executor::ExecutorConfig;
pub use executor::JobOutcome;
pub use executor::StrategyExecutor;
pub use progressive::PROGRESSIVE_FINALIZE;
pub use progressive::PROGRESSIVE_STAGE;
pub use progressive::ProgressiveFinalize;
pub use progressive::ProgressiveStage;
pub use scope::ContextScope;
pub use scope::LoopFrames;
pub use store::InMemoryJobStore;
pub use store::SharedJobStore;
