// biomapper-store-sqlite/src/lib.rs
// ============================================================================
// Module: Biomapper SQLite Store Library
// Description: Public API surface for the durable job store.
// Purpose: Expose the SQLite-backed JobStore implementation.
// Dependencies: crate::store
// ============================================================================

//! ## Overview
//! Durable job persistence on `SQLite` WAL: canonical JSON snapshots with
//! integrity hashes, sticky terminal states, and a restart recovery sweep
//! that fails jobs left in flight by a previous process.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::MAX_RECORD_BYTES;
pub use store::PROCESS_RESTART_REASON;
pub use store::SqliteJobStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
