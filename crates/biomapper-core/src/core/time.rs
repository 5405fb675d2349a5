// biomapper-core/src/core/time.rs
// ============================================================================
// Module: Biomapper Time Model
// Description: Canonical timestamp representation for jobs and stage timing.
// Purpose: Provide explicit time values for job records and statistics.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Job lifecycle records and progressive stage statistics carry explicit
//! unix-millisecond timestamps. The executor core receives its start time
//! from the caller; wall-clock reads happen only at documented boundaries
//! (job manager transitions, retry backoff sleeps, stage timing).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Canonical timestamp in unix epoch milliseconds.
///
/// # Invariants
/// - No validation is performed; monotonicity is a caller responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(value: i64) -> Self {
        Self(value)
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Reads the current wall-clock time.
    ///
    /// Boundary helper for the job manager and stage timing; the executor
    /// core itself never calls this for decision making.
    #[must_use]
    pub fn now() -> Self {
        let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Self(i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
    }

    /// Returns the non-negative distance to a later timestamp in
    /// milliseconds.
    #[must_use]
    pub const fn millis_until(self, later: Self) -> u64 {
        let delta = later.0.saturating_sub(self.0);
        if delta < 0 { 0 } else { delta as u64 }
    }
}
