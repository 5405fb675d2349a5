// biomapper-core/src/core/progressive.rs
// ============================================================================
// Module: Biomapper Progressive Statistics
// Description: Per-stage and aggregate statistics for progressive pipelines.
// Purpose: Track stage outcomes with enforced conservation invariants.
// Dependencies: crate::core::error, serde
// ============================================================================

//! ## Overview
//! Progressive pipelines record one [`StageStats`] entry per stage plus
//! aggregate totals. Conservation is enforced when a stage is recorded:
//! new matches extend the previous cumulative count, and matched plus
//! unmatched always equals the processed total.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::error::EngineError;
use crate::core::error::ErrorKind;

// ============================================================================
// SECTION: Stage Statistics
// ============================================================================

/// Statistics for one progressive stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStats {
    /// Stage number (1-based, strictly increasing).
    pub stage_number: u32,
    /// Human-readable stage name.
    pub stage_name: String,
    /// Match method the stage applied.
    pub method: String,
    /// Identifiers newly matched by this stage.
    pub new_matches: u64,
    /// Identifiers matched by this stage and all prior stages.
    pub cumulative_matched: u64,
    /// Identifiers still unmatched after this stage.
    pub unmatched: u64,
    /// Cumulative match rate in `[0, 1]`.
    pub cumulative_rate: f64,
    /// Stage wall time in milliseconds.
    pub wall_time_ms: u64,
    /// Mean confidence of this stage's new matches (0 when none).
    pub confidence_avg: f64,
}

// ============================================================================
// SECTION: Aggregate Statistics
// ============================================================================

/// Aggregate progressive statistics for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProgressiveStats {
    /// Stage statistics keyed by stage number.
    pub stages: BTreeMap<u32, StageStats>,
    /// Total identifiers processed by the pipeline.
    pub total_processed: u64,
    /// Final match rate in `[0, 1]`, sealed by finalization.
    pub final_match_rate: f64,
    /// Total pipeline wall time in milliseconds.
    pub total_time_ms: u64,
    /// True once the terminal unmapped records have been emitted.
    pub finalized: bool,
}

impl ProgressiveStats {
    /// Returns the cumulative matched count after the last recorded stage.
    #[must_use]
    pub fn cumulative_matched(&self) -> u64 {
        self.stages.values().next_back().map_or(0, |stage| stage.cumulative_matched)
    }

    /// Returns the highest recorded stage number.
    #[must_use]
    pub fn last_stage_number(&self) -> u32 {
        self.stages.keys().next_back().copied().unwrap_or(0)
    }

    /// Records a stage, enforcing ordering and conservation invariants.
    ///
    /// # Errors
    ///
    /// Returns a [`ErrorKind::Validation`] error when the stage number is
    /// not strictly increasing or conservation does not hold.
    pub fn record_stage(&mut self, stats: StageStats) -> Result<(), EngineError> {
        if self.finalized {
            return Err(EngineError::new(
                ErrorKind::Validation,
                "progressive stats already finalized",
            ));
        }
        if stats.stage_number <= self.last_stage_number() {
            return Err(EngineError::new(
                ErrorKind::Validation,
                format!(
                    "stage {} must follow stage {}",
                    stats.stage_number,
                    self.last_stage_number()
                ),
            ));
        }
        let previous = self.cumulative_matched();
        if previous + stats.new_matches != stats.cumulative_matched {
            return Err(EngineError::new(
                ErrorKind::Validation,
                format!(
                    "stage {} breaks match conservation: {previous} + {} != {}",
                    stats.stage_number, stats.new_matches, stats.cumulative_matched
                ),
            ));
        }
        if stats.cumulative_matched + stats.unmatched != self.total_processed {
            return Err(EngineError::new(
                ErrorKind::Validation,
                format!(
                    "stage {} breaks total conservation: {} + {} != {}",
                    stats.stage_number,
                    stats.cumulative_matched,
                    stats.unmatched,
                    self.total_processed
                ),
            ));
        }
        self.total_time_ms += stats.wall_time_ms;
        self.stages.insert(stats.stage_number, stats);
        Ok(())
    }

    /// Seals the aggregate after the terminal unmapped records are emitted.
    pub fn finalize(&mut self) {
        self.final_match_rate = if self.total_processed == 0 {
            0.0
        } else {
            rate(self.cumulative_matched(), self.total_processed)
        };
        self.finalized = true;
    }
}

/// Computes a rate in `[0, 1]` from counters.
#[must_use]
pub fn rate(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    // Counter magnitudes stay far below the f64 integer bound.
    #[allow(clippy::cast_precision_loss, reason = "counter magnitudes are small")]
    {
        part as f64 / whole as f64
    }
}
