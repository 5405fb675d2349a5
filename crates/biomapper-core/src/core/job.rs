// biomapper-core/src/core/job.rs
// ============================================================================
// Module: Biomapper Job Model
// Description: Job lifecycle states and the persisted job record.
// Purpose: Define sticky terminal states and the condensed job snapshot.
// Dependencies: crate::core::{error, identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A job is created `pending` at submission, becomes `running` when its
//! executor starts, and ends in exactly one terminal state. Terminal states
//! are sticky: the store and the manager both refuse transitions out of
//! them. The persisted record is a condensed snapshot, not the full
//! execution context.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::error::EngineError;
use crate::core::identifiers::JobId;
use crate::core::identifiers::StrategyName;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Job Status
// ============================================================================

/// Lifecycle states of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted but not yet started.
    Pending,
    /// Executor is running.
    Running,
    /// Completed without stop-propagating failure.
    Succeeded,
    /// Terminated by a stop-propagating failure.
    Failed,
    /// Cancelled externally.
    Cancelled,
}

impl JobStatus {
    /// Returns true when the status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Returns true when a transition to `next` is legal.
    ///
    /// Terminal states are sticky; `pending` may move to any state (a job
    /// can be cancelled before it starts), `running` only to a terminal
    /// state.
    #[must_use]
    pub const fn can_transition(self, next: Self) -> bool {
        match self {
            Self::Pending => !matches!(next, Self::Pending),
            Self::Running => next.is_terminal(),
            Self::Succeeded | Self::Failed | Self::Cancelled => false,
        }
    }

    /// Returns the stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

// ============================================================================
// SECTION: Job Record
// ============================================================================

/// Persisted, condensed job snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Job identifier.
    pub job_id: JobId,
    /// Strategy the job executes.
    pub strategy_name: StrategyName,
    /// Submitted parameters (before merge with strategy defaults).
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Submission time.
    pub created_at: Timestamp,
    /// Execution start time, once running.
    pub started_at: Option<Timestamp>,
    /// Terminal transition time.
    pub finished_at: Option<Timestamp>,
    /// Monotonically increasing revision for change detection.
    pub revision: u64,
    /// Step currently executing, while running.
    pub current_step: Option<String>,
    /// Number of steps completed so far.
    pub completed_steps: u64,
    /// Step the job failed on, for failed jobs.
    pub failed_step: Option<String>,
    /// Error record for failed jobs.
    pub error: Option<EngineError>,
    /// Condensed metrics snapshot.
    pub metrics: BTreeMap<String, serde_json::Value>,
    /// Output files keyed by file purpose.
    pub output_files: BTreeMap<String, String>,
}

impl JobRecord {
    /// Creates a pending record at submission time.
    #[must_use]
    pub fn pending(
        job_id: JobId,
        strategy_name: StrategyName,
        parameters: BTreeMap<String, serde_json::Value>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            job_id,
            strategy_name,
            parameters,
            status: JobStatus::Pending,
            created_at,
            started_at: None,
            finished_at: None,
            revision: 1,
            current_step: None,
            completed_steps: 0,
            failed_step: None,
            error: None,
            metrics: BTreeMap::new(),
            output_files: BTreeMap::new(),
        }
    }

    /// Applies a status transition, bumping the revision.
    ///
    /// Returns false when the transition is illegal (terminal states are
    /// sticky); the record is left untouched in that case.
    #[must_use]
    pub fn transition(&mut self, next: JobStatus, at: Timestamp) -> bool {
        if !self.status.can_transition(next) {
            return false;
        }
        self.status = next;
        self.revision += 1;
        match next {
            JobStatus::Running => self.started_at = Some(at),
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled => {
                self.finished_at = Some(at);
                self.current_step = None;
            }
            JobStatus::Pending => {}
        }
        true
    }

    /// Records step progress, bumping the revision.
    pub fn progress(&mut self, current_step: Option<String>, completed_steps: u64) {
        self.current_step = current_step;
        self.completed_steps = completed_steps;
        self.revision += 1;
    }
}
