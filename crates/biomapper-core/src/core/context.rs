// biomapper-core/src/core/context.rs
// ============================================================================
// Module: Biomapper Execution Context
// Description: The shared mutable workspace of one running job.
// Purpose: Hold datasets, statistics, variables, and step outputs under
//          executor-owned linearization.
// Dependencies: crate::core::{dataset, error, identifiers, progressive, time}, serde
// ============================================================================

//! ## Overview
//! Each job exclusively owns one execution context for its lifetime. Only
//! the currently executing action mutates it; the executor owns
//! linearization and takes snapshots around steps so a failed step under
//! `on_error: continue` leaves no partial writes behind. The context is
//! fully serializable, which is what checkpoints persist.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::core::dataset::Dataset;
use crate::core::error::EngineError;
use crate::core::error::ErrorKind;
use crate::core::identifiers::DatasetKey;
use crate::core::identifiers::JobId;
use crate::core::identifiers::StrategyName;
use crate::core::progressive::ProgressiveStats;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Step Output
// ============================================================================

/// Recorded outcome of one completed, failed, or skipped step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StepOutput {
    /// One-line result summary.
    pub summary: String,
    /// Action-reported metrics.
    pub metrics: BTreeMap<String, serde_json::Value>,
    /// Named outputs for later steps.
    pub outputs: BTreeMap<String, serde_json::Value>,
    /// True when the step terminated in error state.
    pub failed: bool,
    /// True when the step was skipped by condition or existence check.
    pub skipped: bool,
    /// Number of execution attempts (retries included).
    pub attempts: u32,
}

// ============================================================================
// SECTION: Execution Context
// ============================================================================

/// Shared mutable workspace of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Job identifier (immutable metadata).
    pub job_id: JobId,
    /// Strategy name (immutable metadata).
    pub strategy_name: StrategyName,
    /// Job start time (immutable metadata).
    pub start_time: Timestamp,
    /// Environment values visible to `${env.*}` expressions.
    pub env: BTreeMap<String, String>,
    /// Job-unique output root; sink actions write only beneath it.
    pub output_root: PathBuf,
    /// Job parameters merged over strategy defaults.
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// Strategy variables; may be set mid-strategy.
    pub variables: BTreeMap<String, serde_json::Value>,
    /// Datasets keyed by dataset key.
    datasets: BTreeMap<DatasetKey, Dataset>,
    /// Free-form metric objects keyed by metric key.
    pub statistics: BTreeMap<String, serde_json::Value>,
    /// Outputs of completed steps keyed by step name.
    pub step_outputs: BTreeMap<String, StepOutput>,
    /// Progressive pipeline statistics.
    pub progressive: ProgressiveStats,
    /// Output files keyed by file purpose.
    pub output_files: BTreeMap<String, PathBuf>,
}

impl ExecutionContext {
    /// Creates a fresh context for one job.
    #[must_use]
    pub fn new(
        job_id: JobId,
        strategy_name: StrategyName,
        start_time: Timestamp,
        output_root: PathBuf,
        parameters: BTreeMap<String, serde_json::Value>,
        env: BTreeMap<String, String>,
    ) -> Self {
        Self {
            job_id,
            strategy_name,
            start_time,
            env,
            output_root,
            parameters,
            variables: BTreeMap::new(),
            datasets: BTreeMap::new(),
            statistics: BTreeMap::new(),
            step_outputs: BTreeMap::new(),
            progressive: ProgressiveStats::default(),
            output_files: BTreeMap::new(),
        }
    }

    /// Returns a dataset by key.
    ///
    /// # Errors
    ///
    /// Returns a [`ErrorKind::DatasetNotFound`] error naming the key.
    pub fn dataset(&self, key: &DatasetKey) -> Result<&Dataset, EngineError> {
        self.datasets.get(key).ok_or_else(|| {
            EngineError::new(
                ErrorKind::DatasetNotFound,
                format!("dataset not found: {key} (available: {})", self.dataset_keys().join(", ")),
            )
        })
    }

    /// Returns true when a dataset exists under the key.
    #[must_use]
    pub fn has_dataset(&self, key: &DatasetKey) -> bool {
        self.datasets.contains_key(key)
    }

    /// Inserts a dataset under a job-unique key.
    ///
    /// Datasets are immutable once inserted; reusing a key is a contract
    /// violation.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::Internal`] error when the key already
    /// exists.
    pub fn insert_dataset(&mut self, key: DatasetKey, dataset: Dataset) -> Result<(), EngineError> {
        if self.datasets.contains_key(&key) {
            return Err(EngineError::new(
                ErrorKind::Internal,
                format!("dataset key already exists: {key}"),
            ));
        }
        self.datasets.insert(key, dataset);
        Ok(())
    }

    /// Returns the dataset keys in sorted order.
    #[must_use]
    pub fn dataset_keys(&self) -> Vec<String> {
        self.datasets.keys().map(ToString::to_string).collect()
    }

    /// Takes a snapshot of the full context for error locality or
    /// checkpointing.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// Restores the context from a snapshot.
    pub fn restore(&mut self, snapshot: Self) {
        *self = snapshot;
    }

    /// Merges writes from a parallel branch back into this context.
    ///
    /// Only additive writes are merged: new dataset keys, new statistics
    /// keys, new or updated step outputs and output files, and variable
    /// updates. Overlapping dataset or statistics keys are contract
    /// violations.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::Internal`] error when the branch wrote a
    /// dataset or statistics key this context already holds with different
    /// content.
    pub fn merge_branch(&mut self, branch: Self) -> Result<(), EngineError> {
        for (key, dataset) in branch.datasets {
            match self.datasets.get(&key) {
                None => {
                    self.datasets.insert(key, dataset);
                }
                Some(existing) if *existing == dataset => {}
                Some(_) => {
                    return Err(EngineError::new(
                        ErrorKind::Internal,
                        format!("parallel branches wrote overlapping dataset key: {key}"),
                    ));
                }
            }
        }
        for (key, value) in branch.statistics {
            match self.statistics.get(&key) {
                None => {
                    self.statistics.insert(key, value);
                }
                Some(existing) if *existing == value => {}
                Some(_) => {
                    return Err(EngineError::new(
                        ErrorKind::Internal,
                        format!("parallel branches wrote overlapping statistics key: {key}"),
                    ));
                }
            }
        }
        self.step_outputs.extend(branch.step_outputs);
        self.output_files.extend(branch.output_files);
        self.variables.extend(branch.variables);
        Ok(())
    }
}
