// biomapper-server/src/jobs.rs
// ============================================================================
// Module: Job Manager
// Description: Submission, execution, cancellation, and status of jobs.
// Purpose: Own running executors and persist every status transition.
// Dependencies: biomapper-config, biomapper-core, crate::{audit, error, events}, tokio
// ============================================================================

//! ## Overview
//! The job manager is the single owner of running executors. Submission
//! validates the strategy name and parameter types immediately, persists a
//! pending record, and hands the job to a blocking worker thread. Status
//! transitions write through the job store synchronously; per-step
//! progress bumps the record revision so pollers see monotonic change.
//! Cancellation flips the job's cooperative flag; the executor observes it
//! at the next step boundary and still runs `finally_steps`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use biomapper_config::StrategyLibrary;
use biomapper_core::ActionRegistry;
use biomapper_core::CancellationFlag;
use biomapper_core::ExecutionContext;
use biomapper_core::ExecutorConfig;
use biomapper_core::JobId;
use biomapper_core::JobRecord;
use biomapper_core::JobStatus;
use biomapper_core::JobStore;
use biomapper_core::SharedJobStore;
use biomapper_core::StepEvent;
use biomapper_core::StepEventKind;
use biomapper_core::StepEventSink;
use biomapper_core::Strategy;
use biomapper_core::StrategyExecutor;
use biomapper_core::StrategyName;
use biomapper_core::Timestamp;

use crate::audit::JobAuditEvent;
use crate::audit::JobAuditSink;
use crate::error::ApiError;
use crate::events::EventHub;

// ============================================================================
// SECTION: Cancellation Outcome
// ============================================================================

/// Result of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The cancellation flag was set.
    Ok,
    /// The job is already terminal or unknown to this process.
    NotCancellable,
}

// ============================================================================
// SECTION: Job Manager
// ============================================================================

/// Owner of running executors and their lifecycle records.
pub struct JobManager {
    /// Loaded strategy library.
    library: StrategyLibrary,
    /// Action registry executors resolve through.
    registry: Arc<ActionRegistry>,
    /// Durable job store.
    store: SharedJobStore,
    /// Step event fan-out hub.
    hub: Arc<EventHub>,
    /// Job lifecycle audit sink.
    audit: Arc<dyn JobAuditSink>,
    /// Root for per-job output trees.
    output_root: PathBuf,
    /// Root for checkpoint snapshots.
    checkpoint_root: PathBuf,
    /// Cancellation flags for jobs owned by this process.
    running: Mutex<BTreeMap<String, CancellationFlag>>,
    /// Monotonic suffix for job identifiers.
    sequence: AtomicU64,
}

impl JobManager {
    /// Creates a manager over the loaded library and wiring.
    #[must_use]
    pub fn new(
        library: StrategyLibrary,
        registry: Arc<ActionRegistry>,
        store: SharedJobStore,
        hub: Arc<EventHub>,
        audit: Arc<dyn JobAuditSink>,
        output_root: PathBuf,
        checkpoint_root: PathBuf,
    ) -> Self {
        Self {
            library,
            registry,
            store,
            hub,
            audit,
            output_root,
            checkpoint_root,
            running: Mutex::new(BTreeMap::new()),
            sequence: AtomicU64::new(1),
        }
    }

    /// Returns the strategy library.
    #[must_use]
    pub const fn library(&self) -> &StrategyLibrary {
        &self.library
    }

    /// Returns the event hub.
    #[must_use]
    pub fn hub(&self) -> Arc<EventHub> {
        Arc::clone(&self.hub)
    }

    /// Validates and enqueues a submission, returning the new job id.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::StrategyNotFound`] for unknown strategies and
    /// [`ApiError::Validation`] for unknown or mistyped parameters.
    pub fn submit(
        &self,
        strategy_name: &str,
        parameters: BTreeMap<String, serde_json::Value>,
    ) -> Result<JobId, ApiError> {
        let name = StrategyName::new(strategy_name);
        let Some(strategy) = self.library.get(&name) else {
            return Err(ApiError::StrategyNotFound(strategy_name.to_string()));
        };
        validate_parameters(&strategy, &parameters)?;

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let created_at = Timestamp::now();
        let job_id = JobId::new(format!(
            "job-{:012x}-{sequence:04}",
            created_at.as_unix_millis()
        ));
        let record = JobRecord::pending(job_id.clone(), name, parameters, created_at);
        self.store
            .create(&record)
            .map_err(|err| ApiError::Internal(err.to_string()))?;
        if let Ok(mut running) = self.running.lock() {
            running.insert(job_id.as_str().to_string(), CancellationFlag::new());
        }
        self.audit.record(&JobAuditEvent {
            time: created_at,
            job_id: job_id.clone(),
            strategy: strategy.name.clone(),
            status: JobStatus::Pending,
            detail: None,
        });
        Ok(job_id)
    }

    /// Starts a submitted job on a blocking worker thread.
    ///
    /// Must run inside a tokio runtime; the CLI's offline path uses
    /// [`JobManager::run_to_completion`] instead.
    pub fn start_detached(self: &Arc<Self>, job_id: JobId) {
        let manager = Arc::clone(self);
        drop(tokio::task::spawn_blocking(move || manager.run_to_completion(&job_id)));
    }

    /// Runs a submitted job to its terminal state on the current thread.
    ///
    /// Returns the terminal record.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::JobNotFound`] when the job was never submitted.
    pub fn run_to_completion(&self, job_id: &JobId) -> Result<JobRecord, ApiError> {
        let mut record = self.load_record(job_id)?;
        let Some(strategy) = self.library.get(&record.strategy_name) else {
            return Err(ApiError::StrategyNotFound(record.strategy_name.to_string()));
        };
        let cancel = self
            .running
            .lock()
            .ok()
            .and_then(|running| running.get(job_id.as_str()).cloned())
            .unwrap_or_default();

        let started_at = Timestamp::now();
        if record.transition(JobStatus::Running, started_at) {
            let _ = self.store.update(&record);
            self.audit_transition(&record, None);
        }

        let outcome = self.execute(&strategy, &mut record, &cancel);

        if let Ok(mut running) = self.running.lock() {
            running.remove(job_id.as_str());
        }
        self.hub.release(job_id);
        self.audit_transition(&record, outcome);
        Ok(record)
    }

    /// Builds the context, runs the executor, and folds the outcome into
    /// the record. Returns the error detail for auditing, if any.
    fn execute(
        &self,
        strategy: &Strategy,
        record: &mut JobRecord,
        cancel: &CancellationFlag,
    ) -> Option<String> {
        let job_output_root = self.output_root.join(record.job_id.as_str());
        if let Err(err) = std::fs::create_dir_all(&job_output_root) {
            let _ = record.transition(JobStatus::Failed, Timestamp::now());
            record.error = Some(biomapper_core::EngineError::internal(format!(
                "cannot create job output root: {err}"
            )));
            let _ = self.store.update(record);
            return record.error.as_ref().map(ToString::to_string);
        }

        let mut ctx = ExecutionContext::new(
            record.job_id.clone(),
            record.strategy_name.clone(),
            Timestamp::now(),
            job_output_root,
            record.parameters.clone(),
            std::env::vars().collect(),
        );
        let progress = Arc::new(ProgressSink {
            hub: Arc::clone(&self.hub),
            store: self.store.clone(),
            record: Mutex::new(record.clone()),
        });
        let executor = StrategyExecutor::new(
            Arc::clone(&self.registry),
            progress,
            ExecutorConfig {
                checkpoint_root: Some(self.checkpoint_root.clone()),
            },
        );
        let outcome = executor.run(strategy, &mut ctx, cancel);

        // Reload the revision advanced by progress updates before the
        // terminal write.
        if let Ok(Some(latest)) = self.store.load(&record.job_id) {
            *record = latest;
        }
        let finished_at = Timestamp::now();
        let _ = record.transition(outcome.status, finished_at);
        record.completed_steps = outcome.completed_steps;
        record.failed_step =
            outcome.failed_step.as_ref().map(|step| step.as_str().to_string());
        record.error = outcome.error.clone();
        record.metrics = condensed_metrics(&ctx);
        record.output_files = ctx
            .output_files
            .iter()
            .map(|(purpose, path)| (purpose.clone(), path.display().to_string()))
            .collect();
        let _ = self.store.update(record);
        outcome.error.map(|error| error.to_string())
    }

    /// Requests cooperative cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::JobNotFound`] for unknown jobs.
    pub fn cancel(&self, job_id: &JobId) -> Result<CancelOutcome, ApiError> {
        let record = self.load_record(job_id)?;
        if record.status.is_terminal() {
            return Ok(CancelOutcome::NotCancellable);
        }
        let flag = self
            .running
            .lock()
            .ok()
            .and_then(|running| running.get(job_id.as_str()).cloned());
        match flag {
            Some(flag) => {
                flag.cancel();
                Ok(CancelOutcome::Ok)
            }
            // In-flight in a previous process; recovery will fail it.
            None => Ok(CancelOutcome::NotCancellable),
        }
    }

    /// Loads a job record.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::JobNotFound`] when absent.
    pub fn load_record(&self, job_id: &JobId) -> Result<JobRecord, ApiError> {
        self.store
            .load(job_id)
            .map_err(|err| ApiError::Internal(err.to_string()))?
            .ok_or_else(|| ApiError::JobNotFound(job_id.as_str().to_string()))
    }

    /// Emits an audit line for the record's current status.
    fn audit_transition(&self, record: &JobRecord, detail: Option<String>) {
        self.audit.record(&JobAuditEvent {
            time: Timestamp::now(),
            job_id: record.job_id.clone(),
            strategy: record.strategy_name.as_str().to_string(),
            status: record.status,
            detail,
        });
    }
}

// ============================================================================
// SECTION: Progress Sink
// ============================================================================

/// Per-job sink forwarding step events and persisting progress.
struct ProgressSink {
    /// Fan-out hub for SSE subscribers.
    hub: Arc<EventHub>,
    /// Durable store for revisioned progress.
    store: SharedJobStore,
    /// Live record mirror for progress updates.
    record: Mutex<JobRecord>,
}

impl StepEventSink for ProgressSink {
    fn emit(&self, event: &StepEvent) {
        self.hub.emit(event);
        let Ok(mut record) = self.record.lock() else {
            return;
        };
        match event.event {
            StepEventKind::Started => {
                let completed = record.completed_steps;
                record.progress(Some(event.step_name.as_str().to_string()), completed);
            }
            StepEventKind::Finished => {
                let completed = record.completed_steps + 1;
                record.progress(None, completed);
            }
            StepEventKind::Failed | StepEventKind::Skipped => {
                let completed = record.completed_steps;
                record.progress(None, completed);
            }
        }
        // Progress persistence is best effort; the terminal write is the
        // authoritative one.
        let _ = self.store.update(&record);
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates submitted parameters against the strategy's declared defaults.
fn validate_parameters(
    strategy: &Strategy,
    parameters: &BTreeMap<String, serde_json::Value>,
) -> Result<(), ApiError> {
    for (name, value) in parameters {
        let Some(default) = strategy.parameters.get(name) else {
            return Err(ApiError::Validation(format!(
                "unknown parameter {name} for strategy {}",
                strategy.name
            )));
        };
        if !default.is_null() && !same_json_type(default, value) {
            return Err(ApiError::Validation(format!(
                "parameter {name} expects a {} value",
                json_type_name(default)
            )));
        }
    }
    Ok(())
}

/// Returns true when two JSON values share a type.
fn same_json_type(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
        || (a.is_number() && b.is_number())
}

/// Returns the JSON type name for messages.
const fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Condenses the context into the persisted metrics snapshot.
fn condensed_metrics(ctx: &ExecutionContext) -> BTreeMap<String, serde_json::Value> {
    let mut metrics = ctx.statistics.clone();
    if ctx.progressive.total_processed > 0 {
        metrics.insert(
            "progressive".to_string(),
            serde_json::json!({
                "total_processed": ctx.progressive.total_processed,
                "final_match_rate": ctx.progressive.final_match_rate,
                "total_time_ms": ctx.progressive.total_time_ms,
                "stages": ctx.progressive.stages.len(),
            }),
        );
    }
    metrics.insert(
        "steps_recorded".to_string(),
        serde_json::json!(ctx.step_outputs.len()),
    );
    metrics
}
