// biomapper-core/src/runtime/executor.rs
// ============================================================================
// Module: Biomapper Strategy Executor
// Description: The single canonical execution path for strategies.
// Purpose: Run steps with substitution, control flow, error policies,
//          checkpoints, and cooperative cancellation.
// Dependencies: crate::{core, interfaces, registry, runtime, strategy}, biomapper-expr
// ============================================================================

//! ## Overview
//! The executor owns linearization of one job: it substitutes expressions
//! immediately before each step (and again on every retry attempt), looks
//! the action up in the registry, validates parameters against the action's
//! schema, and converts failures into control-flow decisions through the
//! applicable `on_error` policy. Sequential mode runs strict program order;
//! DAG mode runs dependency waves with parallel steps isolated on context
//! clones whose writes must merge disjointly. `finally_steps` run after the
//! main sequence regardless of outcome — including on cancellation — but
//! not when the strategy never started.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use biomapper_expr::evaluate_condition;
use biomapper_expr::substitute;
use biomapper_expr::substitute_json;

use crate::core::context::ExecutionContext;
use crate::core::context::StepOutput;
use crate::core::error::EngineError;
use crate::core::error::ErrorKind;
use crate::core::identifiers::StepName;
use crate::core::job::JobStatus;
use crate::core::time::Timestamp;
use crate::interfaces::ActionOutcome;
use crate::interfaces::ParamMap;
use crate::interfaces::StepEvent;
use crate::interfaces::StepEventKind;
use crate::interfaces::StepEventSink;
use crate::registry::ActionRegistry;
use crate::runtime::checkpoint::write_checkpoint;
use crate::runtime::progressive::PROGRESSIVE_FINALIZE;
use crate::runtime::progressive::PROGRESSIVE_STAGE;
use crate::runtime::scope::ContextScope;
use crate::runtime::scope::LoopFrames;
use crate::strategy::BackoffKind;
use crate::strategy::CheckpointPoint;
use crate::strategy::CheckpointStrategy;
use crate::strategy::ErrorActionKind;
use crate::strategy::ExecutionMode;
use crate::strategy::Step;
use crate::strategy::Strategy;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Hard cap on `repeat` iterations regardless of configuration.
const REPEAT_HARD_CAP: u32 = 1_000;

// ============================================================================
// SECTION: Cancellation
// ============================================================================

/// Cooperative cancellation flag shared between the job manager and the
/// executor.
#[derive(Debug, Default, Clone)]
pub struct CancellationFlag {
    /// Shared flag state.
    inner: Arc<AtomicBool>,
}

impl CancellationFlag {
    /// Creates a fresh, unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    /// Returns true when cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }
}

// ============================================================================
// SECTION: Configuration and Outcome
// ============================================================================

/// Executor configuration.
#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    /// Root directory for checkpoint snapshots; disables checkpointing
    /// when absent.
    pub checkpoint_root: Option<std::path::PathBuf>,
}

/// Terminal outcome of one job execution.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    /// Terminal job status.
    pub status: JobStatus,
    /// Error for failed jobs.
    pub error: Option<EngineError>,
    /// Step the job failed on.
    pub failed_step: Option<StepName>,
    /// Number of successfully completed steps.
    pub completed_steps: u64,
}

// ============================================================================
// SECTION: Internal Flow Types
// ============================================================================

/// Flow decision after one step.
enum StepFlow {
    /// Proceed to the next step.
    Continue,
    /// Fail the job with the given error.
    Stop(EngineError),
    /// Cancellation observed; stop the main sequence.
    Cancelled,
}

/// Result of the attempt loop for one step body.
struct BodyResult {
    /// Final action outcome (last successful attempt).
    outcome: Option<ActionOutcome>,
    /// Error when every attempt failed.
    error: Option<EngineError>,
    /// Attempts performed.
    attempts: u32,
    /// Extra metrics recorded by control flow (iteration counts).
    metrics: BTreeMap<String, serde_json::Value>,
}

impl BodyResult {
    /// Builds a successful body result.
    fn succeeded(outcome: ActionOutcome, attempts: u32) -> Self {
        Self {
            outcome: Some(outcome),
            error: None,
            attempts,
            metrics: BTreeMap::new(),
        }
    }

    /// Builds a failed body result.
    fn failed(error: EngineError, attempts: u32) -> Self {
        Self {
            outcome: None,
            error: Some(error),
            attempts,
            metrics: BTreeMap::new(),
        }
    }
}

// ============================================================================
// SECTION: Strategy Executor
// ============================================================================

/// The strategy executor: one instance serves many jobs.
pub struct StrategyExecutor {
    /// Registry actions resolve through.
    registry: Arc<ActionRegistry>,
    /// Step lifecycle event sink.
    events: Arc<dyn StepEventSink>,
    /// Executor configuration.
    config: ExecutorConfig,
}

impl StrategyExecutor {
    /// Creates an executor over a registry and event sink.
    #[must_use]
    pub fn new(
        registry: Arc<ActionRegistry>,
        events: Arc<dyn StepEventSink>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            registry,
            events,
            config,
        }
    }

    /// Runs a strategy to completion against a fresh context.
    ///
    /// The caller submits the context with job parameters already present;
    /// the executor merges strategy defaults underneath them, initializes
    /// variables, runs the main sequence in the configured mode, and then
    /// runs `finally_steps` regardless of the outcome.
    #[must_use]
    pub fn run(
        &self,
        strategy: &Strategy,
        ctx: &mut ExecutionContext,
        cancel: &CancellationFlag,
    ) -> JobOutcome {
        for (name, value) in &strategy.parameters {
            ctx.parameters.entry(name.clone()).or_insert_with(|| value.clone());
        }
        if let Err(error) = self.init_variables(strategy, ctx) {
            // The strategy never started; finally_steps do not run.
            return JobOutcome {
                status: JobStatus::Failed,
                error: Some(error),
                failed_step: None,
                completed_steps: 0,
            };
        }

        let mut completed = 0_u64;
        let mut failed_step = None;
        let flow = match strategy.execution.mode {
            ExecutionMode::Sequential => self.run_sequential(
                &strategy.steps,
                strategy,
                ctx,
                cancel,
                &mut completed,
                &mut failed_step,
            ),
            ExecutionMode::Dag => {
                self.run_dag(strategy, ctx, cancel, &mut completed, &mut failed_step)
            }
        };

        // Cleanup runs regardless of the main outcome, cancellation
        // included. Failures inside finally are recorded, never escalated.
        for step in &strategy.finally_steps {
            let _ = self.execute_step(step, strategy, ctx, cancel);
        }

        match flow {
            StepFlow::Continue => JobOutcome {
                status: JobStatus::Succeeded,
                error: None,
                failed_step: None,
                completed_steps: completed,
            },
            StepFlow::Stop(error) => JobOutcome {
                status: JobStatus::Failed,
                error: Some(error),
                failed_step,
                completed_steps: completed,
            },
            StepFlow::Cancelled => JobOutcome {
                status: JobStatus::Cancelled,
                error: Some(EngineError::new(ErrorKind::Cancelled, "job cancelled")),
                failed_step,
                completed_steps: completed,
            },
        }
    }

    /// Initializes strategy variables, evaluating embedded expressions.
    fn init_variables(
        &self,
        strategy: &Strategy,
        ctx: &mut ExecutionContext,
    ) -> Result<(), EngineError> {
        for (name, value) in &strategy.variables {
            let substituted = {
                let scope = ContextScope::new(ctx);
                substitute_json(value, &scope)?
            };
            ctx.variables.insert(name.clone(), substituted);
        }
        Ok(())
    }

    /// Runs steps in strict declaration order.
    fn run_sequential(
        &self,
        steps: &[Step],
        strategy: &Strategy,
        ctx: &mut ExecutionContext,
        cancel: &CancellationFlag,
        completed: &mut u64,
        failed_step: &mut Option<StepName>,
    ) -> StepFlow {
        for step in steps {
            if cancel.is_cancelled() {
                return StepFlow::Cancelled;
            }
            match self.execute_step(step, strategy, ctx, cancel) {
                StepFlow::Continue => {
                    if ctx.step_outputs.get(&step.name).is_some_and(|output| {
                        !output.failed && !output.skipped
                    }) {
                        *completed += 1;
                    }
                }
                StepFlow::Stop(error) => {
                    *failed_step = Some(StepName::new(step.name.clone()));
                    return StepFlow::Stop(error);
                }
                StepFlow::Cancelled => return StepFlow::Cancelled,
            }
        }
        StepFlow::Continue
    }

    /// Runs steps in dependency waves.
    ///
    /// Steps whose dependencies are all settled form a wave; waves with a
    /// single step mutate the context directly, larger waves run on
    /// context clones that merge back under the disjoint-write contract.
    /// Progressive stages are chained with implicit dependencies so they
    /// stay strictly sequential even here.
    fn run_dag(
        &self,
        strategy: &Strategy,
        ctx: &mut ExecutionContext,
        cancel: &CancellationFlag,
        completed: &mut u64,
        failed_step: &mut Option<StepName>,
    ) -> StepFlow {
        let implicit = progressive_chain(&strategy.steps);
        let mut settled: BTreeSet<String> = BTreeSet::new();
        let mut remaining: Vec<&Step> = strategy.steps.iter().collect();
        let max_workers = strategy.execution.max_workers.max(1);

        while !remaining.is_empty() {
            if cancel.is_cancelled() {
                return StepFlow::Cancelled;
            }
            let (wave, rest): (Vec<&Step>, Vec<&Step>) = remaining.into_iter().partition(|step| {
                step.depends_on.iter().all(|dep| settled.contains(dep))
                    && implicit
                        .get(step.name.as_str())
                        .is_none_or(|dep| settled.contains(dep.as_str()))
            });
            if wave.is_empty() {
                return StepFlow::Stop(EngineError::internal(
                    "dag wave deadlock: unresolved dependencies",
                ));
            }
            remaining = rest;

            if wave.len() == 1 {
                let only = wave[0];
                match self.execute_step(only, strategy, ctx, cancel) {
                    StepFlow::Continue => {
                        settled.insert(only.name.clone());
                        if ctx.step_outputs.get(&only.name).is_some_and(|output| {
                            !output.failed && !output.skipped
                        }) {
                            *completed += 1;
                        }
                    }
                    StepFlow::Stop(error) => {
                        *failed_step = Some(StepName::new(only.name.clone()));
                        return StepFlow::Stop(error);
                    }
                    StepFlow::Cancelled => return StepFlow::Cancelled,
                }
                continue;
            }

            let flow = self.run_wave(&wave, strategy, ctx, cancel, max_workers, completed);
            match flow {
                Ok(()) => {
                    for step in &wave {
                        settled.insert(step.name.clone());
                    }
                }
                Err((name, error)) => {
                    if error.kind == ErrorKind::Cancelled {
                        return StepFlow::Cancelled;
                    }
                    *failed_step = Some(name);
                    return StepFlow::Stop(error);
                }
            }
        }
        StepFlow::Continue
    }

    /// Runs one multi-step wave on context clones and merges the writes.
    #[allow(clippy::type_complexity, reason = "join results pair branch state with flow")]
    fn run_wave(
        &self,
        wave: &[&Step],
        strategy: &Strategy,
        ctx: &mut ExecutionContext,
        cancel: &CancellationFlag,
        max_workers: usize,
        completed: &mut u64,
    ) -> Result<(), (StepName, EngineError)> {
        for chunk in wave.chunks(max_workers) {
            let mut branches: Vec<(String, ExecutionContext, bool)> = Vec::new();
            let mut failure: Option<(StepName, EngineError)> = None;
            let mut cancelled = false;
            thread::scope(|scope| {
                let mut handles = Vec::with_capacity(chunk.len());
                for &step in chunk {
                    let mut branch = ctx.snapshot();
                    handles.push((step.name.clone(), scope.spawn(move || {
                        let flow = self.execute_step(step, strategy, &mut branch, cancel);
                        (branch, flow)
                    })));
                }
                for (name, handle) in handles {
                    match handle.join() {
                        Ok((branch, StepFlow::Continue)) => {
                            let success = branch.step_outputs.get(&name).is_some_and(|output| {
                                !output.failed && !output.skipped
                            });
                            branches.push((name, branch, success));
                        }
                        Ok((_, StepFlow::Stop(error))) => {
                            if failure.is_none() {
                                failure = Some((StepName::new(name), error));
                            }
                        }
                        Ok((_, StepFlow::Cancelled)) => cancelled = true,
                        Err(_) => {
                            if failure.is_none() {
                                failure = Some((
                                    StepName::new(name),
                                    EngineError::internal("parallel step worker panicked"),
                                ));
                            }
                        }
                    }
                }
            });
            if let Some(failure) = failure {
                return Err(failure);
            }
            if cancelled {
                return Err((
                    StepName::new("<wave>"),
                    EngineError::new(ErrorKind::Cancelled, "job cancelled"),
                ));
            }
            for (name, branch, success) in branches {
                if let Err(error) = ctx.merge_branch(branch) {
                    return Err((StepName::new(name), error));
                }
                if success {
                    *completed += 1;
                }
            }
        }
        Ok(())
    }

    /// Executes one step: condition, skip checks, control flow, policies,
    /// output recording, and checkpoints.
    fn execute_step(
        &self,
        step: &Step,
        strategy: &Strategy,
        ctx: &mut ExecutionContext,
        cancel: &CancellationFlag,
    ) -> StepFlow {
        if let Some(condition) = &step.condition {
            let holds = {
                let scope = ContextScope::new(ctx);
                evaluate_condition(condition, &scope)
            };
            match holds {
                Ok(true) => {}
                Ok(false) => {
                    self.record_skipped(step, ctx, "condition evaluated false");
                    return StepFlow::Continue;
                }
                Err(error) => {
                    return self.resolve_failure(
                        step,
                        strategy,
                        ctx,
                        EngineError::from(error)
                            .with_step(StepName::new(step.name.clone()))
                            .with_action_type(step.action_type()),
                        1,
                    );
                }
            }
        }

        if let Some(template) = &step.skip_if_exists {
            let rendered = {
                let scope = ContextScope::new(ctx);
                substitute(template, &scope).map(|value| value.render())
            };
            match rendered {
                Ok(path) if Path::new(&path).exists() => {
                    self.record_skipped(step, ctx, &format!("path exists: {path}"));
                    return StepFlow::Continue;
                }
                Ok(_) => {}
                Err(error) => {
                    return self.resolve_failure(
                        step,
                        strategy,
                        ctx,
                        EngineError::from(error).with_step(StepName::new(step.name.clone())),
                        1,
                    );
                }
            }
        }

        if step.checkpoint == Some(CheckpointPoint::Before) {
            self.maybe_checkpoint(strategy, ctx, step, CheckpointPoint::Before);
        }

        self.emit(ctx, step, StepEventKind::Started, BTreeMap::new(), None);

        let body = if let Some(for_each) = &step.for_each {
            self.run_for_each(step, strategy, for_each, ctx, cancel)
        } else if let Some(repeat) = &step.repeat {
            self.run_repeat(step, strategy, repeat, ctx, cancel)
        } else {
            self.run_attempts(step, strategy, ctx, cancel, &LoopFrames::default())
        };

        match (body.outcome, body.error) {
            (Some(outcome), None) => {
                let mut output = StepOutput {
                    summary: outcome.message.clone(),
                    metrics: outcome.metrics.clone(),
                    outputs: outcome.outputs.clone(),
                    failed: false,
                    skipped: false,
                    attempts: body.attempts,
                };
                output.metrics.extend(body.metrics);
                let metrics = output.metrics.clone();
                ctx.step_outputs.insert(step.name.clone(), output);
                if let Err(error) = self.apply_set_variables(step, ctx) {
                    return self.resolve_failure(step, strategy, ctx, error, body.attempts);
                }
                if step.checkpoint == Some(CheckpointPoint::After)
                    || cadence_checkpoint(strategy, step)
                {
                    self.maybe_checkpoint(strategy, ctx, step, CheckpointPoint::After);
                }
                self.emit(ctx, step, StepEventKind::Finished, metrics, None);
                StepFlow::Continue
            }
            (_, Some(error)) => self.resolve_failure(step, strategy, ctx, error, body.attempts),
            (None, None) => self.resolve_failure(
                step,
                strategy,
                ctx,
                EngineError::internal("step body produced neither outcome nor error"),
                body.attempts,
            ),
        }
    }

    /// Applies the step's error policy to a failure.
    fn resolve_failure(
        &self,
        step: &Step,
        strategy: &Strategy,
        ctx: &mut ExecutionContext,
        error: EngineError,
        attempts: u32,
    ) -> StepFlow {
        if error.kind == ErrorKind::Cancelled {
            self.record_failed(step, ctx, &error, attempts);
            return StepFlow::Cancelled;
        }
        let action = step
            .on_error
            .as_ref()
            .map_or(strategy.error_handling.default, |policy| policy.action);
        let fallback_action = step
            .on_error
            .as_ref()
            .and_then(|policy| policy.fallback.as_ref())
            .map(|fallback| fallback.action);

        // Retry exhaustion lands here; the fallback decides what happens.
        let effective = match action {
            ErrorActionKind::Retry => fallback_action.unwrap_or(ErrorActionKind::Stop),
            other => other,
        };
        if action == ErrorActionKind::Retry {
            if let Some(fallback) =
                step.on_error.as_ref().and_then(|policy| policy.fallback.as_ref())
            {
                for (name, value) in &fallback.set_variables {
                    let substituted = {
                        let scope = ContextScope::new(ctx);
                        substitute_json(value, &scope)
                    };
                    if let Ok(value) = substituted {
                        ctx.variables.insert(name.clone(), value);
                    }
                }
            }
        }

        self.record_failed(step, ctx, &error, attempts);
        match effective {
            ErrorActionKind::Stop | ErrorActionKind::Retry => StepFlow::Stop(error),
            ErrorActionKind::Continue | ErrorActionKind::Skip => StepFlow::Continue,
        }
    }

    /// Runs the attempt loop for one step body.
    ///
    /// Each attempt substitutes parameters freshly against the then-current
    /// context, so time- or variable-dependent values may change between
    /// retries. The context is restored to its pre-attempt snapshot after
    /// every failed attempt.
    fn run_attempts(
        &self,
        step: &Step,
        strategy: &Strategy,
        ctx: &mut ExecutionContext,
        cancel: &CancellationFlag,
        frames: &LoopFrames,
    ) -> BodyResult {
        let policy = step.on_error.as_ref();
        let is_retry = policy.is_some_and(|policy| policy.action == ErrorActionKind::Retry)
            || (policy.is_none()
                && strategy.error_handling.default == ErrorActionKind::Retry);
        let max_attempts = if is_retry {
            policy
                .and_then(|policy| policy.max_attempts)
                .unwrap_or(strategy.error_handling.max_retries)
                .max(1)
        } else {
            1
        };
        let delay_ms = policy
            .and_then(|policy| policy.delay_ms)
            .unwrap_or(strategy.error_handling.retry_delay_ms);
        let backoff = policy.and_then(|policy| policy.backoff).unwrap_or_default();

        let mut attempt = 1;
        loop {
            let snapshot = ctx.snapshot();
            match self.attempt_once(step, ctx, frames) {
                Ok(outcome) => return BodyResult::succeeded(outcome, attempt),
                Err(error) => {
                    ctx.restore(snapshot);
                    if attempt >= max_attempts {
                        return BodyResult::failed(error, attempt);
                    }
                    let sleep_ms = backoff_delay(backoff, delay_ms, attempt);
                    thread::sleep(Duration::from_millis(sleep_ms));
                    if cancel.is_cancelled() {
                        return BodyResult::failed(
                            EngineError::new(ErrorKind::Cancelled, "job cancelled"),
                            attempt,
                        );
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Performs one substitution + validation + execution attempt.
    fn attempt_once(
        &self,
        step: &Step,
        ctx: &mut ExecutionContext,
        frames: &LoopFrames,
    ) -> Result<ActionOutcome, EngineError> {
        let step_name = StepName::new(step.name.clone());
        let action_type = step.action_type();
        let attribute = |error: EngineError| {
            error.with_step(step_name.clone()).with_action_type(action_type.clone())
        };

        let raw_params = serde_json::Value::Object(
            step.action
                .params
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        );
        let substituted = {
            let scope = ContextScope::with_frames(ctx, frames.clone());
            substitute_json(&raw_params, &scope).map_err(EngineError::from)
        }
        .map_err(&attribute)?;
        let params: ParamMap = substituted
            .as_object()
            .map(|entries| entries.clone().into_iter().collect())
            .unwrap_or_default();

        let action = self.registry.lookup(&action_type).map_err(&attribute)?;
        let validated = action.parameters_schema().validate(&params).map_err(&attribute)?;
        let outcome = action.execute(&validated, ctx).map_err(&attribute)?;
        if outcome.success {
            Ok(outcome)
        } else {
            Err(attribute(outcome.error.unwrap_or_else(|| {
                EngineError::internal(format!("action reported failure: {}", outcome.message))
            })))
        }
    }

    /// Runs `for_each` iterations, serially or in bounded parallel.
    fn run_for_each(
        &self,
        step: &Step,
        strategy: &Strategy,
        spec: &crate::strategy::ForEachSpec,
        ctx: &mut ExecutionContext,
        cancel: &CancellationFlag,
    ) -> BodyResult {
        let items = match resolve_items(&spec.items, ctx) {
            Ok(items) => items,
            Err(error) => return BodyResult::failed(error, 1),
        };
        let total_items = items.len();
        let mut failed_iterations = 0_u64;
        let mut first_error: Option<EngineError> = None;
        let mut last_outcome: Option<ActionOutcome> = None;
        let mut attempts_total = 0;

        if spec.parallel {
            let workers = spec.max_workers.unwrap_or(strategy.execution.max_workers).max(1);
            let indexed: Vec<(usize, serde_json::Value)> = items.into_iter().enumerate().collect();
            'chunks: for chunk in indexed.chunks(workers) {
                if cancel.is_cancelled() {
                    return BodyResult::failed(
                        EngineError::new(ErrorKind::Cancelled, "job cancelled"),
                        attempts_total.max(1),
                    );
                }
                let mut branches = Vec::new();
                thread::scope(|scope| {
                    let mut handles = Vec::with_capacity(chunk.len());
                    for (index, item) in chunk {
                        let mut branch = ctx.snapshot();
                        let frames =
                            LoopFrames::with_foreach(*index as i64, item.clone());
                        handles.push(scope.spawn(move || {
                            let result =
                                self.run_attempts(step, strategy, &mut branch, cancel, &frames);
                            (branch, result)
                        }));
                    }
                    for handle in handles {
                        match handle.join() {
                            Ok(pair) => branches.push(pair),
                            Err(_) => branches.push((
                                ctx.snapshot(),
                                BodyResult::failed(
                                    EngineError::internal("for_each worker panicked"),
                                    1,
                                ),
                            )),
                        }
                    }
                });
                for (branch, result) in branches {
                    attempts_total += result.attempts;
                    match (result.outcome, result.error) {
                        (Some(outcome), None) => {
                            if let Err(error) = ctx.merge_branch(branch) {
                                failed_iterations += 1;
                                first_error.get_or_insert(error);
                            } else {
                                last_outcome = Some(outcome);
                            }
                        }
                        (_, Some(error)) => {
                            failed_iterations += 1;
                            first_error.get_or_insert(error);
                        }
                        (None, None) => {}
                    }
                }
                if spec.fail_fast && first_error.is_some() {
                    break 'chunks;
                }
            }
        } else {
            for (index, item) in items.into_iter().enumerate() {
                if cancel.is_cancelled() {
                    return BodyResult::failed(
                        EngineError::new(ErrorKind::Cancelled, "job cancelled"),
                        attempts_total.max(1),
                    );
                }
                let frames = LoopFrames::with_foreach(index as i64, item);
                let result = self.run_attempts(step, strategy, ctx, cancel, &frames);
                attempts_total += result.attempts;
                match (result.outcome, result.error) {
                    (Some(outcome), None) => last_outcome = Some(outcome),
                    (_, Some(error)) => {
                        failed_iterations += 1;
                        first_error.get_or_insert(error);
                        if spec.fail_fast {
                            break;
                        }
                    }
                    (None, None) => {}
                }
            }
        }

        let mut body = match first_error {
            Some(error) => BodyResult::failed(error, attempts_total.max(1)),
            None => match last_outcome {
                Some(outcome) => BodyResult::succeeded(outcome, attempts_total.max(1)),
                None => BodyResult::succeeded(
                    ActionOutcome::ok("for_each over empty item list"),
                    attempts_total.max(1),
                ),
            },
        };
        body.metrics.insert(
            "failed_iterations".to_string(),
            serde_json::json!(failed_iterations),
        );
        body.metrics.insert("iterations".to_string(), serde_json::json!(total_items));
        body
    }

    /// Runs `repeat` iterations under the while-condition and caps.
    fn run_repeat(
        &self,
        step: &Step,
        strategy: &Strategy,
        spec: &crate::strategy::RepeatSpec,
        ctx: &mut ExecutionContext,
        cancel: &CancellationFlag,
    ) -> BodyResult {
        let cap = spec.max_iterations.unwrap_or(REPEAT_HARD_CAP).min(REPEAT_HARD_CAP).max(1);
        let mut iteration = 1_u32;
        let mut attempts_total = 0;
        let mut last_outcome = None;
        loop {
            if cancel.is_cancelled() {
                return BodyResult::failed(
                    EngineError::new(ErrorKind::Cancelled, "job cancelled"),
                    attempts_total.max(1),
                );
            }
            let frames = LoopFrames::with_repeat(i64::from(iteration));
            let result = self.run_attempts(step, strategy, ctx, cancel, &frames);
            attempts_total += result.attempts;
            match (result.outcome, result.error) {
                (Some(outcome), None) => last_outcome = Some(outcome),
                (_, Some(error)) => return BodyResult::failed(error, attempts_total.max(1)),
                (None, None) => {}
            }
            let proceed = {
                let scope = ContextScope::with_frames(ctx, LoopFrames::with_repeat(
                    i64::from(iteration),
                ));
                evaluate_condition(&spec.while_condition, &scope)
            };
            match proceed {
                Ok(true) if iteration < cap => iteration += 1,
                Ok(_) => break,
                Err(error) => {
                    return BodyResult::failed(
                        EngineError::from(error).with_step(StepName::new(step.name.clone())),
                        attempts_total.max(1),
                    );
                }
            }
        }
        let mut body = match last_outcome {
            Some(outcome) => BodyResult::succeeded(outcome, attempts_total.max(1)),
            None => BodyResult::failed(
                EngineError::internal("repeat produced no outcome"),
                attempts_total.max(1),
            ),
        };
        body.metrics.insert("iterations".to_string(), serde_json::json!(iteration));
        body
    }

    /// Applies `set_variables` after a successful step.
    fn apply_set_variables(
        &self,
        step: &Step,
        ctx: &mut ExecutionContext,
    ) -> Result<(), EngineError> {
        for (name, value) in &step.set_variables {
            let substituted = {
                let scope = ContextScope::new(ctx);
                substitute_json(value, &scope)
                    .map_err(EngineError::from)
                    .map_err(|error| error.with_step(StepName::new(step.name.clone())))?
            };
            ctx.variables.insert(name.clone(), substituted);
        }
        Ok(())
    }

    /// Records a skipped step and emits the event.
    fn record_skipped(&self, step: &Step, ctx: &mut ExecutionContext, reason: &str) {
        let output = StepOutput {
            summary: reason.to_string(),
            skipped: true,
            ..StepOutput::default()
        };
        ctx.step_outputs.insert(step.name.clone(), output);
        self.emit(ctx, step, StepEventKind::Skipped, BTreeMap::new(), Some(reason.to_string()));
    }

    /// Records a failed step and emits the event.
    fn record_failed(
        &self,
        step: &Step,
        ctx: &mut ExecutionContext,
        error: &EngineError,
        attempts: u32,
    ) {
        let output = StepOutput {
            summary: error.to_string(),
            failed: true,
            attempts,
            ..StepOutput::default()
        };
        ctx.step_outputs.insert(step.name.clone(), output);
        self.emit(
            ctx,
            step,
            StepEventKind::Failed,
            BTreeMap::new(),
            Some(error.to_string()),
        );
    }

    /// Writes a checkpoint when a root is configured; failures are
    /// recorded as statistics, never escalated.
    fn maybe_checkpoint(
        &self,
        strategy: &Strategy,
        ctx: &mut ExecutionContext,
        step: &Step,
        point: CheckpointPoint,
    ) {
        if !strategy.checkpointing.enabled {
            return;
        }
        let Some(root) = &self.config.checkpoint_root else {
            return;
        };
        if let Err(error) = write_checkpoint(root, ctx, &step.name, point) {
            ctx.statistics.insert(
                format!("checkpoint_error_{}", step.name),
                serde_json::json!(error.to_string()),
            );
        }
    }

    /// Emits a step lifecycle event.
    fn emit(
        &self,
        ctx: &ExecutionContext,
        step: &Step,
        event: StepEventKind,
        metrics: BTreeMap<String, serde_json::Value>,
        message: Option<String>,
    ) {
        self.events.emit(&StepEvent {
            job_id: ctx.job_id.clone(),
            step_name: StepName::new(step.name.clone()),
            event,
            metrics,
            message,
            time: Timestamp::now(),
        });
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Computes the backoff delay for an attempt (1-based).
const fn backoff_delay(backoff: BackoffKind, delay_ms: u64, attempt: u32) -> u64 {
    match backoff {
        BackoffKind::Linear => delay_ms.saturating_mul(attempt as u64),
        BackoffKind::Exponential => {
            let exponent = attempt.saturating_sub(1);
            let factor = if exponent >= 63 { u64::MAX } else { 1_u64 << exponent };
            delay_ms.saturating_mul(factor)
        }
    }
}

/// Returns whether the checkpoint cadence fires after this step.
fn cadence_checkpoint(strategy: &Strategy, step: &Step) -> bool {
    if !strategy.checkpointing.enabled {
        return false;
    }
    match strategy.checkpointing.strategy {
        CheckpointStrategy::AfterEachStep => true,
        CheckpointStrategy::AfterCriticalSteps => step.is_critical,
        CheckpointStrategy::Manual => false,
    }
}

/// Resolves `for_each.items` into a concrete item list.
fn resolve_items(
    items: &serde_json::Value,
    ctx: &ExecutionContext,
) -> Result<Vec<serde_json::Value>, EngineError> {
    match items {
        serde_json::Value::String(template) => {
            let value = {
                let scope = ContextScope::new(ctx);
                substitute(template, &scope).map_err(EngineError::from)?
            };
            match value.to_json() {
                serde_json::Value::Array(resolved) => Ok(resolved),
                other => Err(EngineError::new(
                    ErrorKind::Expression,
                    format!("for_each items must resolve to a list, found {other}"),
                )),
            }
        }
        serde_json::Value::Array(inline) => {
            let mut resolved = Vec::with_capacity(inline.len());
            for item in inline {
                let scope = ContextScope::new(ctx);
                resolved.push(
                    substitute_json(item, &scope).map_err(EngineError::from)?,
                );
            }
            Ok(resolved)
        }
        other => Err(EngineError::new(
            ErrorKind::Expression,
            format!("for_each items must be a list or expression, found {other}"),
        )),
    }
}

/// Builds the implicit progressive-stage dependency chain for DAG mode.
fn progressive_chain(steps: &[Step]) -> BTreeMap<String, String> {
    let mut chain = BTreeMap::new();
    let mut previous: Option<&str> = None;
    for step in steps {
        let action_type = step.action.action_type.as_str();
        if action_type == PROGRESSIVE_STAGE || action_type == PROGRESSIVE_FINALIZE {
            if let Some(previous) = previous {
                chain.insert(step.name.clone(), previous.to_string());
            }
            previous = Some(step.name.as_str());
        }
    }
    chain
}
