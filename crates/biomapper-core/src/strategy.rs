// biomapper-core/src/strategy.rs
// ============================================================================
// Module: Biomapper Strategy Model
// Description: Declarative strategy and step specifications with validation.
// Purpose: Define the immutable pipeline model strategies load into.
// Dependencies: crate::{core, registry}, biomapper-expr, serde
// ============================================================================

//! ## Overview
//! Strategies are data, not code: an ordered step list with optional
//! control flow, parameter defaults, and error policies. Validation runs at
//! load time and enforces unique step names, resolvable dependencies,
//! acyclic DAGs, parseable expressions, and structurally possible
//! references. A loaded strategy is immutable for process lifetime.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::ActionType;
use crate::registry::ActionRegistry;

// ============================================================================
// SECTION: Strategy
// ============================================================================

/// Declarative, immutable strategy specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    /// Globally unique strategy name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Parameter defaults, overridable at submission.
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// Initial variables; string values may contain expressions.
    #[serde(default)]
    pub variables: BTreeMap<String, serde_json::Value>,
    /// Execution settings.
    #[serde(default)]
    pub execution: ExecutionSettings,
    /// Strategy-wide error handling defaults.
    #[serde(default)]
    pub error_handling: ErrorHandlingSettings,
    /// Checkpointing policy.
    #[serde(default)]
    pub checkpointing: CheckpointSettings,
    /// Main step sequence.
    pub steps: Vec<Step>,
    /// Cleanup steps run after the main sequence regardless of outcome.
    #[serde(default)]
    pub finally_steps: Vec<Step>,
}

// ============================================================================
// SECTION: Execution Settings
// ============================================================================

/// Execution mode of a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Steps run strictly in declaration order.
    #[default]
    Sequential,
    /// Steps run in dependency order; independent steps may run in
    /// parallel.
    Dag,
}

/// Execution settings block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// Execution mode.
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Worker pool bound for DAG-parallel steps.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Sequential,
            max_workers: default_max_workers(),
        }
    }
}

/// Returns the default DAG worker pool bound.
const fn default_max_workers() -> usize {
    4
}

// ============================================================================
// SECTION: Error Handling
// ============================================================================

/// Error policy action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorActionKind {
    /// Mark the step failed and fail the job.
    #[default]
    Stop,
    /// Record the failure and proceed to the next step.
    Continue,
    /// Proceed without retry accounting.
    Skip,
    /// Re-run the step with backoff.
    Retry,
}

/// Backoff progression for retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Delay grows linearly with the attempt number.
    #[default]
    Linear,
    /// Delay doubles with each attempt.
    Exponential,
}

/// Strategy-wide error handling defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorHandlingSettings {
    /// Default action applied when a step has no `on_error`.
    #[serde(default)]
    pub default: ErrorActionKind,
    /// Default retry attempt cap.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Default initial retry delay in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for ErrorHandlingSettings {
    fn default() -> Self {
        Self {
            default: ErrorActionKind::Stop,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Returns the default retry attempt cap.
const fn default_max_retries() -> u32 {
    3
}

/// Returns the default initial retry delay.
const fn default_retry_delay_ms() -> u64 {
    1_000
}

/// Fallback applied when retries are exhausted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackSpec {
    /// Fallback action (stop, continue, or skip).
    pub action: ErrorActionKind,
    /// Variables set when the fallback applies.
    #[serde(default)]
    pub set_variables: BTreeMap<String, serde_json::Value>,
}

/// Per-step error policy, overriding the strategy default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPolicy {
    /// Error action.
    pub action: ErrorActionKind,
    /// Retry attempt cap (retry only).
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Backoff progression (retry only).
    #[serde(default)]
    pub backoff: Option<BackoffKind>,
    /// Initial delay in milliseconds (retry only).
    #[serde(default)]
    pub delay_ms: Option<u64>,
    /// Fallback applied on retry exhaustion.
    #[serde(default)]
    pub fallback: Option<FallbackSpec>,
}

// ============================================================================
// SECTION: Checkpointing
// ============================================================================

/// Checkpoint cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStrategy {
    /// Snapshot after every step.
    AfterEachStep,
    /// Snapshot after steps marked `is_critical`.
    AfterCriticalSteps,
    /// Snapshot only where steps request it.
    #[default]
    Manual,
}

/// Checkpoint storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStorage {
    /// Snapshots written beneath the checkpoint root.
    #[default]
    Filesystem,
}

/// Checkpointing policy block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CheckpointSettings {
    /// True when checkpointing is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Checkpoint cadence.
    #[serde(default)]
    pub strategy: CheckpointStrategy,
    /// Storage backend.
    #[serde(default)]
    pub storage: CheckpointStorage,
    /// Optional path override beneath the configured checkpoint root.
    #[serde(default)]
    pub path: Option<String>,
    /// Number of snapshots retained per job (unlimited when absent).
    #[serde(default)]
    pub retention: Option<u32>,
}

// ============================================================================
// SECTION: Steps
// ============================================================================

/// Action invocation inside a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInvocation {
    /// Registry key of the action.
    #[serde(rename = "type")]
    pub action_type: String,
    /// Raw action parameters; string values may contain expressions.
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
}

/// `for_each` control flow specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForEachSpec {
    /// Items to iterate: an expression string or an inline list.
    pub items: serde_json::Value,
    /// True when iterations may run in parallel.
    #[serde(default)]
    pub parallel: bool,
    /// Worker bound for parallel iteration (defaults to the execution
    /// setting).
    #[serde(default)]
    pub max_workers: Option<usize>,
    /// True when the first failing iteration aborts the rest.
    #[serde(default = "default_fail_fast")]
    pub fail_fast: bool,
}

/// Returns the default `fail_fast` flag.
const fn default_fail_fast() -> bool {
    true
}

/// `repeat` control flow specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatSpec {
    /// Condition checked before each subsequent iteration.
    pub while_condition: String,
    /// Iteration cap (further bounded by the hard cap of 1000).
    #[serde(default)]
    pub max_iterations: Option<u32>,
}

/// Checkpoint placement relative to the step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointPoint {
    /// Snapshot before the step runs.
    Before,
    /// Snapshot after the step completes.
    After,
}

/// One step of a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Step name, unique within the strategy.
    pub name: String,
    /// Action invocation.
    pub action: ActionInvocation,
    /// Condition gating execution; false skips the step.
    #[serde(default)]
    pub condition: Option<String>,
    /// Dependencies for DAG ordering.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Iteration over a resolved item list.
    #[serde(default)]
    pub for_each: Option<ForEachSpec>,
    /// Conditional repetition of the step body.
    #[serde(default)]
    pub repeat: Option<RepeatSpec>,
    /// Per-step error policy.
    #[serde(default)]
    pub on_error: Option<ErrorPolicy>,
    /// Variables set after successful execution.
    #[serde(default)]
    pub set_variables: BTreeMap<String, serde_json::Value>,
    /// Marks the step for `after_critical_steps` checkpointing.
    #[serde(default)]
    pub is_critical: bool,
    /// Explicit checkpoint placement.
    #[serde(default)]
    pub checkpoint: Option<CheckpointPoint>,
    /// Path template; the step is skipped when the path exists.
    #[serde(default)]
    pub skip_if_exists: Option<String>,
}

impl Step {
    /// Returns the action type as a registry key.
    #[must_use]
    pub fn action_type(&self) -> ActionType {
        ActionType::new(self.action.action_type.clone())
    }
}

// ============================================================================
// SECTION: Validation Errors
// ============================================================================

/// Strategy validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    /// The strategy declares no steps.
    #[error("strategy {0} declares no steps")]
    NoSteps(String),
    /// A step name occurs more than once.
    #[error("duplicate step name: {0}")]
    DuplicateStepName(String),
    /// A step references an action type the registry does not know.
    #[error("step {step} references unknown action type: {action_type}")]
    UnknownActionType {
        /// Offending step name.
        step: String,
        /// Unknown action type.
        action_type: String,
    },
    /// A dependency references an undeclared step.
    #[error("step {step} depends on undeclared step: {dependency}")]
    UnknownDependency {
        /// Offending step name.
        step: String,
        /// Undeclared dependency.
        dependency: String,
    },
    /// A sequential-mode dependency references a later step.
    #[error("step {step} depends on later step {dependency} in sequential mode")]
    ForwardDependency {
        /// Offending step name.
        step: String,
        /// Later dependency.
        dependency: String,
    },
    /// The DAG dependency graph contains a cycle.
    #[error("dependency cycle involving step: {0}")]
    DependencyCycle(String),
    /// An expression failed to parse.
    #[error("invalid expression in {location}: {error}")]
    Expression {
        /// Location description (step and field).
        location: String,
        /// Underlying expression error.
        error: biomapper_expr::ExprError,
    },
    /// An expression references a step the strategy does not declare.
    #[error("expression in {location} references undeclared step: {step}")]
    UnknownStepReference {
        /// Location description (step and field).
        location: String,
        /// Undeclared step name.
        step: String,
    },
}

// ============================================================================
// SECTION: Validation
// ============================================================================

impl Strategy {
    /// Validates the strategy invariants.
    ///
    /// When a registry is provided, every referenced action type must be
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError`] when validation fails.
    pub fn validate(&self, registry: Option<&ActionRegistry>) -> Result<(), StrategyError> {
        if self.steps.is_empty() {
            return Err(StrategyError::NoSteps(self.name.clone()));
        }
        let step_names = self.ensure_unique_step_names()?;
        self.ensure_known_actions(registry)?;
        self.ensure_dependencies_resolve(&step_names)?;
        self.ensure_expressions_parse(&step_names)?;
        Ok(())
    }

    /// Ensures step names are unique across main and finally sequences.
    fn ensure_unique_step_names(&self) -> Result<BTreeSet<String>, StrategyError> {
        let mut names = BTreeSet::new();
        for step in self.steps.iter().chain(&self.finally_steps) {
            if !names.insert(step.name.clone()) {
                return Err(StrategyError::DuplicateStepName(step.name.clone()));
            }
        }
        Ok(names)
    }

    /// Ensures every action type is known to the registry.
    fn ensure_known_actions(&self, registry: Option<&ActionRegistry>) -> Result<(), StrategyError> {
        let Some(registry) = registry else {
            return Ok(());
        };
        for step in self.steps.iter().chain(&self.finally_steps) {
            if !registry.contains(&step.action_type()) {
                return Err(StrategyError::UnknownActionType {
                    step: step.name.clone(),
                    action_type: step.action.action_type.clone(),
                });
            }
        }
        Ok(())
    }

    /// Ensures dependencies reference declared steps and stay acyclic.
    fn ensure_dependencies_resolve(
        &self,
        step_names: &BTreeSet<String>,
    ) -> Result<(), StrategyError> {
        let mut declared_so_far = BTreeSet::new();
        for step in &self.steps {
            for dependency in &step.depends_on {
                if !step_names.contains(dependency) {
                    return Err(StrategyError::UnknownDependency {
                        step: step.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
                if self.execution.mode == ExecutionMode::Sequential
                    && !declared_so_far.contains(dependency)
                {
                    return Err(StrategyError::ForwardDependency {
                        step: step.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
            declared_so_far.insert(step.name.clone());
        }
        if self.execution.mode == ExecutionMode::Dag {
            self.ensure_acyclic()?;
        }
        Ok(())
    }

    /// Detects dependency cycles via Kahn's algorithm.
    fn ensure_acyclic(&self) -> Result<(), StrategyError> {
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for step in &self.steps {
            in_degree.insert(step.name.as_str(), step.depends_on.len());
            for dependency in &step.depends_on {
                dependents.entry(dependency.as_str()).or_default().push(step.name.as_str());
            }
        }
        let mut ready: Vec<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut resolved = 0;
        while let Some(name) = ready.pop() {
            resolved += 1;
            for dependent in dependents.get(name).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(dependent);
                    }
                }
            }
        }
        if resolved == self.steps.len() {
            return Ok(());
        }
        let stuck = in_degree
            .iter()
            .find(|(_, degree)| **degree > 0)
            .map_or_else(String::new, |(name, _)| (*name).to_string());
        Err(StrategyError::DependencyCycle(stuck))
    }

    /// Ensures all embedded expressions parse and reference declared steps.
    fn ensure_expressions_parse(
        &self,
        step_names: &BTreeSet<String>,
    ) -> Result<(), StrategyError> {
        for (name, value) in &self.variables {
            validate_value(value, &format!("variables.{name}"), step_names)?;
        }
        for step in self.steps.iter().chain(&self.finally_steps) {
            let at = |field: &str| format!("step {} {field}", step.name);
            if let Some(condition) = &step.condition {
                validate_condition(condition, &at("condition"), step_names)?;
            }
            if let Some(skip) = &step.skip_if_exists {
                validate_template(skip, &at("skip_if_exists"), step_names)?;
            }
            if let Some(for_each) = &step.for_each {
                validate_value(&for_each.items, &at("for_each.items"), step_names)?;
            }
            if let Some(repeat) = &step.repeat {
                validate_condition(
                    &repeat.while_condition,
                    &at("repeat.while_condition"),
                    step_names,
                )?;
            }
            for (name, value) in &step.set_variables {
                validate_value(value, &at(&format!("set_variables.{name}")), step_names)?;
            }
            for (name, value) in &step.action.params {
                validate_value(value, &at(&format!("params.{name}")), step_names)?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Expression Validation Helpers
// ============================================================================

/// Checks reference paths against declared step names.
fn check_references(
    references: &[biomapper_expr::ReferencePath],
    location: &str,
    step_names: &BTreeSet<String>,
) -> Result<(), StrategyError> {
    for reference in references {
        if reference.root == "steps" {
            if let Some(step) = reference.segments.first() {
                if !step_names.contains(step) {
                    return Err(StrategyError::UnknownStepReference {
                        location: location.to_string(),
                        step: step.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Validates a template string field.
fn validate_template(
    input: &str,
    location: &str,
    step_names: &BTreeSet<String>,
) -> Result<(), StrategyError> {
    let references = biomapper_expr::validate(input).map_err(|error| {
        StrategyError::Expression { location: location.to_string(), error }
    })?;
    check_references(&references, location, step_names)
}

/// Validates a condition string field.
fn validate_condition(
    input: &str,
    location: &str,
    step_names: &BTreeSet<String>,
) -> Result<(), StrategyError> {
    let expr = biomapper_expr::parse_condition(input).map_err(|error| {
        StrategyError::Expression { location: location.to_string(), error }
    })?;
    check_references(&expr.references(), location, step_names)
}

/// Recursively validates every string inside a JSON value.
fn validate_value(
    value: &serde_json::Value,
    location: &str,
    step_names: &BTreeSet<String>,
) -> Result<(), StrategyError> {
    match value {
        serde_json::Value::String(text) => validate_template(text, location, step_names),
        serde_json::Value::Array(items) => {
            for item in items {
                validate_value(item, location, step_names)?;
            }
            Ok(())
        }
        serde_json::Value::Object(entries) => {
            for item in entries.values() {
                validate_value(item, location, step_names)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
