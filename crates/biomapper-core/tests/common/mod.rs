// biomapper-core/tests/common/mod.rs
// ============================================================================
// Module: Core Test Support
// Description: Shared fixtures for executor and progressive tests.
// Purpose: Provide stub actions, contexts, and strategy builders.
// Dependencies: biomapper-core
// ============================================================================
//! ## Overview
//! Stub actions and builders shared by the core integration tests.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use biomapper_core::Action;
use biomapper_core::ActionOutcome;
use biomapper_core::ActionRegistry;
use biomapper_core::ActionType;
use biomapper_core::CancellationFlag;
use biomapper_core::CellValue;
use biomapper_core::Dataset;
use biomapper_core::EngineError;
use biomapper_core::ErrorKind;
use biomapper_core::ExecutionContext;
use biomapper_core::FieldSpec;
use biomapper_core::FieldType;
use biomapper_core::JobId;
use biomapper_core::NoopStepEventSink;
use biomapper_core::ParamMap;
use biomapper_core::ParamsSchema;
use biomapper_core::Record;
use biomapper_core::StandardMappingResult;
use biomapper_core::Step;
use biomapper_core::Strategy;
use biomapper_core::StrategyExecutor;
use biomapper_core::StrategyName;
use biomapper_core::Timestamp;
use biomapper_core::runtime::ExecutorConfig;
use biomapper_core::strategy::ActionInvocation;

/// Builds a fresh execution context for tests.
#[must_use]
pub fn test_context(job_id: &str) -> ExecutionContext {
    ExecutionContext::new(
        JobId::new(job_id),
        StrategyName::new("test_strategy"),
        Timestamp::from_unix_millis(0),
        std::env::temp_dir().join(format!("biomapper-test-{job_id}")),
        BTreeMap::new(),
        BTreeMap::new(),
    )
}

/// Builds an executor over the registry with noop events.
#[must_use]
pub fn test_executor(registry: Arc<ActionRegistry>) -> StrategyExecutor {
    StrategyExecutor::new(registry, Arc::new(NoopStepEventSink), ExecutorConfig::default())
}

/// Builds a minimal step invoking an action type with params.
#[must_use]
pub fn step(name: &str, action_type: &str, params: serde_json::Value) -> Step {
    let params = params
        .as_object()
        .map(|entries| entries.clone().into_iter().collect())
        .unwrap_or_default();
    Step {
        name: name.to_string(),
        action: ActionInvocation { action_type: action_type.to_string(), params },
        condition: None,
        depends_on: Vec::new(),
        for_each: None,
        repeat: None,
        on_error: None,
        set_variables: BTreeMap::new(),
        is_critical: false,
        checkpoint: None,
        skip_if_exists: None,
    }
}

/// Builds a sequential strategy over the given steps.
#[must_use]
pub fn strategy(steps: Vec<Step>) -> Strategy {
    Strategy {
        name: "test_strategy".to_string(),
        description: String::new(),
        parameters: BTreeMap::new(),
        variables: BTreeMap::new(),
        execution: biomapper_core::strategy::ExecutionSettings::default(),
        error_handling: biomapper_core::strategy::ErrorHandlingSettings::default(),
        checkpointing: biomapper_core::strategy::CheckpointSettings::default(),
        steps,
        finally_steps: Vec::new(),
    }
}

/// Builds an identifier dataset with one `id` column.
#[must_use]
pub fn identifier_dataset(ids: &[&str]) -> Dataset {
    let mut dataset = Dataset::new(vec!["id".to_string()]);
    for id in ids {
        let mut row = Record::new();
        row.insert("id".to_string(), CellValue::text(*id));
        let _ = dataset.push_row(row);
    }
    dataset
}

// ============================================================================
// SECTION: Stub Actions
// ============================================================================

/// Action reporting a fixed metric value.
pub struct MetricAction {
    /// Registered action type.
    pub type_name: String,
    /// Metric key to report.
    pub metric: String,
    /// Metric value to report.
    pub value: serde_json::Value,
}

impl Action for MetricAction {
    fn action_type(&self) -> ActionType {
        ActionType::new(self.type_name.clone())
    }

    fn parameters_schema(&self) -> ParamsSchema {
        ParamsSchema::default()
    }

    fn execute(
        &self,
        _params: &ParamMap,
        _ctx: &mut ExecutionContext,
    ) -> Result<ActionOutcome, EngineError> {
        Ok(ActionOutcome::ok("metric reported")
            .with_metric(self.metric.clone(), self.value.clone()))
    }
}

/// Action failing a configured number of times before succeeding.
pub struct FlakyAction {
    /// Registered action type.
    pub type_name: String,
    /// Failures to produce before the first success.
    pub failures_before_success: u32,
    /// Observed invocation count.
    pub invocations: Arc<Mutex<u32>>,
}

impl Action for FlakyAction {
    fn action_type(&self) -> ActionType {
        ActionType::new(self.type_name.clone())
    }

    fn parameters_schema(&self) -> ParamsSchema {
        ParamsSchema::default()
    }

    fn execute(
        &self,
        _params: &ParamMap,
        _ctx: &mut ExecutionContext,
    ) -> Result<ActionOutcome, EngineError> {
        let mut count = self.invocations.lock().unwrap();
        *count += 1;
        if *count <= self.failures_before_success {
            return Err(EngineError::new(
                ErrorKind::ResolverTimeout,
                format!("attempt {} timed out", *count),
            ));
        }
        Ok(ActionOutcome::ok(format!("succeeded on attempt {}", *count))
            .with_metric("attempt", serde_json::json!(*count)))
    }
}

/// Action that always fails, optionally polluting the context first.
pub struct FailingAction {
    /// Registered action type.
    pub type_name: String,
    /// Dataset key written before failing, to exercise error locality.
    pub pollute_key: Option<String>,
}

impl Action for FailingAction {
    fn action_type(&self) -> ActionType {
        ActionType::new(self.type_name.clone())
    }

    fn parameters_schema(&self) -> ParamsSchema {
        ParamsSchema::default()
    }

    fn execute(
        &self,
        _params: &ParamMap,
        ctx: &mut ExecutionContext,
    ) -> Result<ActionOutcome, EngineError> {
        if let Some(key) = &self.pollute_key {
            ctx.insert_dataset(key.as_str().into(), Dataset::new(vec!["x".to_string()]))?;
            ctx.variables.insert("polluted".to_string(), serde_json::json!(true));
        }
        Err(EngineError::new(ErrorKind::Internal, "deliberate failure"))
    }
}

/// Action writing an empty dataset under a parameterized key.
pub struct WriteDatasetAction {
    /// Registered action type.
    pub type_name: String,
}

impl Action for WriteDatasetAction {
    fn action_type(&self) -> ActionType {
        ActionType::new(self.type_name.clone())
    }

    fn parameters_schema(&self) -> ParamsSchema {
        ParamsSchema::new(vec![FieldSpec::required("output_key", FieldType::String)])
    }

    fn execute(
        &self,
        params: &ParamMap,
        ctx: &mut ExecutionContext,
    ) -> Result<ActionOutcome, EngineError> {
        let key = params
            .get("output_key")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("out");
        ctx.insert_dataset(key.into(), Dataset::new(vec!["id".to_string()]))?;
        Ok(ActionOutcome::ok(format!("wrote {key}")))
    }
}

/// Action requesting cancellation mid-run, simulating an external cancel.
pub struct CancelDuringRunAction {
    /// Registered action type.
    pub type_name: String,
    /// Flag shared with the executor.
    pub flag: CancellationFlag,
}

impl Action for CancelDuringRunAction {
    fn action_type(&self) -> ActionType {
        ActionType::new(self.type_name.clone())
    }

    fn parameters_schema(&self) -> ParamsSchema {
        ParamsSchema::default()
    }

    fn execute(
        &self,
        _params: &ParamMap,
        _ctx: &mut ExecutionContext,
    ) -> Result<ActionOutcome, EngineError> {
        self.flag.cancel();
        Ok(ActionOutcome::ok("cancel requested; step runs to completion"))
    }
}

/// Mapper stub resolving identifiers through a fixed table.
pub struct TableMapper {
    /// Registered action type.
    pub type_name: String,
    /// Match method label.
    pub method: String,
    /// Confidence applied to every match.
    pub confidence: f64,
    /// Predicate deciding which identifiers map, and to what.
    pub table: BTreeMap<String, String>,
}

impl Action for TableMapper {
    fn action_type(&self) -> ActionType {
        ActionType::new(self.type_name.clone())
    }

    fn parameters_schema(&self) -> ParamsSchema {
        ParamsSchema::new(vec![
            FieldSpec::required("input_key", FieldType::String),
            FieldSpec::required("identifier_column", FieldType::String),
        ])
    }

    fn execute(
        &self,
        params: &ParamMap,
        ctx: &mut ExecutionContext,
    ) -> Result<ActionOutcome, EngineError> {
        let input_key = params
            .get("input_key")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        let column = params
            .get("identifier_column")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("id");
        let dataset = ctx.dataset(&input_key.into())?.clone();
        let mut results = Vec::new();
        for cell in dataset.column_values(column) {
            let Some(source) = cell.as_text() else {
                continue;
            };
            if let Some(target) = self.table.get(source) {
                results.push(StandardMappingResult::mapped(
                    source,
                    target.clone(),
                    self.method.clone(),
                    self.confidence,
                ));
            }
        }
        let matched = results.len();
        Ok(ActionOutcome::ok(format!("matched {matched}"))
            .with_metric("matched", serde_json::json!(matched))
            .with_mapping_results(results))
    }
}
