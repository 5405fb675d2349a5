// biomapper-actions/tests/common/mod.rs
// ============================================================================
// Module: Actions Test Support
// Description: Shared fixtures for the built-in action tests.
// Purpose: Provide context builders and schema-validated invocation.
// Dependencies: biomapper-actions, biomapper-core
// ============================================================================
//! ## Overview
//! Helpers that build execution contexts and invoke actions the way the
//! executor does: parameters pass schema validation before execution.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use biomapper_core::Action;
use biomapper_core::ActionOutcome;
use biomapper_core::CellValue;
use biomapper_core::Dataset;
use biomapper_core::EngineError;
use biomapper_core::ExecutionContext;
use biomapper_core::JobId;
use biomapper_core::Record;
use biomapper_core::StrategyName;
use biomapper_core::Timestamp;

/// Builds a fresh execution context rooted in a temp directory.
#[must_use]
pub fn test_context(output_root: &std::path::Path) -> ExecutionContext {
    ExecutionContext::new(
        JobId::new("job-actions"),
        StrategyName::new("test_strategy"),
        Timestamp::from_unix_millis(0),
        output_root.to_path_buf(),
        BTreeMap::new(),
        BTreeMap::new(),
    )
}

/// Invokes an action the way the executor does: schema first, then execute.
pub fn invoke(
    action: &dyn Action,
    params: serde_json::Value,
    ctx: &mut ExecutionContext,
) -> Result<ActionOutcome, EngineError> {
    let raw: BTreeMap<String, serde_json::Value> = params
        .as_object()
        .map(|entries| entries.clone().into_iter().collect())
        .unwrap_or_default();
    let validated = action.parameters_schema().validate(&raw)?;
    action.execute(&validated, ctx)
}

/// Builds a single-column dataset of text identifiers; `None` cells are
/// null.
#[must_use]
pub fn column_dataset(column: &str, values: &[Option<&str>]) -> Dataset {
    let mut dataset = Dataset::new(vec![column.to_string()]);
    for value in values {
        let mut row = Record::new();
        let cell = value.map_or(CellValue::Null, CellValue::text);
        row.insert(column.to_string(), cell);
        let _ = dataset.push_row(row);
    }
    dataset
}

/// Builds a two-column dataset from (key, value) pairs.
#[must_use]
pub fn pair_dataset(key_column: &str, value_column: &str, rows: &[(&str, &str)]) -> Dataset {
    let mut dataset = Dataset::new(vec![key_column.to_string(), value_column.to_string()]);
    for (key, value) in rows {
        let mut row = Record::new();
        row.insert(key_column.to_string(), CellValue::text(*key));
        row.insert(value_column.to_string(), CellValue::text(*value));
        let _ = dataset.push_row(row);
    }
    dataset
}
