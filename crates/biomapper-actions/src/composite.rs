// biomapper-actions/src/composite.rs
// ============================================================================
// Module: Composite Identifier Expansion Action
// Description: Expands multi-valued identifier cells into one row per
//              component.
// Purpose: Make composite identifiers individually mappable with full
//          provenance.
// Dependencies: biomapper-core
// ============================================================================

//! ## Overview
//! `PARSE_COMPOSITE_IDENTIFIERS` splits one column by an ordered separator
//! list. Every produced row carries `_original_composite` (the source
//! value), `_expansion_count` (how many components it split into), and
//! `_original_index` (the source row position). Null cells are dropped;
//! empty strings pass through once with `_skipped = true` when
//! `skip_empty` is set, and expand to a single empty component otherwise.
//! Re-running over an already-expanded dataset with the same separators
//! splits nothing further.

// ============================================================================
// SECTION: Imports
// ============================================================================

use biomapper_core::Action;
use biomapper_core::ActionOutcome;
use biomapper_core::ActionType;
use biomapper_core::CellValue;
use biomapper_core::EngineError;
use biomapper_core::ErrorKind;
use biomapper_core::ExecutionContext;
use biomapper_core::FieldSpec;
use biomapper_core::FieldType;
use biomapper_core::ParamMap;
use biomapper_core::ParamsSchema;
use biomapper_core::Record;

use crate::params::bool_or;
use crate::params::require_str;
use crate::params::str_list;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Action type name of the composite expansion action.
pub const PARSE_COMPOSITE_IDENTIFIERS: &str = "PARSE_COMPOSITE_IDENTIFIERS";

// The bookkeeping column names are part of the canonical provenance
// contract: mappers read them back to stamp `is_composite`/`parsed_value`.
pub use biomapper_core::EXPANSION_COUNT_COLUMN;
pub use biomapper_core::ORIGINAL_COMPOSITE_COLUMN;
pub use biomapper_core::ORIGINAL_INDEX_COLUMN;
pub use biomapper_core::SKIPPED_COLUMN;

// ============================================================================
// SECTION: Action
// ============================================================================

/// Composite identifier expansion.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParseCompositeIdentifiers;

impl Action for ParseCompositeIdentifiers {
    fn action_type(&self) -> ActionType {
        ActionType::new(PARSE_COMPOSITE_IDENTIFIERS)
    }

    fn parameters_schema(&self) -> ParamsSchema {
        ParamsSchema::new(vec![
            FieldSpec::required("input_key", FieldType::String),
            FieldSpec::required("output_key", FieldType::String),
            FieldSpec::required("column", FieldType::String),
            FieldSpec::required("separators", FieldType::StringList),
            FieldSpec::optional("skip_empty", FieldType::Boolean, Some(serde_json::json!(true))),
            FieldSpec::optional(
                "track_expansion",
                FieldType::Boolean,
                Some(serde_json::json!(true)),
            ),
        ])
    }

    fn consumes(&self) -> Vec<String> {
        vec!["datasets".to_string()]
    }

    fn produces(&self) -> Vec<String> {
        vec!["datasets".to_string(), "statistics.composite_expansion".to_string()]
    }

    fn execute(
        &self,
        params: &ParamMap,
        ctx: &mut ExecutionContext,
    ) -> Result<ActionOutcome, EngineError> {
        let input_key = require_str(params, "input_key")?;
        let output_key = require_str(params, "output_key")?;
        let column = require_str(params, "column")?;
        let separators = str_list(params, "separators");
        let skip_empty = bool_or(params, "skip_empty", true);
        let track_expansion = bool_or(params, "track_expansion", true);
        if separators.is_empty() {
            return Err(EngineError::new(
                ErrorKind::ParamValidation,
                "separators must list at least one separator",
            ));
        }

        let input = ctx.dataset(&input_key.as_str().into())?.clone();
        input.require_column(&column)?;
        let bookkeeping = [
            ORIGINAL_COMPOSITE_COLUMN.to_string(),
            EXPANSION_COUNT_COLUMN.to_string(),
            ORIGINAL_INDEX_COLUMN.to_string(),
            SKIPPED_COLUMN.to_string(),
        ];
        let template = input.with_additional_columns(&bookkeeping);
        let mut output = template.with_rows(Vec::new());

        let mut rows_with_composites = 0_u64;
        let mut max_components = 0_u64;
        let mut skipped_rows = 0_u64;
        for (index, row) in input.rows().iter().enumerate() {
            let cell = row.get(&column).cloned().unwrap_or_default();
            let value = match cell {
                CellValue::Null => continue,
                CellValue::Text(text) => text,
                other => other.render(),
            };
            if value.trim().is_empty() {
                if skip_empty {
                    skipped_rows += 1;
                    output.push_row(expanded_row(row, index, &value, 1, true))?;
                    continue;
                }
                output.push_row(expanded_row(row, index, &value, 1, false))?;
                continue;
            }
            let components = split_components(&value, &separators);
            let count = components.len() as u64;
            max_components = max_components.max(count);
            if count > 1 {
                rows_with_composites += 1;
            }
            for component in &components {
                let mut expanded = expanded_row(row, index, &value, components.len(), false);
                expanded.insert(column.clone(), CellValue::text(component.clone()));
                output.push_row(expanded)?;
            }
        }

        let total_input_rows = input.len();
        let total_output_rows = output.len();
        if track_expansion {
            ctx.statistics.insert(
                "composite_expansion".to_string(),
                serde_json::json!({
                    "total_input_rows": total_input_rows,
                    "total_output_rows": total_output_rows,
                    "rows_with_composites": rows_with_composites,
                    "max_components": max_components,
                    "skipped_rows": skipped_rows,
                }),
            );
        }
        ctx.insert_dataset(output_key.as_str().into(), output)?;
        Ok(ActionOutcome::ok(format!(
            "expanded {total_input_rows} rows into {total_output_rows} ({rows_with_composites} composite)"
        ))
        .with_metric("total_input_rows", serde_json::json!(total_input_rows))
        .with_metric("total_output_rows", serde_json::json!(total_output_rows))
        .with_metric("rows_with_composites", serde_json::json!(rows_with_composites))
        .with_output("output_key", serde_json::json!(output_key)))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Splits a value by every separator in order.
fn split_components(value: &str, separators: &[String]) -> Vec<String> {
    let mut parts = vec![value.to_string()];
    for separator in separators {
        if separator.is_empty() {
            continue;
        }
        parts = parts
            .iter()
            .flat_map(|part| part.split(separator.as_str()))
            .map(|part| part.trim().to_string())
            .collect();
    }
    parts.retain(|part| !part.is_empty());
    if parts.is_empty() {
        parts.push(value.trim().to_string());
    }
    parts
}

/// Builds one output row with bookkeeping columns populated.
fn expanded_row(
    source: &Record,
    index: usize,
    original: &str,
    expansion_count: usize,
    skipped: bool,
) -> Record {
    let mut row = source.clone();
    row.insert(
        ORIGINAL_COMPOSITE_COLUMN.to_string(),
        CellValue::text(original),
    );
    row.insert(
        EXPANSION_COUNT_COLUMN.to_string(),
        CellValue::Number(expansion_count as f64),
    );
    row.insert(
        ORIGINAL_INDEX_COLUMN.to_string(),
        CellValue::Number(index as f64),
    );
    row.insert(
        SKIPPED_COLUMN.to_string(),
        CellValue::text(if skipped { "true" } else { "false" }),
    );
    row
}
