// biomapper-actions/src/merge.rs
// ============================================================================
// Module: Dataset Merge Action
// Description: Inner/left/right/outer joins on explicit join columns.
// Purpose: Combine datasets with one-to-many expansion accounting.
// Dependencies: biomapper-core
// ============================================================================

//! ## Overview
//! `MERGE_DATASETS` joins two datasets on columns named per dataset key in
//! `join_columns`. A dataset key missing from `join_columns` is a
//! `JOIN_COLUMN_UNSPECIFIED` contract violation; a named column absent
//! from its dataset is `JOIN_COLUMN_NOT_FOUND`. One-to-many matches emit
//! one output row per match and are accounted in
//! `statistics.one_to_many_stats`. Right-side columns that collide with
//! left-side names are prefixed with the right dataset key.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use biomapper_core::Action;
use biomapper_core::ActionOutcome;
use biomapper_core::ActionType;
use biomapper_core::CellValue;
use biomapper_core::Dataset;
use biomapper_core::EngineError;
use biomapper_core::ErrorKind;
use biomapper_core::ExecutionContext;
use biomapper_core::FieldSpec;
use biomapper_core::FieldType;
use biomapper_core::ParamMap;
use biomapper_core::ParamsSchema;
use biomapper_core::Record;

use crate::params::require_str;
use crate::params::str_map;

// ============================================================================
// SECTION: Action
// ============================================================================

/// Action type name of the dataset merge.
pub const MERGE_DATASETS: &str = "MERGE_DATASETS";

/// Two-dataset join on explicit join columns.
#[derive(Debug, Default, Clone, Copy)]
pub struct MergeDatasets;

impl Action for MergeDatasets {
    fn action_type(&self) -> ActionType {
        ActionType::new(MERGE_DATASETS)
    }

    fn parameters_schema(&self) -> ParamsSchema {
        ParamsSchema::new(vec![
            FieldSpec::required("input_key", FieldType::String),
            FieldSpec::required("dataset2_key", FieldType::String),
            FieldSpec::required("join_columns", FieldType::Map),
            FieldSpec::optional("join_type", FieldType::String, Some(serde_json::json!("inner")))
                .with_allowed(&["inner", "left", "right", "outer"]),
            FieldSpec::required("output_key", FieldType::String),
        ])
    }

    fn consumes(&self) -> Vec<String> {
        vec!["datasets".to_string()]
    }

    fn produces(&self) -> Vec<String> {
        vec!["datasets".to_string(), "statistics.one_to_many_stats".to_string()]
    }

    fn execute(
        &self,
        params: &ParamMap,
        ctx: &mut ExecutionContext,
    ) -> Result<ActionOutcome, EngineError> {
        let input_key = require_str(params, "input_key")?;
        let dataset2_key = require_str(params, "dataset2_key")?;
        let join_type = require_str(params, "join_type")?;
        let output_key = require_str(params, "output_key")?;
        let join_columns: BTreeMap<String, String> =
            str_map(params, "join_columns").into_iter().collect();

        let left_column = join_columns.get(&input_key).ok_or_else(|| {
            EngineError::new(
                ErrorKind::JoinColumnUnspecified,
                format!("join_columns does not name a column for dataset {input_key}"),
            )
        })?;
        let right_column = join_columns.get(&dataset2_key).ok_or_else(|| {
            EngineError::new(
                ErrorKind::JoinColumnUnspecified,
                format!("join_columns does not name a column for dataset {dataset2_key}"),
            )
        })?;

        let left = ctx.dataset(&input_key.as_str().into())?.clone();
        let right = ctx.dataset(&dataset2_key.as_str().into())?.clone();
        if !left.has_column(left_column) {
            return Err(EngineError::new(
                ErrorKind::JoinColumnNotFound,
                format!("dataset {input_key} has no column {left_column}"),
            ));
        }
        if !right.has_column(right_column) {
            return Err(EngineError::new(
                ErrorKind::JoinColumnNotFound,
                format!("dataset {dataset2_key} has no column {right_column}"),
            ));
        }

        // Right-side columns keep their names unless they collide.
        let mut right_names: BTreeMap<String, String> = BTreeMap::new();
        for column in right.columns() {
            let name = if left.has_column(column) {
                format!("{dataset2_key}_{column}")
            } else {
                column.clone()
            };
            right_names.insert(column.clone(), name);
        }
        let mut columns: Vec<String> = left.columns().to_vec();
        for column in right.columns() {
            columns.push(right_names[column].clone());
        }

        let mut right_index: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, row) in right.rows().iter().enumerate() {
            if let Some(key) = join_key(row, right_column) {
                right_index.entry(key).or_default().push(index);
            }
        }

        let mut output = Dataset::new(columns);
        let mut matched_right: Vec<bool> = vec![false; right.len()];
        let mut matched_left_rows = 0_u64;
        let mut matched_output_rows = 0_u64;
        for left_row in left.rows() {
            let matches = join_key(left_row, left_column)
                .and_then(|key| right_index.get(&key))
                .cloned()
                .unwrap_or_default();
            if matches.is_empty() {
                if join_type == "left" || join_type == "outer" {
                    output.push_row(combined_row(left_row, None, &right, &right_names))?;
                }
                continue;
            }
            matched_left_rows += 1;
            for right_row_index in matches {
                matched_right[right_row_index] = true;
                matched_output_rows += 1;
                output.push_row(combined_row(
                    left_row,
                    Some(&right.rows()[right_row_index]),
                    &right,
                    &right_names,
                ))?;
            }
        }
        // Matched pairs are shared by every join type; unmatched right rows
        // only appear for right and outer joins.
        if join_type == "right" || join_type == "outer" {
            for (index, right_row) in right.rows().iter().enumerate() {
                if !matched_right[index] {
                    output.push_row(unmatched_right_row(&left, right_row, &right, &right_names))?;
                }
            }
        }

        let expansion_factor = if matched_left_rows == 0 {
            1.0
        } else {
            #[allow(clippy::cast_precision_loss, reason = "row counts are small")]
            {
                matched_output_rows as f64 / matched_left_rows as f64
            }
        };
        ctx.statistics.insert(
            "one_to_many_stats".to_string(),
            serde_json::json!({
                "total_source_records": left.len(),
                "total_mapped_records": matched_output_rows,
                "expansion_factor": expansion_factor,
            }),
        );
        let rows_output = output.len();
        ctx.insert_dataset(output_key.as_str().into(), output)?;
        Ok(ActionOutcome::ok(format!(
            "{join_type} join of {input_key} with {dataset2_key}: {rows_output} rows"
        ))
        .with_metric("rows_left", serde_json::json!(left.len()))
        .with_metric("rows_right", serde_json::json!(right.len()))
        .with_metric("rows_output", serde_json::json!(rows_output))
        .with_metric("expansion_factor", serde_json::json!(expansion_factor))
        .with_output("output_key", serde_json::json!(output_key)))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Extracts a join key from a row; null and empty cells never join.
fn join_key(row: &Record, column: &str) -> Option<String> {
    let cell = row.get(column)?;
    let rendered = cell.render();
    let trimmed = rendered.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Builds a combined output row from a left row and an optional right match.
fn combined_row(
    left_row: &Record,
    right_row: Option<&Record>,
    right: &Dataset,
    right_names: &BTreeMap<String, String>,
) -> Record {
    let mut row = left_row.clone();
    for column in right.columns() {
        let value = right_row
            .and_then(|matched| matched.get(column))
            .cloned()
            .unwrap_or(CellValue::Null);
        row.insert(right_names[column].clone(), value);
    }
    row
}

/// Builds an output row for an unmatched right row (right/outer joins).
fn unmatched_right_row(
    left: &Dataset,
    right_row: &Record,
    right: &Dataset,
    right_names: &BTreeMap<String, String>,
) -> Record {
    let mut row = Record::new();
    for column in left.columns() {
        row.insert(column.clone(), CellValue::Null);
    }
    for column in right.columns() {
        let value = right_row.get(column).cloned().unwrap_or(CellValue::Null);
        row.insert(right_names[column].clone(), value);
    }
    row
}
