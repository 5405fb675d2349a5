// biomapper-actions/src/load.rs
// ============================================================================
// Module: Dataset Loader Action
// Description: Loads identifier datasets from delimited text files.
// Purpose: Bring external identifier tables into the execution context.
// Dependencies: biomapper-core, csv
// ============================================================================

//! ## Overview
//! `LOAD_DATASET_IDENTIFIERS` reads a delimited file and produces a
//! dataset under `output_key` with the identifier column plus any
//! requested additional columns. The engine never interprets the loaded
//! values; they stay opaque strings. The delimiter follows the file
//! extension unless overridden.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

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

use crate::params::bool_or;
use crate::params::optional_str;
use crate::params::require_str;
use crate::params::str_list;

// ============================================================================
// SECTION: Action
// ============================================================================

/// Action type name of the dataset loader.
pub const LOAD_DATASET_IDENTIFIERS: &str = "LOAD_DATASET_IDENTIFIERS";

/// Loader for delimited identifier files.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoadDatasetIdentifiers;

impl Action for LoadDatasetIdentifiers {
    fn action_type(&self) -> ActionType {
        ActionType::new(LOAD_DATASET_IDENTIFIERS)
    }

    fn parameters_schema(&self) -> ParamsSchema {
        ParamsSchema::new(vec![
            FieldSpec::required("file_path", FieldType::String),
            FieldSpec::required("identifier_column", FieldType::String),
            FieldSpec::required("output_key", FieldType::String),
            FieldSpec::optional("additional_columns", FieldType::StringList, None),
            FieldSpec::optional("drop_empty", FieldType::Boolean, Some(serde_json::json!(true))),
            FieldSpec::optional(
                "strip_whitespace",
                FieldType::Boolean,
                Some(serde_json::json!(true)),
            ),
            FieldSpec::optional(
                "encoding",
                FieldType::String,
                Some(serde_json::json!("utf-8")),
            )
            .with_allowed(&["utf-8"]),
            FieldSpec::optional("delimiter", FieldType::String, None)
                .with_allowed(&["tab", "comma", "semicolon"]),
        ])
    }

    fn produces(&self) -> Vec<String> {
        vec!["datasets".to_string()]
    }

    fn execute(
        &self,
        params: &ParamMap,
        ctx: &mut ExecutionContext,
    ) -> Result<ActionOutcome, EngineError> {
        let file_path = require_str(params, "file_path")?;
        let identifier_column = require_str(params, "identifier_column")?;
        let output_key = require_str(params, "output_key")?;
        let additional_columns = str_list(params, "additional_columns");
        let drop_empty = bool_or(params, "drop_empty", true);
        let strip_whitespace = bool_or(params, "strip_whitespace", true);
        let delimiter = resolve_delimiter(optional_str(params, "delimiter").as_deref(), &file_path);

        let path = Path::new(&file_path);
        if !path.is_file() {
            return Err(EngineError::new(
                ErrorKind::FileNotFound,
                format!("input file not found: {file_path}"),
            ));
        }
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_path(path)
            .map_err(|err| {
                EngineError::new(ErrorKind::FileNotFound, format!("cannot open {file_path}: {err}"))
            })?;

        let headers = reader
            .headers()
            .map_err(|err| {
                EngineError::new(ErrorKind::FileNotFound, format!("cannot read header: {err}"))
            })?
            .clone();
        let header_index = |name: &str| headers.iter().position(|header| header == name);
        let Some(identifier_index) = header_index(&identifier_column) else {
            return Err(EngineError::new(
                ErrorKind::MissingColumn,
                format!("column not found: {identifier_column} (file {file_path})"),
            ));
        };
        let mut extra_indexes = Vec::with_capacity(additional_columns.len());
        for column in &additional_columns {
            let Some(index) = header_index(column) else {
                return Err(EngineError::new(
                    ErrorKind::MissingColumn,
                    format!("column not found: {column} (file {file_path})"),
                ));
            };
            extra_indexes.push((column.clone(), index));
        }

        let mut columns = vec![identifier_column.clone()];
        columns.extend(additional_columns.iter().cloned());
        let mut dataset = Dataset::new(columns);
        let mut rows_dropped = 0_u64;
        for record in reader.records() {
            let record = record.map_err(|err| {
                EngineError::new(ErrorKind::FileNotFound, format!("read error: {err}"))
            })?;
            let raw = record.get(identifier_index).unwrap_or_default();
            let identifier = if strip_whitespace { raw.trim() } else { raw };
            if drop_empty && identifier.is_empty() {
                rows_dropped += 1;
                continue;
            }
            let mut row = Record::new();
            row.insert(identifier_column.clone(), CellValue::text(identifier));
            for (column, index) in &extra_indexes {
                let value = record.get(*index).unwrap_or_default();
                let value = if strip_whitespace { value.trim() } else { value };
                let cell = if value.is_empty() {
                    CellValue::Null
                } else {
                    CellValue::text(value)
                };
                row.insert(column.clone(), cell);
            }
            dataset.push_row(row)?;
        }

        let rows_loaded = dataset.len();
        ctx.insert_dataset(output_key.as_str().into(), dataset)?;
        Ok(ActionOutcome::ok(format!(
            "loaded {rows_loaded} rows from {file_path} into {output_key}"
        ))
        .with_metric("rows_loaded", serde_json::json!(rows_loaded))
        .with_metric("rows_dropped", serde_json::json!(rows_dropped))
        .with_output("output_key", serde_json::json!(output_key)))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the field delimiter from the override or the file extension.
fn resolve_delimiter(delimiter: Option<&str>, file_path: &str) -> u8 {
    match delimiter {
        Some("tab") => b'\t',
        Some("semicolon") => b';',
        Some("comma") => b',',
        _ => {
            if Path::new(file_path)
                .extension()
                .and_then(|extension| extension.to_str())
                .is_some_and(|extension| extension.eq_ignore_ascii_case("tsv"))
            {
                b'\t'
            } else {
                b','
            }
        }
    }
}
