// biomapper-actions/src/export.rs
// ============================================================================
// Module: Dataset Export Action
// Description: Writes datasets to delimited files under the job output root.
// Purpose: Produce the on-disk artifacts downstream consumers read.
// Dependencies: biomapper-core, csv
// ============================================================================

//! ## Overview
//! `EXPORT_DATASET` writes a dataset as CSV or TSV beneath the job's
//! output root and records the produced path in `context.output_files`
//! under a purpose key. Paths are confined to the output root; absolute
//! paths and parent traversal are rejected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

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

use crate::params::optional_str;
use crate::params::require_str;

// ============================================================================
// SECTION: Action
// ============================================================================

/// Action type name of the dataset export sink.
pub const EXPORT_DATASET: &str = "EXPORT_DATASET";

/// Delimited file export.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExportDataset;

impl Action for ExportDataset {
    fn action_type(&self) -> ActionType {
        ActionType::new(EXPORT_DATASET)
    }

    fn parameters_schema(&self) -> ParamsSchema {
        ParamsSchema::new(vec![
            FieldSpec::required("input_key", FieldType::String),
            FieldSpec::required("file_path", FieldType::String),
            FieldSpec::optional("format", FieldType::String, None)
                .with_allowed(&["csv", "tsv"]),
            FieldSpec::optional("purpose", FieldType::String, None),
        ])
    }

    fn consumes(&self) -> Vec<String> {
        vec!["datasets".to_string()]
    }

    fn produces(&self) -> Vec<String> {
        vec!["output_files".to_string()]
    }

    fn execute(
        &self,
        params: &ParamMap,
        ctx: &mut ExecutionContext,
    ) -> Result<ActionOutcome, EngineError> {
        let input_key = require_str(params, "input_key")?;
        let file_path = require_str(params, "file_path")?;
        let purpose = optional_str(params, "purpose").unwrap_or_else(|| input_key.clone());
        let delimiter = match optional_str(params, "format").as_deref() {
            Some("tsv") => b'\t',
            Some(_) => b',',
            None => infer_delimiter(&file_path),
        };

        let target = confine_to_output_root(&ctx.output_root, &file_path)?;
        let dataset = ctx.dataset(&input_key.as_str().into())?.clone();

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|err| {
                EngineError::new(
                    ErrorKind::FileWriteFailed,
                    format!("cannot create output directory: {err}"),
                )
            })?;
        }
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(&target)
            .map_err(|err| {
                EngineError::new(
                    ErrorKind::FileWriteFailed,
                    format!("cannot open {}: {err}", target.display()),
                )
            })?;
        writer.write_record(dataset.columns()).map_err(|err| {
            EngineError::new(ErrorKind::FileWriteFailed, format!("write failed: {err}"))
        })?;
        for row in dataset.rows() {
            let rendered: Vec<String> = dataset
                .columns()
                .iter()
                .map(|column| row.get(column).unwrap_or(&CellValue::Null).render())
                .collect();
            writer.write_record(&rendered).map_err(|err| {
                EngineError::new(ErrorKind::FileWriteFailed, format!("write failed: {err}"))
            })?;
        }
        writer.flush().map_err(|err| {
            EngineError::new(ErrorKind::FileWriteFailed, format!("flush failed: {err}"))
        })?;

        ctx.output_files.insert(purpose.clone(), target.clone());
        Ok(ActionOutcome::ok(format!(
            "exported {} rows to {}",
            dataset.len(),
            target.display()
        ))
        .with_metric("rows_written", serde_json::json!(dataset.len()))
        .with_output("path", serde_json::json!(target.display().to_string()))
        .with_output("purpose", serde_json::json!(purpose)))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Infers the delimiter from the file extension.
fn infer_delimiter(file_path: &str) -> u8 {
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

/// Resolves a relative export path beneath the job output root.
fn confine_to_output_root(root: &Path, file_path: &str) -> Result<PathBuf, EngineError> {
    let relative = Path::new(file_path);
    if relative.is_absolute() {
        return Err(EngineError::new(
            ErrorKind::FileWriteFailed,
            format!("export path must be relative to the job output root: {file_path}"),
        ));
    }
    for component in relative.components() {
        if matches!(component, Component::ParentDir) {
            return Err(EngineError::new(
                ErrorKind::FileWriteFailed,
                format!("export path must not traverse upward: {file_path}"),
            ));
        }
    }
    Ok(root.join(relative))
}
