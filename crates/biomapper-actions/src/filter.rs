// biomapper-actions/src/filter.rs
// ============================================================================
// Module: Dataset Filter Action
// Description: Keeps or removes rows by a column predicate.
// Purpose: Provide the pure row-filter transformer over datasets.
// Dependencies: biomapper-core, regex
// ============================================================================

//! ## Overview
//! `FILTER_DATASET` evaluates one predicate (equals, contains, regex,
//! range, or in-list) against a named column and keeps or removes the
//! matching rows. The action is pure: it reads one dataset and produces a
//! new one under a new key.

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
use regex::Regex;

use crate::params::bool_or;
use crate::params::optional_f64;
use crate::params::optional_str;
use crate::params::require_str;
use crate::params::str_list;

// ============================================================================
// SECTION: Action
// ============================================================================

/// Action type name of the dataset filter.
pub const FILTER_DATASET: &str = "FILTER_DATASET";

/// Row filter over one column.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilterDataset;

impl Action for FilterDataset {
    fn action_type(&self) -> ActionType {
        ActionType::new(FILTER_DATASET)
    }

    fn parameters_schema(&self) -> ParamsSchema {
        ParamsSchema::new(vec![
            FieldSpec::required("input_key", FieldType::String),
            FieldSpec::required("output_key", FieldType::String),
            FieldSpec::required("column", FieldType::String),
            FieldSpec::required("operator", FieldType::String)
                .with_allowed(&["equals", "not_equals", "contains", "regex", "range", "in_list"]),
            FieldSpec::optional("value", FieldType::String, None),
            FieldSpec::optional("values", FieldType::StringList, None),
            FieldSpec::optional("min", FieldType::Float, None),
            FieldSpec::optional("max", FieldType::Float, None),
            FieldSpec::optional("mode", FieldType::String, Some(serde_json::json!("keep")))
                .with_allowed(&["keep", "remove"]),
            FieldSpec::optional(
                "case_sensitive",
                FieldType::Boolean,
                Some(serde_json::json!(true)),
            ),
        ])
    }

    fn consumes(&self) -> Vec<String> {
        vec!["datasets".to_string()]
    }

    fn produces(&self) -> Vec<String> {
        vec!["datasets".to_string()]
    }

    fn execute(
        &self,
        params: &ParamMap,
        ctx: &mut ExecutionContext,
    ) -> Result<ActionOutcome, EngineError> {
        let input_key = require_str(params, "input_key")?;
        let output_key = require_str(params, "output_key")?;
        let column = require_str(params, "column")?;
        let operator = require_str(params, "operator")?;
        let keep = require_str(params, "mode")? == "keep";
        let case_sensitive = bool_or(params, "case_sensitive", true);

        let predicate = build_predicate(&operator, params, case_sensitive)?;
        let input = ctx.dataset(&input_key.as_str().into())?.clone();
        input.require_column(&column)?;

        let rows = input
            .rows()
            .iter()
            .filter(|row| {
                let cell = row.get(&column).unwrap_or(&CellValue::Null);
                predicate.matches(cell) == keep
            })
            .cloned()
            .collect();
        let output = input.with_rows(rows);
        let rows_in = input.len();
        let rows_out = output.len();
        ctx.insert_dataset(output_key.as_str().into(), output)?;
        Ok(ActionOutcome::ok(format!(
            "filtered {input_key}: kept {rows_out} of {rows_in} rows"
        ))
        .with_metric("rows_in", serde_json::json!(rows_in))
        .with_metric("rows_out", serde_json::json!(rows_out))
        .with_output("output_key", serde_json::json!(output_key)))
    }
}

// ============================================================================
// SECTION: Predicates
// ============================================================================

/// Compiled row predicate.
enum Predicate {
    /// Exact equality on the rendered cell.
    Equals {
        /// Expected value.
        value: String,
        /// Case sensitivity flag.
        case_sensitive: bool,
        /// True to invert the match.
        negate: bool,
    },
    /// Substring containment on the rendered cell.
    Contains {
        /// Needle to search for.
        value: String,
        /// Case sensitivity flag.
        case_sensitive: bool,
    },
    /// Regular-expression match on the rendered cell.
    Matches {
        /// Compiled pattern.
        pattern: Regex,
    },
    /// Inclusive numeric range on numeric cells.
    Range {
        /// Inclusive lower bound.
        min: Option<f64>,
        /// Inclusive upper bound.
        max: Option<f64>,
    },
    /// Membership in an explicit value list.
    InList {
        /// Accepted values.
        values: Vec<String>,
        /// Case sensitivity flag.
        case_sensitive: bool,
    },
}

impl Predicate {
    /// Evaluates the predicate against one cell.
    fn matches(&self, cell: &CellValue) -> bool {
        match self {
            Self::Equals { value, case_sensitive, negate } => {
                let rendered = cell.render();
                let equal = if *case_sensitive {
                    rendered == *value
                } else {
                    rendered.eq_ignore_ascii_case(value)
                };
                equal != *negate
            }
            Self::Contains { value, case_sensitive } => {
                let rendered = cell.render();
                if *case_sensitive {
                    rendered.contains(value.as_str())
                } else {
                    rendered.to_ascii_lowercase().contains(&value.to_ascii_lowercase())
                }
            }
            Self::Matches { pattern } => pattern.is_match(&cell.render()),
            Self::Range { min, max } => {
                let number = match cell {
                    CellValue::Number(value) => Some(*value),
                    CellValue::Text(text) => text.trim().parse::<f64>().ok(),
                    _ => None,
                };
                let Some(number) = number else {
                    return false;
                };
                min.is_none_or(|min| number >= min) && max.is_none_or(|max| number <= max)
            }
            Self::InList { values, case_sensitive } => {
                let rendered = cell.render();
                if *case_sensitive {
                    values.iter().any(|candidate| *candidate == rendered)
                } else {
                    values.iter().any(|candidate| candidate.eq_ignore_ascii_case(&rendered))
                }
            }
        }
    }
}

/// Builds the predicate from validated parameters.
fn build_predicate(
    operator: &str,
    params: &ParamMap,
    case_sensitive: bool,
) -> Result<Predicate, EngineError> {
    let value = optional_str(params, "value");
    match operator {
        "equals" | "not_equals" => {
            let value = value.ok_or_else(|| missing_param(operator, "value"))?;
            Ok(Predicate::Equals {
                value,
                case_sensitive,
                negate: operator == "not_equals",
            })
        }
        "contains" => {
            let value = value.ok_or_else(|| missing_param(operator, "value"))?;
            Ok(Predicate::Contains { value, case_sensitive })
        }
        "regex" => {
            let value = value.ok_or_else(|| missing_param(operator, "value"))?;
            let pattern = Regex::new(&value).map_err(|err| {
                EngineError::new(
                    ErrorKind::ParamValidation,
                    format!("invalid regex pattern: {err}"),
                )
            })?;
            Ok(Predicate::Matches { pattern })
        }
        "range" => {
            let min = optional_f64(params, "min");
            let max = optional_f64(params, "max");
            if min.is_none() && max.is_none() {
                return Err(EngineError::new(
                    ErrorKind::ParamValidation,
                    "range filter requires min and/or max",
                ));
            }
            Ok(Predicate::Range { min, max })
        }
        "in_list" => {
            let values = str_list(params, "values");
            if values.is_empty() {
                return Err(missing_param(operator, "values"));
            }
            Ok(Predicate::InList { values, case_sensitive })
        }
        other => Err(EngineError::new(
            ErrorKind::ParamValidation,
            format!("unsupported operator: {other}"),
        )),
    }
}

/// Builds the missing-parameter error for an operator.
fn missing_param(operator: &str, name: &str) -> EngineError {
    EngineError::new(
        ErrorKind::ParamValidation,
        format!("operator {operator} requires parameter {name}"),
    )
}
