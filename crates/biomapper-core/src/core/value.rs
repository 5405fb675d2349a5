// biomapper-core/src/core/value.rs
// ============================================================================
// Module: Biomapper Cell Values
// Description: The closed value model for dataset cells.
// Purpose: Represent dataset cells with deterministic JSON and text forms.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Dataset cells hold one of four shapes: null, text, number, or a list of
//! strings. The engine never interprets cell contents; entity-specific
//! actions may. Text is stored trimmed by loaders; case is preserved unless
//! an action normalizes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Cell Value
// ============================================================================

/// One dataset cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum CellValue {
    /// Absent value.
    #[default]
    Null,
    /// Opaque text value.
    Text(String),
    /// Numeric value.
    Number(f64),
    /// List of strings, typically produced by multi-valued columns.
    List(Vec<String>),
}

impl CellValue {
    /// Creates a text cell from any string-like value.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Returns true when the cell is null or empty text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(value) => value.is_empty(),
            Self::Number(_) => false,
            Self::List(values) => values.is_empty(),
        }
    }

    /// Returns the text payload when the cell is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the numeric payload when the cell is a number.
    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Renders the cell for delimited export and join keys.
    ///
    /// Null renders empty, text renders verbatim, integral numbers render
    /// without a fraction, and lists render as compact JSON.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Text(value) => value.clone(),
            Self::Number(value) => {
                if value.fract() == 0.0 && value.is_finite() && value.abs() < 1e15 {
                    format!("{value:.0}")
                } else {
                    value.to_string()
                }
            }
            Self::List(values) => {
                serde_json::to_string(values).unwrap_or_default()
            }
        }
    }

    /// Converts the cell into a JSON value.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Text(value) => serde_json::Value::String(value.clone()),
            Self::Number(value) => serde_json::Number::from_f64(*value)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::List(values) => serde_json::Value::Array(
                values.iter().map(|item| serde_json::Value::String(item.clone())).collect(),
            ),
        }
    }

    /// Converts a JSON value into a cell, flattening unsupported shapes to
    /// text.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::String(text) => Self::Text(text.clone()),
            serde_json::Value::Number(number) => {
                Self::Number(number.as_f64().unwrap_or(f64::NAN))
            }
            serde_json::Value::Bool(flag) => Self::Text(flag.to_string()),
            serde_json::Value::Array(items) => Self::List(
                items
                    .iter()
                    .map(|item| match item {
                        serde_json::Value::String(text) => text.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            other @ serde_json::Value::Object(_) => Self::Text(other.to_string()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}
