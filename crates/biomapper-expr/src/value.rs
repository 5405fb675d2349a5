// biomapper-expr/src/value.rs
// ============================================================================
// Module: Expression Values
// Description: Runtime value model for expression evaluation.
// Purpose: Provide strict typed values with explicit JSON conversions.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Expression evaluation operates on a small closed value model. Integers
//! and floats are kept distinct so integer arithmetic stays exact; mixed
//! numeric operations promote to float. Conversions to and from
//! [`serde_json::Value`] are total in one direction (every expression value
//! has a JSON form) and lossy-checked in the other (JSON numbers outside
//! `i64`/`f64` range are rejected upstream by `serde_json` itself).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ExprError;

// ============================================================================
// SECTION: Value Model
// ============================================================================

/// Runtime value produced and consumed by expression evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue {
    /// Absent value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// String value.
    Str(String),
    /// Ordered list of values.
    List(Vec<ExprValue>),
    /// String-keyed map of values with deterministic ordering.
    Map(BTreeMap<String, ExprValue>),
}

impl ExprValue {
    /// Returns the type name used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Returns true when the value is `Null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the boolean payload or a type mismatch error.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError::TypeMismatch`] when the value is not a boolean.
    pub fn as_bool(&self) -> Result<bool, ExprError> {
        match self {
            Self::Bool(value) => Ok(*value),
            other => Err(ExprError::TypeMismatch {
                message: format!("expected boolean, found {}", other.type_name()),
            }),
        }
    }

    /// Converts a JSON value into an expression value.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(value) => Self::Bool(*value),
            serde_json::Value::Number(number) => number.as_i64().map_or_else(
                || Self::Float(number.as_f64().unwrap_or(f64::NAN)),
                Self::Int,
            ),
            serde_json::Value::String(value) => Self::Str(value.clone()),
            serde_json::Value::Array(values) => {
                Self::List(values.iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(entries) => Self::Map(
                entries.iter().map(|(key, value)| (key.clone(), Self::from_json(value))).collect(),
            ),
        }
    }

    /// Converts the expression value into a JSON value.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(value) => serde_json::Value::Bool(*value),
            Self::Int(value) => serde_json::Value::Number(serde_json::Number::from(*value)),
            Self::Float(value) => serde_json::Number::from_f64(*value)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Str(value) => serde_json::Value::String(value.clone()),
            Self::List(values) => {
                serde_json::Value::Array(values.iter().map(Self::to_json).collect())
            }
            Self::Map(entries) => serde_json::Value::Object(
                entries.iter().map(|(key, value)| (key.clone(), value.to_json())).collect(),
            ),
        }
    }

    /// Renders the value as template output text.
    ///
    /// Strings render verbatim, `Null` renders empty, and structured values
    /// render as compact JSON.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(value) => value.to_string(),
            Self::Int(value) => value.to_string(),
            Self::Float(value) => format_float(*value),
            Self::Str(value) => value.clone(),
            Self::List(_) | Self::Map(_) => self.to_json().to_string(),
        }
    }
}

impl fmt::Display for ExprValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

// ============================================================================
// SECTION: Numeric Helpers
// ============================================================================

/// Numeric view used by arithmetic and ordering operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    /// Exact integer operand.
    Int(i64),
    /// Floating-point operand.
    Float(f64),
}

impl Numeric {
    /// Extracts a numeric view from an expression value.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError::TypeMismatch`] for non-numeric values. Mixing
    /// strings and numbers in comparisons fails fast by design.
    pub fn try_from_value(value: &ExprValue) -> Result<Self, ExprError> {
        match value {
            ExprValue::Int(value) => Ok(Self::Int(*value)),
            ExprValue::Float(value) => Ok(Self::Float(*value)),
            other => Err(ExprError::TypeMismatch {
                message: format!("expected number, found {}", other.type_name()),
            }),
        }
    }

    /// Returns the operand widened to `f64`.
    #[must_use]
    pub const fn as_f64(self) -> f64 {
        match self {
            Self::Int(value) => value as f64,
            Self::Float(value) => value,
        }
    }
}

/// Compares two numeric operands, widening to float when mixed.
#[must_use]
pub fn numeric_cmp(left: Numeric, right: Numeric) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Numeric::Int(left), Numeric::Int(right)) => Some(left.cmp(&right)),
        _ => left.as_f64().partial_cmp(&right.as_f64()),
    }
}

/// Tests numeric equality across the integer/float divide.
#[must_use]
pub fn numeric_eq(left: Numeric, right: Numeric) -> bool {
    numeric_cmp(left, right) == Some(std::cmp::Ordering::Equal)
}

/// Formats a float without trailing noise for template rendering.
fn format_float(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}
