// biomapper-core/src/schema.rs
// ============================================================================
// Module: Biomapper Parameter Schemas
// Description: First-class parameter schemas for typed actions.
// Purpose: Validate action parameters generically, without reflection.
// Dependencies: crate::core::error, serde
// ============================================================================

//! ## Overview
//! Parameter schemas are plain data: a field list with names, types,
//! required flags, defaults, enum restrictions, and numeric ranges. The
//! executor validates substituted parameters against the schema before an
//! action runs; every violation is a `PARAM_VALIDATION_ERROR` attributed to
//! the step. Validation is strict — undeclared parameters are rejected so
//! typos fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::error::EngineError;
use crate::core::error::ErrorKind;

// ============================================================================
// SECTION: Field Types
// ============================================================================

/// Accepted parameter field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// UTF-8 string.
    String,
    /// Signed integer.
    Integer,
    /// Floating-point number (integers accepted).
    Float,
    /// Boolean flag.
    Boolean,
    /// List of strings.
    StringList,
    /// String-keyed object.
    Map,
    /// Any JSON value, passed through unchecked.
    Value,
}

impl FieldType {
    /// Returns the lowercase label used in error messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::StringList => "string list",
            Self::Map => "map",
            Self::Value => "value",
        }
    }

    /// Returns true when the JSON value satisfies this type.
    #[must_use]
    pub fn accepts(self, value: &serde_json::Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(serde_json::Value::is_string)),
            Self::Map => value.is_object(),
            Self::Value => true,
        }
    }
}

// ============================================================================
// SECTION: Field Specification
// ============================================================================

/// Specification of one parameter field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name.
    pub name: String,
    /// Accepted type.
    pub field_type: FieldType,
    /// True when the field must be provided.
    pub required: bool,
    /// Default applied when the field is absent.
    pub default: Option<serde_json::Value>,
    /// Enum restriction for string fields.
    pub allowed: Option<Vec<String>>,
    /// Inclusive numeric minimum.
    pub min: Option<f64>,
    /// Inclusive numeric maximum.
    pub max: Option<f64>,
}

impl FieldSpec {
    /// Creates a required field.
    #[must_use]
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            default: None,
            allowed: None,
            min: None,
            max: None,
        }
    }

    /// Creates an optional field with an optional default.
    #[must_use]
    pub fn optional(
        name: impl Into<String>,
        field_type: FieldType,
        default: Option<serde_json::Value>,
    ) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            default,
            allowed: None,
            min: None,
            max: None,
        }
    }

    /// Restricts a string field to an enumerated value set.
    #[must_use]
    pub fn with_allowed(mut self, allowed: &[&str]) -> Self {
        self.allowed = Some(allowed.iter().map(ToString::to_string).collect());
        self
    }

    /// Restricts a numeric field to an inclusive range.
    #[must_use]
    pub const fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }
}

// ============================================================================
// SECTION: Parameter Schema
// ============================================================================

/// Parameter schema for one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ParamsSchema {
    /// Declared fields in declaration order.
    pub fields: Vec<FieldSpec>,
}

impl ParamsSchema {
    /// Creates a schema from field specifications.
    #[must_use]
    pub const fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Validates raw parameters, applying defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`ErrorKind::ParamValidation`] error on missing required
    /// fields, type mismatches, enum violations, range violations, or
    /// undeclared parameters.
    pub fn validate(
        &self,
        params: &BTreeMap<String, serde_json::Value>,
    ) -> Result<BTreeMap<String, serde_json::Value>, EngineError> {
        for name in params.keys() {
            if !self.fields.iter().any(|field| field.name == *name) {
                return Err(param_error(format!("undeclared parameter: {name}")));
            }
        }
        let mut validated = BTreeMap::new();
        for field in &self.fields {
            let value = match params.get(&field.name) {
                Some(value) if !value.is_null() => value.clone(),
                _ => match &field.default {
                    Some(default) => default.clone(),
                    None if field.required => {
                        return Err(param_error(format!(
                            "missing required parameter: {}",
                            field.name
                        )));
                    }
                    None => continue,
                },
            };
            validate_field(field, &value)?;
            validated.insert(field.name.clone(), value);
        }
        Ok(validated)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a parameter validation error.
fn param_error(message: impl Into<String>) -> EngineError {
    EngineError::new(ErrorKind::ParamValidation, message)
}

/// Validates one field value against its specification.
fn validate_field(field: &FieldSpec, value: &serde_json::Value) -> Result<(), EngineError> {
    if !field.field_type.accepts(value) {
        return Err(param_error(format!(
            "parameter {} must be a {}, found {value}",
            field.name,
            field.field_type.label()
        )));
    }
    if let Some(allowed) = &field.allowed {
        let Some(text) = value.as_str() else {
            return Err(param_error(format!(
                "parameter {} carries an enum restriction but is not a string",
                field.name
            )));
        };
        if !allowed.iter().any(|candidate| candidate == text) {
            return Err(param_error(format!(
                "parameter {} must be one of [{}], found {text:?}",
                field.name,
                allowed.join(", ")
            )));
        }
    }
    if field.min.is_some() || field.max.is_some() {
        let Some(number) = value.as_f64() else {
            return Err(param_error(format!(
                "parameter {} carries a range restriction but is not numeric",
                field.name
            )));
        };
        if let Some(min) = field.min {
            if number < min {
                return Err(param_error(format!(
                    "parameter {} must be >= {min}, found {number}",
                    field.name
                )));
            }
        }
        if let Some(max) = field.max {
            if number > max {
                return Err(param_error(format!(
                    "parameter {} must be <= {max}, found {number}",
                    field.name
                )));
            }
        }
    }
    Ok(())
}
