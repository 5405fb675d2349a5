// biomapper-actions/src/params.rs
// ============================================================================
// Module: Validated Parameter Access
// Description: Typed readers over schema-validated parameter maps.
// Purpose: Keep action bodies free of repetitive JSON unpacking.
// Dependencies: biomapper-core, serde_json
// ============================================================================

//! ## Overview
//! Actions receive parameters that already passed schema validation, so a
//! missing or mistyped field at this layer is an internal error, not a
//! user-facing validation failure.

// ============================================================================
// SECTION: Imports
// ============================================================================

use biomapper_core::EngineError;
use biomapper_core::ParamMap;

// ============================================================================
// SECTION: Readers
// ============================================================================

/// Reads a required string parameter.
///
/// # Errors
///
/// Returns an internal error when the field is absent or mistyped.
pub fn require_str(params: &ParamMap, name: &str) -> Result<String, EngineError> {
    params
        .get(name)
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| EngineError::internal(format!("validated parameter missing: {name}")))
}

/// Reads an optional string parameter.
#[must_use]
pub fn optional_str(params: &ParamMap, name: &str) -> Option<String> {
    params.get(name).and_then(serde_json::Value::as_str).map(ToString::to_string)
}

/// Reads a boolean parameter with a default.
#[must_use]
pub fn bool_or(params: &ParamMap, name: &str, default: bool) -> bool {
    params.get(name).and_then(serde_json::Value::as_bool).unwrap_or(default)
}

/// Reads a float parameter with a default.
#[must_use]
#[allow(dead_code, reason = "public params helper not yet called by any action in this crate")]
pub fn f64_or(params: &ParamMap, name: &str, default: f64) -> f64 {
    params.get(name).and_then(serde_json::Value::as_f64).unwrap_or(default)
}

/// Reads an optional float parameter.
#[must_use]
pub fn optional_f64(params: &ParamMap, name: &str) -> Option<f64> {
    params.get(name).and_then(serde_json::Value::as_f64)
}

/// Reads a string-list parameter, empty when absent.
#[must_use]
pub fn str_list(params: &ParamMap, name: &str) -> Vec<String> {
    params
        .get(name)
        .and_then(serde_json::Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(serde_json::Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Reads a string-to-string map parameter, empty when absent.
#[must_use]
pub fn str_map(params: &ParamMap, name: &str) -> Vec<(String, String)> {
    params
        .get(name)
        .and_then(serde_json::Value::as_object)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|(key, value)| {
                    value.as_str().map(|text| (key.clone(), text.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}
