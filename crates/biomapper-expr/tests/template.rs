// biomapper-expr/tests/template.rs
// ============================================================================
// Module: Template Substitution Tests
// Description: `${...}` substitution and condition rewriting tests.
// Purpose: Pin lazy substitution, type preservation, and validation walks.
// Dependencies: biomapper-expr
// ============================================================================
//! ## Overview
//! Validates template scanning, whole-span type preservation, JSON tree
//! substitution, and the condition rewrite that inlines spans as
//! sub-expressions.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;

use biomapper_expr::ExprError;
use biomapper_expr::ExprValue;
use biomapper_expr::Scope;
use biomapper_expr::evaluate_condition;
use biomapper_expr::substitute;
use biomapper_expr::substitute_json;
use biomapper_expr::validate;
use serde_json::json;

/// Scope with fixed bindings for template tests.
struct FixtureScope;

impl Scope for FixtureScope {
    fn resolve_root(&self, root: &str) -> Result<Option<ExprValue>, ExprError> {
        match root {
            "parameters" => {
                let mut map = BTreeMap::new();
                map.insert("output_key".to_string(), ExprValue::Str("merged".to_string()));
                map.insert("limit".to_string(), ExprValue::Int(500));
                Ok(Some(ExprValue::Map(map)))
            }
            "steps" => {
                let mut metrics = BTreeMap::new();
                metrics.insert("match_rate".to_string(), ExprValue::Float(0.4));
                let mut baseline = BTreeMap::new();
                baseline.insert("metrics".to_string(), ExprValue::Map(metrics));
                let mut steps = BTreeMap::new();
                steps.insert("baseline".to_string(), ExprValue::Map(baseline));
                Ok(Some(ExprValue::Map(steps)))
            }
            "foreach" => {
                let mut map = BTreeMap::new();
                map.insert("index".to_string(), ExprValue::Int(2));
                map.insert("item".to_string(), ExprValue::Str("hpa".to_string()));
                Ok(Some(ExprValue::Map(map)))
            }
            _ => Ok(None),
        }
    }
}

// ============================================================================
// SECTION: String Substitution
// ============================================================================

/// Verifies a whole-span string preserves the evaluated type.
#[test]
fn whole_span_preserves_type() {
    let value = substitute("${parameters.limit}", &FixtureScope).unwrap();
    assert_eq!(value, ExprValue::Int(500));
}

/// Verifies mixed text renders spans and concatenates.
#[test]
fn mixed_text_concatenates() {
    let value = substitute("${parameters.output_key}_${foreach.index}", &FixtureScope).unwrap();
    assert_eq!(value, ExprValue::Str("merged_2".to_string()));
}

/// Verifies text without spans passes through verbatim.
#[test]
fn plain_text_passthrough() {
    let value = substitute("uniprot", &FixtureScope).unwrap();
    assert_eq!(value, ExprValue::Str("uniprot".to_string()));
}

/// Verifies an unterminated span is rejected with its position.
#[test]
fn unterminated_span_rejected() {
    let error = substitute("prefix ${parameters.limit", &FixtureScope).unwrap_err();
    assert_eq!(error, ExprError::Unterminated { position: 7 });
}

/// Verifies a brace inside a quoted string does not close the span.
#[test]
fn quoted_brace_inside_span() {
    let value = substitute("${'a}b'}", &FixtureScope).unwrap();
    assert_eq!(value, ExprValue::Str("a}b".to_string()));
}

// ============================================================================
// SECTION: JSON Substitution
// ============================================================================

/// Verifies substitution recurses through params trees and changes types
/// for whole-span strings.
#[test]
fn json_tree_substitution() {
    let params = json!({
        "input_key": "${parameters.output_key}",
        "limit": "${parameters.limit}",
        "columns": ["uniprot", "${foreach.item}"],
    });
    let substituted = substitute_json(&params, &FixtureScope).unwrap();
    assert_eq!(
        substituted,
        json!({
            "input_key": "merged",
            "limit": 500,
            "columns": ["uniprot", "hpa"],
        })
    );
}

// ============================================================================
// SECTION: Conditions
// ============================================================================

/// Verifies the span-plus-operator condition form from strategies.
#[test]
fn condition_with_trailing_operator() {
    assert!(evaluate_condition(
        "${steps.baseline.metrics.match_rate} < 0.5",
        &FixtureScope
    )
    .unwrap());
    assert!(!evaluate_condition(
        "${steps.baseline.metrics.match_rate} >= 0.5",
        &FixtureScope
    )
    .unwrap());
}

/// Verifies bare conditions evaluate without template wrappers.
#[test]
fn condition_bare_expression() {
    assert!(evaluate_condition("parameters.limit == 500", &FixtureScope).unwrap());
}

/// Verifies non-boolean conditions are rejected.
#[test]
fn condition_requires_boolean() {
    assert!(matches!(
        evaluate_condition("${parameters.limit}", &FixtureScope).unwrap_err(),
        ExprError::TypeMismatch { .. }
    ));
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Verifies parse-only validation enumerates reference paths.
#[test]
fn validation_collects_references() {
    let references =
        validate("${steps.baseline.metrics.match_rate} and ${parameters.limit}").unwrap();
    let dotted: Vec<String> = references.iter().map(biomapper_expr::ReferencePath::dotted).collect();
    assert_eq!(
        dotted,
        vec!["steps.baseline.metrics.match_rate".to_string(), "parameters.limit".to_string()]
    );
}

/// Verifies validation rejects malformed spans without evaluating.
#[test]
fn validation_rejects_bad_syntax() {
    assert!(validate("${parameters.}").is_err());
}
