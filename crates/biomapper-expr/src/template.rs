// biomapper-expr/src/template.rs
// ============================================================================
// Module: Template Substitution
// Description: `${...}` substitution over strings and JSON trees.
// Purpose: Resolve embedded expressions lazily against a scope.
// Dependencies: crate::{ast, error, eval, parser}
// ============================================================================

//! ## Overview
//! Any string value flowing through a strategy may embed `${...}`
//! expressions. A string that consists of exactly one span evaluates to the
//! expression's typed value; any other shape renders each span to text and
//! concatenates. [`validate`] parses spans without evaluating, returning
//! the reference paths they mention, which is how strategy loading checks
//! expressions against structurally possible targets.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::ast::Expr;
use crate::ast::ReferencePath;
use crate::error::ExprError;
use crate::eval::Scope;
use crate::eval::evaluate;
use crate::parser::parse;
use crate::value::ExprValue;

// ============================================================================
// SECTION: Span Scanning
// ============================================================================

/// One `${...}` span located in a template string.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Span {
    /// Byte offset of the `$` of `${`.
    start: usize,
    /// Byte offset just past the closing `}`.
    end: usize,
    /// Byte range of the inner expression text.
    inner: (usize, usize),
}

/// Scans a string for `${...}` spans, honoring quoted strings inside spans.
fn scan_spans(input: &str) -> Result<Vec<Span>, ExprError> {
    let bytes = input.as_bytes();
    let mut spans = Vec::new();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'$' && bytes.get(index + 1) == Some(&b'{') {
            let inner_start = index + 2;
            let mut cursor = inner_start;
            let mut quote: Option<u8> = None;
            let mut closed = false;
            while cursor < bytes.len() {
                let byte = bytes[cursor];
                match quote {
                    Some(open) => {
                        if byte == b'\\' {
                            cursor += 1;
                        } else if byte == open {
                            quote = None;
                        }
                    }
                    None => {
                        if byte == b'\'' || byte == b'"' {
                            quote = Some(byte);
                        } else if byte == b'}' {
                            spans.push(Span {
                                start: index,
                                end: cursor + 1,
                                inner: (inner_start, cursor),
                            });
                            index = cursor;
                            closed = true;
                            break;
                        }
                    }
                }
                cursor += 1;
            }
            if !closed {
                return Err(ExprError::Unterminated { position: index });
            }
        }
        index += 1;
    }
    Ok(spans)
}

/// Returns true when the string contains at least one `${...}` span.
#[must_use]
pub fn contains_expression(input: &str) -> bool {
    scan_spans(input).map(|spans| !spans.is_empty()).unwrap_or(true)
}

// ============================================================================
// SECTION: Substitution
// ============================================================================

/// Substitutes every `${...}` span in a string against the scope.
///
/// A string that is exactly one span preserves the evaluated type;
/// otherwise spans render to text and concatenate with the literal
/// fragments.
///
/// # Errors
///
/// Returns [`ExprError`] when a span fails to parse or evaluate.
pub fn substitute(input: &str, scope: &dyn Scope) -> Result<ExprValue, ExprError> {
    let spans = scan_spans(input)?;
    if spans.is_empty() {
        return Ok(ExprValue::Str(input.to_string()));
    }
    if let [only] = spans.as_slice() {
        if only.start == 0 && only.end == input.len() {
            let expr = parse(&input[only.inner.0..only.inner.1])?;
            return evaluate(&expr, scope);
        }
    }
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0;
    for span in &spans {
        out.push_str(&input[cursor..span.start]);
        let expr = parse(&input[span.inner.0..span.inner.1])?;
        out.push_str(&evaluate(&expr, scope)?.render());
        cursor = span.end;
    }
    out.push_str(&input[cursor..]);
    Ok(ExprValue::Str(out))
}

/// Substitutes expressions through an entire JSON tree.
///
/// Strings are substituted (a whole-span string may change type); arrays
/// and objects recurse; all other values pass through untouched.
///
/// # Errors
///
/// Returns [`ExprError`] when any embedded span fails.
pub fn substitute_json(
    value: &serde_json::Value,
    scope: &dyn Scope,
) -> Result<serde_json::Value, ExprError> {
    match value {
        serde_json::Value::String(text) => Ok(substitute(text, scope)?.to_json()),
        serde_json::Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(substitute_json(item, scope)?);
            }
            Ok(serde_json::Value::Array(out))
        }
        serde_json::Value::Object(entries) => {
            let mut out = serde_json::Map::with_capacity(entries.len());
            for (key, item) in entries {
                out.insert(key.clone(), substitute_json(item, scope)?);
            }
            Ok(serde_json::Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Parses every span in a template without evaluating.
///
/// Returns the reference paths mentioned across all spans so loaders can
/// check them against structurally possible targets.
///
/// # Errors
///
/// Returns [`ExprError`] when a span fails to lex or parse.
pub fn validate(input: &str) -> Result<Vec<ReferencePath>, ExprError> {
    let spans = scan_spans(input)?;
    let mut references = Vec::new();
    for span in &spans {
        let expr = parse(&input[span.inner.0..span.inner.1])?;
        references.extend(expr.references());
    }
    Ok(references)
}

// ============================================================================
// SECTION: Conditions
// ============================================================================

/// Rewrites a condition string into one parseable expression.
///
/// Conditions mix template spans with surrounding operators, as in
/// `${steps.baseline.metrics.match_rate} < 0.5`. Each span inlines as a
/// parenthesized sub-expression; a condition without spans parses as a bare
/// expression.
fn rewrite_condition(input: &str) -> Result<String, ExprError> {
    let spans = scan_spans(input)?;
    if spans.is_empty() {
        return Ok(input.to_string());
    }
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0;
    for span in &spans {
        out.push_str(&input[cursor..span.start]);
        out.push('(');
        out.push_str(&input[span.inner.0..span.inner.1]);
        out.push(')');
        cursor = span.end;
    }
    out.push_str(&input[cursor..]);
    Ok(out)
}

/// Parses a condition string into an expression tree without evaluating.
///
/// # Errors
///
/// Returns [`ExprError`] when the condition does not parse.
pub fn parse_condition(input: &str) -> Result<Expr, ExprError> {
    parse(&rewrite_condition(input)?)
}

/// Evaluates a condition string to a boolean.
///
/// # Errors
///
/// Returns [`ExprError`] when the condition fails to parse, fails to
/// evaluate, or does not produce a boolean.
pub fn evaluate_condition(input: &str, scope: &dyn Scope) -> Result<bool, ExprError> {
    let expr = parse_condition(input)?;
    evaluate(&expr, scope)?.as_bool()
}

/// Validates a JSON tree, collecting references from every string value.
///
/// # Errors
///
/// Returns [`ExprError`] when any embedded span fails to parse.
pub fn validate_json(value: &serde_json::Value) -> Result<Vec<ReferencePath>, ExprError> {
    let mut references = Vec::new();
    collect_json(value, &mut references)?;
    Ok(references)
}

/// Walks a JSON tree collecting reference paths from strings.
fn collect_json(
    value: &serde_json::Value,
    references: &mut Vec<ReferencePath>,
) -> Result<(), ExprError> {
    match value {
        serde_json::Value::String(text) => {
            references.extend(validate(text)?);
            Ok(())
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_json(item, references)?;
            }
            Ok(())
        }
        serde_json::Value::Object(entries) => {
            for item in entries.values() {
                collect_json(item, references)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
