// biomapper-expr/src/tests.rs
// ============================================================================
// Module: Expression Unit Tests
// Description: Lexer and parser unit tests.
// Purpose: Pin token shapes and parse trees for the closed operator set.
// Dependencies: crate
// ============================================================================

//! ## Overview
//! Unit tests for the lexer and parser. Evaluation and template behavior
//! are covered by the integration tests under `tests/`.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    reason = "Test-only panic-based assertions are permitted."
)]

use crate::ast::BinaryOp;
use crate::ast::Expr;
use crate::error::ExprError;
use crate::parser::parse;
use crate::token::TokenKind;
use crate::token::tokenize;
use crate::value::ExprValue;

// ============================================================================
// SECTION: Lexer
// ============================================================================

/// Verifies operator tokens including the two-character forms.
#[test]
fn tokenize_operators() {
    let tokens = tokenize("<= >= == != :- ? :").unwrap();
    let kinds: Vec<TokenKind> = tokens.into_iter().map(|token| token.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::LtEq,
            TokenKind::GtEq,
            TokenKind::EqEq,
            TokenKind::NotEq,
            TokenKind::ColonDash,
            TokenKind::Question,
            TokenKind::Colon,
        ]
    );
}

/// Verifies number literal lexing splits integers from floats.
#[test]
fn tokenize_numbers() {
    let tokens = tokenize("42 0.85").unwrap();
    assert_eq!(tokens[0].kind, TokenKind::Int(42));
    assert_eq!(tokens[1].kind, TokenKind::Float(0.85));
}

/// Verifies string literals support both quote styles and escapes.
#[test]
fn tokenize_strings() {
    let tokens = tokenize(r#"'abc' "d\"e""#).unwrap();
    assert_eq!(tokens[0].kind, TokenKind::Str("abc".to_string()));
    assert_eq!(tokens[1].kind, TokenKind::Str("d\"e".to_string()));
}

/// Verifies a bare `=` is rejected with its position.
#[test]
fn tokenize_rejects_single_equals() {
    let error = tokenize("a = b").unwrap_err();
    assert!(matches!(error, ExprError::Lex { position: 2, .. }));
}

// ============================================================================
// SECTION: Parser
// ============================================================================

/// Verifies precedence places multiplication under addition.
#[test]
fn parse_precedence() {
    let expr = parse("1 + 2 * 3").unwrap();
    let Expr::Binary { op: BinaryOp::Add, right, .. } = expr else {
        panic!("expected addition at the root");
    };
    assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }));
}

/// Verifies reference paths parse into root-anchored member chains.
#[test]
fn parse_reference_path() {
    let expr = parse("steps.baseline.metrics.match_rate").unwrap();
    let references = expr.references();
    assert_eq!(references.len(), 1);
    assert_eq!(references[0].dotted(), "steps.baseline.metrics.match_rate");
}

/// Verifies bare words outside reserved roots fold to string literals.
#[test]
fn parse_bare_word_is_string() {
    let expr = parse("production").unwrap();
    assert_eq!(expr, Expr::Literal(ExprValue::Str("production".to_string())));
}

/// Verifies unknown function names are rejected.
#[test]
fn parse_rejects_unknown_function() {
    let error = parse("eval(1)").unwrap_err();
    assert!(matches!(error, ExprError::Parse { .. }));
}

/// Verifies trailing input is rejected.
#[test]
fn parse_rejects_trailing_tokens() {
    let error = parse("1 2").unwrap_err();
    assert!(matches!(error, ExprError::Parse { .. }));
}

/// Verifies the nesting depth cap trips on pathological input.
#[test]
fn parse_depth_limit() {
    let input = format!("{}1{}", "(".repeat(64), ")".repeat(64));
    let error = parse(&input).unwrap_err();
    assert_eq!(error, ExprError::DepthLimit);
}
