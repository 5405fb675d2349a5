// biomapper-expr/src/error.rs
// ============================================================================
// Module: Expression Errors
// Description: Error types for lexing, parsing, and evaluation.
// Purpose: Surface every expression failure as a typed, positioned error.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every failure in the expression subsystem is an explicit error value.
//! Lex and parse errors carry byte positions so strategy loaders can point
//! at the offending location inside a template. Evaluation errors are
//! fail-fast: an unresolved reference or a type mismatch aborts the
//! expression unless a `:-` default absorbs it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Error Type
// ============================================================================

/// Errors raised while lexing, parsing, or evaluating expressions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    /// Input contained a character or token the lexer cannot accept.
    #[error("lex error at byte {position}: {message}")]
    Lex {
        /// Byte offset of the offending input.
        position: usize,
        /// Human-readable description of the problem.
        message: String,
    },
    /// Input did not form a valid expression.
    #[error("parse error at byte {position}: {message}")]
    Parse {
        /// Byte offset of the offending token.
        position: usize,
        /// Human-readable description of the problem.
        message: String,
    },
    /// A `${...}` span was opened but never closed.
    #[error("unterminated expression starting at byte {position}")]
    Unterminated {
        /// Byte offset of the opening `${`.
        position: usize,
    },
    /// Expression nesting exceeded the hard depth limit.
    #[error("expression exceeds maximum nesting depth")]
    DepthLimit,
    /// A reference root is not one of the declared prefixes.
    #[error("unknown reference root: {root}")]
    UnknownRoot {
        /// The rejected root identifier.
        root: String,
    },
    /// A reference resolved through the scope but the path does not exist.
    #[error("unresolved reference: {path}")]
    UnknownReference {
        /// Dotted path that failed to resolve.
        path: String,
    },
    /// Operand types are not valid for the attempted operation.
    #[error("type mismatch: {message}")]
    TypeMismatch {
        /// Human-readable description of the mismatch.
        message: String,
    },
    /// Division or modulo by zero.
    #[error("division by zero")]
    DivisionByZero,
    /// Integer arithmetic overflowed.
    #[error("integer overflow")]
    Overflow,
    /// A built-in function was called with invalid arguments.
    #[error("invalid arguments to {function}: {message}")]
    BadArgument {
        /// Function name.
        function: String,
        /// Human-readable description of the problem.
        message: String,
    },
    /// The scope implementation reported a failure.
    #[error("scope error: {message}")]
    Scope {
        /// Human-readable description of the failure.
        message: String,
    },
}

impl ExprError {
    /// Returns true when a `:-` default may absorb this error.
    ///
    /// Only unresolved references are recoverable; structural and type
    /// errors always propagate.
    #[must_use]
    pub const fn is_defaultable(&self) -> bool {
        matches!(self, Self::UnknownReference { .. })
    }
}
