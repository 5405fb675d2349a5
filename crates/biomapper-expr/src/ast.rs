// biomapper-expr/src/ast.rs
// ============================================================================
// Module: Expression AST
// Description: Abstract syntax tree for the safe expression language.
// Purpose: Represent parsed expressions and expose reference enumeration.
// Dependencies: crate::value
// ============================================================================

//! ## Overview
//! Parsed expressions are immutable trees. References are rooted at a bare
//! identifier and navigate through member access and indexing; the set of
//! accepted roots is a closed list so no expression can reach state outside
//! the declared prefixes. [`Expr::references`] enumerates every reference
//! path for load-time validation without evaluating anything.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::value::ExprValue;

// ============================================================================
// SECTION: Reference Roots
// ============================================================================

/// The closed set of reference roots the language accepts.
pub const RESERVED_ROOTS: &[&str] =
    &["parameters", "variables", "env", "steps", "foreach", "repeat"];

/// Returns true when the identifier is a recognized reference root.
#[must_use]
pub fn is_reserved_root(name: &str) -> bool {
    RESERVED_ROOTS.contains(&name)
}

// ============================================================================
// SECTION: Operators
// ============================================================================

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Boolean negation (`not`).
    Not,
    /// Numeric negation (`-`).
    Neg,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division (always float).
    Div,
    /// Equality.
    Eq,
    /// Inequality.
    NotEq,
    /// Strictly less than.
    Lt,
    /// Less than or equal.
    LtEq,
    /// Strictly greater than.
    Gt,
    /// Greater than or equal.
    GtEq,
    /// Short-circuit conjunction.
    And,
    /// Short-circuit disjunction.
    Or,
}

/// Built-in functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    /// Length of a string, list, or map.
    Len,
    /// Maximum of a numeric list or argument sequence.
    Max,
    /// Minimum of a numeric list or argument sequence.
    Min,
    /// Sum of a numeric list or argument sequence.
    Sum,
}

impl Function {
    /// Resolves a function by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "len" => Some(Self::Len),
            "max" => Some(Self::Max),
            "min" => Some(Self::Min),
            "sum" => Some(Self::Sum),
            _ => None,
        }
    }

    /// Returns the function's source name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Len => "len",
            Self::Max => "max",
            Self::Min => "min",
            Self::Sum => "sum",
        }
    }
}

// ============================================================================
// SECTION: Expression Tree
// ============================================================================

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value.
    Literal(ExprValue),
    /// Reference root identifier.
    Root(String),
    /// Member access (`base.name`).
    Member {
        /// Expression the member is read from.
        base: Box<Expr>,
        /// Member name.
        name: String,
    },
    /// Index access (`base[index]`).
    Index {
        /// Expression the index is applied to.
        base: Box<Expr>,
        /// Index expression.
        index: Box<Expr>,
    },
    /// Unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Ternary conditional (`condition ? a : b`).
    Ternary {
        /// Boolean condition.
        condition: Box<Expr>,
        /// Value when true.
        when_true: Box<Expr>,
        /// Value when false.
        when_false: Box<Expr>,
    },
    /// Defaulting operation (`value :- fallback`).
    Default {
        /// Primary expression.
        value: Box<Expr>,
        /// Fallback evaluated when the primary is null or unresolved.
        fallback: Box<Expr>,
    },
    /// Built-in function call.
    Call {
        /// Function identifier.
        function: Function,
        /// Argument expressions.
        args: Vec<Expr>,
    },
}

/// A reference path extracted from an expression.
///
/// Only statically-known member segments are recorded; dynamic indexing
/// terminates the static portion of the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencePath {
    /// Reference root (always one of [`RESERVED_ROOTS`]).
    pub root: String,
    /// Static member segments following the root.
    pub segments: Vec<String>,
}

impl ReferencePath {
    /// Renders the path in dotted form.
    #[must_use]
    pub fn dotted(&self) -> String {
        let mut out = self.root.clone();
        for segment in &self.segments {
            out.push('.');
            out.push_str(segment);
        }
        out
    }
}

impl Expr {
    /// Enumerates every reference path contained in the expression.
    #[must_use]
    pub fn references(&self) -> Vec<ReferencePath> {
        let mut paths = Vec::new();
        collect_references(self, &mut paths);
        paths
    }
}

/// Recursively collects reference paths from an expression tree.
fn collect_references(expr: &Expr, paths: &mut Vec<ReferencePath>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Root(root) => {
            paths.push(ReferencePath { root: root.clone(), segments: Vec::new() });
        }
        Expr::Member { base, name } => {
            if let Some(mut path) = static_path(base) {
                path.segments.push(name.clone());
                paths.push(path);
            } else {
                collect_references(base, paths);
            }
        }
        Expr::Index { base, index } => {
            collect_references(base, paths);
            collect_references(index, paths);
        }
        Expr::Unary { operand, .. } => collect_references(operand, paths),
        Expr::Binary { left, right, .. } => {
            collect_references(left, paths);
            collect_references(right, paths);
        }
        Expr::Ternary { condition, when_true, when_false } => {
            collect_references(condition, paths);
            collect_references(when_true, paths);
            collect_references(when_false, paths);
        }
        Expr::Default { value, fallback } => {
            collect_references(value, paths);
            collect_references(fallback, paths);
        }
        Expr::Call { args, .. } => {
            for arg in args {
                collect_references(arg, paths);
            }
        }
    }
}

/// Returns the static member path for a root-anchored expression.
fn static_path(expr: &Expr) -> Option<ReferencePath> {
    match expr {
        Expr::Root(root) => Some(ReferencePath { root: root.clone(), segments: Vec::new() }),
        Expr::Member { base, name } => {
            let mut path = static_path(base)?;
            path.segments.push(name.clone());
            Some(path)
        }
        _ => None,
    }
}
