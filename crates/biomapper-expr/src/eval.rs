// biomapper-expr/src/eval.rs
// ============================================================================
// Module: Expression Evaluator
// Description: Strict evaluator for parsed expression trees.
// Purpose: Resolve references through a scope seam and apply safe operators.
// Dependencies: crate::{ast, error, value}
// ============================================================================

//! ## Overview
//! Evaluation is strict and fail-fast. References resolve through the
//! [`Scope`] trait, which is the only seam between the language and its
//! host: the evaluator itself can only reach state a scope hands out for
//! one of the reserved roots. Boolean operators short-circuit, comparisons
//! between strings and numbers are type errors, and `:-` absorbs exactly
//! null values and unresolved references.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::ast::BinaryOp;
use crate::ast::Expr;
use crate::ast::Function;
use crate::ast::UnaryOp;
use crate::ast::is_reserved_root;
use crate::error::ExprError;
use crate::value::ExprValue;
use crate::value::Numeric;
use crate::value::numeric_cmp;
use crate::value::numeric_eq;

// ============================================================================
// SECTION: Scope Seam
// ============================================================================

/// Host-provided resolution seam for reference roots.
///
/// Implementations return the full value bound to a reserved root (for
/// example the parameter map) and the evaluator navigates members and
/// indexes from there. Returning `Ok(None)` means the root exists in the
/// language but has no binding in this scope, which surfaces as an
/// unresolved-reference error (and is therefore `:-`-defaultable).
pub trait Scope {
    /// Resolves a reserved root to its bound value.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError::Scope`] when the host cannot produce the root.
    fn resolve_root(&self, root: &str) -> Result<Option<ExprValue>, ExprError>;
}

/// Empty scope that resolves nothing; useful for literal-only expressions.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyScope;

impl Scope for EmptyScope {
    fn resolve_root(&self, _root: &str) -> Result<Option<ExprValue>, ExprError> {
        Ok(None)
    }
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Evaluates an expression against a scope.
///
/// # Errors
///
/// Returns [`ExprError`] on unresolved references, type mismatches, or
/// arithmetic failures.
pub fn evaluate(expr: &Expr, scope: &dyn Scope) -> Result<ExprValue, ExprError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Root(root) => resolve_root_value(root, scope),
        Expr::Member { base, name } => {
            let base_value = evaluate(base, scope)?;
            navigate_member(&base_value, name, &describe(base))
        }
        Expr::Index { base, index } => {
            let base_value = evaluate(base, scope)?;
            let index_value = evaluate(index, scope)?;
            navigate_index(&base_value, &index_value, &describe(base))
        }
        Expr::Unary { op, operand } => evaluate_unary(*op, operand, scope),
        Expr::Binary { op, left, right } => evaluate_binary(*op, left, right, scope),
        Expr::Ternary { condition, when_true, when_false } => {
            if evaluate(condition, scope)?.as_bool()? {
                evaluate(when_true, scope)
            } else {
                evaluate(when_false, scope)
            }
        }
        Expr::Default { value, fallback } => match evaluate(value, scope) {
            Ok(resolved) if !resolved.is_null() => Ok(resolved),
            Ok(_) => evaluate(fallback, scope),
            Err(error) if error.is_defaultable() => evaluate(fallback, scope),
            Err(error) => Err(error),
        },
        Expr::Call { function, args } => evaluate_call(*function, args, scope),
    }
}

/// Resolves a reference root through the scope.
fn resolve_root_value(root: &str, scope: &dyn Scope) -> Result<ExprValue, ExprError> {
    if !is_reserved_root(root) {
        return Err(ExprError::UnknownRoot { root: root.to_string() });
    }
    match scope.resolve_root(root)? {
        Some(value) => Ok(value),
        None => Err(ExprError::UnknownReference { path: root.to_string() }),
    }
}

/// Navigates one member access step.
fn navigate_member(base: &ExprValue, name: &str, base_desc: &str) -> Result<ExprValue, ExprError> {
    match base {
        ExprValue::Map(entries) => entries.get(name).cloned().ok_or_else(|| {
            ExprError::UnknownReference { path: format!("{base_desc}.{name}") }
        }),
        other => Err(ExprError::TypeMismatch {
            message: format!(
                "cannot access member {name:?} of {} value {base_desc}",
                other.type_name()
            ),
        }),
    }
}

/// Navigates one index access step.
fn navigate_index(
    base: &ExprValue,
    index: &ExprValue,
    base_desc: &str,
) -> Result<ExprValue, ExprError> {
    match (base, index) {
        (ExprValue::List(values), ExprValue::Int(position)) => {
            let position = usize::try_from(*position).map_err(|_| ExprError::TypeMismatch {
                message: format!("negative index into {base_desc}"),
            })?;
            values.get(position).cloned().ok_or_else(|| ExprError::UnknownReference {
                path: format!("{base_desc}[{position}]"),
            })
        }
        (ExprValue::Map(entries), ExprValue::Str(key)) => {
            entries.get(key).cloned().ok_or_else(|| ExprError::UnknownReference {
                path: format!("{base_desc}[{key:?}]"),
            })
        }
        (base, index) => Err(ExprError::TypeMismatch {
            message: format!(
                "cannot index {} with {}",
                base.type_name(),
                index.type_name()
            ),
        }),
    }
}

/// Evaluates a unary operation.
fn evaluate_unary(op: UnaryOp, operand: &Expr, scope: &dyn Scope) -> Result<ExprValue, ExprError> {
    let value = evaluate(operand, scope)?;
    match op {
        UnaryOp::Not => Ok(ExprValue::Bool(!value.as_bool()?)),
        UnaryOp::Neg => match Numeric::try_from_value(&value)? {
            Numeric::Int(inner) => inner
                .checked_neg()
                .map(ExprValue::Int)
                .ok_or(ExprError::Overflow),
            Numeric::Float(inner) => Ok(ExprValue::Float(-inner)),
        },
    }
}

/// Evaluates a binary operation with short-circuit boolean handling.
fn evaluate_binary(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    scope: &dyn Scope,
) -> Result<ExprValue, ExprError> {
    match op {
        BinaryOp::And => {
            if !evaluate(left, scope)?.as_bool()? {
                return Ok(ExprValue::Bool(false));
            }
            Ok(ExprValue::Bool(evaluate(right, scope)?.as_bool()?))
        }
        BinaryOp::Or => {
            if evaluate(left, scope)?.as_bool()? {
                return Ok(ExprValue::Bool(true));
            }
            Ok(ExprValue::Bool(evaluate(right, scope)?.as_bool()?))
        }
        _ => {
            let left_value = evaluate(left, scope)?;
            let right_value = evaluate(right, scope)?;
            apply_binary(op, &left_value, &right_value)
        }
    }
}

/// Applies a non-short-circuit binary operator to evaluated operands.
fn apply_binary(
    op: BinaryOp,
    left: &ExprValue,
    right: &ExprValue,
) -> Result<ExprValue, ExprError> {
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            arithmetic(op, Numeric::try_from_value(left)?, Numeric::try_from_value(right)?)
        }
        BinaryOp::Eq => Ok(ExprValue::Bool(values_equal(left, right)?)),
        BinaryOp::NotEq => Ok(ExprValue::Bool(!values_equal(left, right)?)),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let ordering =
                numeric_cmp(Numeric::try_from_value(left)?, Numeric::try_from_value(right)?)
                    .ok_or_else(|| ExprError::TypeMismatch {
                        message: "unordered float comparison".to_string(),
                    })?;
            let result = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::LtEq => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(ExprValue::Bool(result))
        }
        BinaryOp::And | BinaryOp::Or => Err(ExprError::TypeMismatch {
            message: "boolean operators handled before operand evaluation".to_string(),
        }),
    }
}

/// Performs arithmetic, staying integer when both operands are integers.
fn arithmetic(op: BinaryOp, left: Numeric, right: Numeric) -> Result<ExprValue, ExprError> {
    if op == BinaryOp::Div {
        let divisor = right.as_f64();
        if divisor == 0.0 {
            return Err(ExprError::DivisionByZero);
        }
        return Ok(ExprValue::Float(left.as_f64() / divisor));
    }
    match (left, right) {
        (Numeric::Int(left), Numeric::Int(right)) => {
            let result = match op {
                BinaryOp::Add => left.checked_add(right),
                BinaryOp::Sub => left.checked_sub(right),
                _ => left.checked_mul(right),
            };
            result.map(ExprValue::Int).ok_or(ExprError::Overflow)
        }
        _ => {
            let (left, right) = (left.as_f64(), right.as_f64());
            let result = match op {
                BinaryOp::Add => left + right,
                BinaryOp::Sub => left - right,
                _ => left * right,
            };
            Ok(ExprValue::Float(result))
        }
    }
}

/// Deep equality with numeric cross-type unification and strict string/number
/// separation.
fn values_equal(left: &ExprValue, right: &ExprValue) -> Result<bool, ExprError> {
    match (left, right) {
        (ExprValue::Null, ExprValue::Null) => Ok(true),
        (ExprValue::Bool(left), ExprValue::Bool(right)) => Ok(left == right),
        (ExprValue::Str(left), ExprValue::Str(right)) => Ok(left == right),
        (
            ExprValue::Int(_) | ExprValue::Float(_),
            ExprValue::Int(_) | ExprValue::Float(_),
        ) => Ok(numeric_eq(
            Numeric::try_from_value(left)?,
            Numeric::try_from_value(right)?,
        )),
        (ExprValue::Str(_), ExprValue::Int(_) | ExprValue::Float(_))
        | (ExprValue::Int(_) | ExprValue::Float(_), ExprValue::Str(_)) => {
            Err(ExprError::TypeMismatch {
                message: "cannot compare string with number".to_string(),
            })
        }
        (ExprValue::List(left), ExprValue::List(right)) => {
            if left.len() != right.len() {
                return Ok(false);
            }
            for (left_item, right_item) in left.iter().zip(right) {
                if !values_equal(left_item, right_item)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (ExprValue::Map(left), ExprValue::Map(right)) => {
            if left.len() != right.len() {
                return Ok(false);
            }
            for (key, left_item) in left {
                let Some(right_item) = right.get(key) else {
                    return Ok(false);
                };
                if !values_equal(left_item, right_item)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Evaluates a built-in function call.
fn evaluate_call(
    function: Function,
    args: &[Expr],
    scope: &dyn Scope,
) -> Result<ExprValue, ExprError> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(evaluate(arg, scope)?);
    }
    match function {
        Function::Len => {
            let [value] = values.as_slice() else {
                return Err(bad_argument(function, "expected exactly one argument"));
            };
            let length = match value {
                ExprValue::Str(inner) => inner.chars().count(),
                ExprValue::List(inner) => inner.len(),
                ExprValue::Map(inner) => inner.len(),
                other => {
                    return Err(bad_argument(
                        function,
                        &format!("cannot take length of {}", other.type_name()),
                    ));
                }
            };
            i64::try_from(length)
                .map(ExprValue::Int)
                .map_err(|_| ExprError::Overflow)
        }
        Function::Max | Function::Min | Function::Sum => {
            let operands = numeric_operands(function, &values)?;
            if operands.is_empty() {
                return Err(bad_argument(function, "expected at least one numeric value"));
            }
            Ok(fold_numeric(function, &operands))
        }
    }
}

/// Flattens call arguments into a numeric operand list.
///
/// A single list argument is used element-wise; otherwise each argument
/// must itself be numeric.
fn numeric_operands(function: Function, values: &[ExprValue]) -> Result<Vec<Numeric>, ExprError> {
    let items: &[ExprValue] = match values {
        [ExprValue::List(inner)] => inner.as_slice(),
        other => other,
    };
    items
        .iter()
        .map(|value| {
            Numeric::try_from_value(value).map_err(|_| {
                bad_argument(function, &format!("non-numeric value {}", value.type_name()))
            })
        })
        .collect()
}

/// Folds numeric operands for `max`, `min`, and `sum`.
fn fold_numeric(function: Function, operands: &[Numeric]) -> ExprValue {
    let all_int = operands.iter().all(|value| matches!(value, Numeric::Int(_)));
    if all_int {
        let ints: Vec<i64> = operands
            .iter()
            .map(|value| match value {
                Numeric::Int(inner) => *inner,
                Numeric::Float(_) => 0,
            })
            .collect();
        let folded = match function {
            Function::Max => ints.iter().copied().max().unwrap_or(0),
            Function::Min => ints.iter().copied().min().unwrap_or(0),
            _ => ints.iter().copied().fold(0_i64, i64::saturating_add),
        };
        return ExprValue::Int(folded);
    }
    let floats: Vec<f64> = operands.iter().map(|value| value.as_f64()).collect();
    let folded = match function {
        Function::Max => floats.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Function::Min => floats.iter().copied().fold(f64::INFINITY, f64::min),
        _ => floats.iter().sum(),
    };
    ExprValue::Float(folded)
}

/// Builds a bad-argument error for a built-in function.
fn bad_argument(function: Function, message: &str) -> ExprError {
    ExprError::BadArgument {
        function: function.name().to_string(),
        message: message.to_string(),
    }
}

/// Renders an expression for reference-path error messages.
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Root(root) => root.clone(),
        Expr::Member { base, name } => format!("{}.{name}", describe(base)),
        Expr::Index { base, .. } => format!("{}[..]", describe(base)),
        Expr::Literal(value) => value.render(),
        _ => "<expression>".to_string(),
    }
}
