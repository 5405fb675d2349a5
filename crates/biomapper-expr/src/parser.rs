// biomapper-expr/src/parser.rs
// ============================================================================
// Module: Expression Parser
// Description: Recursive-descent parser for the safe expression language.
// Purpose: Turn token streams into validated expression trees.
// Dependencies: crate::{ast, error, token, value}
// ============================================================================

//! ## Overview
//! The parser is a hand-rolled precedence climber over the closed operator
//! set: `:-` binds loosest, then the ternary, `or`, `and`, comparisons,
//! additive, multiplicative, unary, and postfix member/index access.
//! Identifiers that are not reserved reference roots and not function names
//! fold to string literals, which gives `${env.PORT:-8080}` and
//! `${env.MODE:-batch}` their shell-style reading without widening the
//! reference surface.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::ast::BinaryOp;
use crate::ast::Expr;
use crate::ast::Function;
use crate::ast::UnaryOp;
use crate::ast::is_reserved_root;
use crate::error::ExprError;
use crate::token::Token;
use crate::token::TokenKind;
use crate::token::tokenize;
use crate::value::ExprValue;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Hard cap on expression nesting depth.
const MAX_DEPTH: usize = 32;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Parses a complete expression from source text.
///
/// # Errors
///
/// Returns [`ExprError`] when lexing fails, the token stream does not form
/// a single expression, or nesting exceeds the depth cap.
pub fn parse(input: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, index: 0, input_len: input.len() };
    let expr = parser.parse_expr(0)?;
    if let Some(token) = parser.peek() {
        return Err(ExprError::Parse {
            position: token.position,
            message: "unexpected trailing input".to_string(),
        });
    }
    Ok(expr)
}

// ============================================================================
// SECTION: Parser State
// ============================================================================

/// Token-stream parser state.
struct Parser {
    /// Token stream under consumption.
    tokens: Vec<Token>,
    /// Cursor into the token stream.
    index: usize,
    /// Total input length, used for end-of-input error positions.
    input_len: usize,
}

impl Parser {
    /// Returns the current token without consuming it.
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    /// Consumes and returns the current token.
    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).cloned();
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    /// Returns the byte position for error reporting at the cursor.
    fn position(&self) -> usize {
        self.peek().map_or(self.input_len, |token| token.position)
    }

    /// Consumes the expected token kind or fails.
    fn expect(&mut self, expected: &TokenKind, what: &str) -> Result<(), ExprError> {
        match self.advance() {
            Some(token) if token.kind == *expected => Ok(()),
            Some(token) => Err(ExprError::Parse {
                position: token.position,
                message: format!("expected {what}"),
            }),
            None => Err(ExprError::Parse {
                position: self.input_len,
                message: format!("expected {what}, found end of expression"),
            }),
        }
    }

    /// Parses an expression at the given depth.
    fn parse_expr(&mut self, depth: usize) -> Result<Expr, ExprError> {
        if depth > MAX_DEPTH {
            return Err(ExprError::DepthLimit);
        }
        self.parse_default(depth)
    }

    /// Parses the `:-` defaulting level (right-associative, loosest).
    fn parse_default(&mut self, depth: usize) -> Result<Expr, ExprError> {
        let value = self.parse_ternary(depth)?;
        if matches!(self.peek().map(|token| &token.kind), Some(TokenKind::ColonDash)) {
            self.index += 1;
            let fallback = self.parse_default(depth + 1)?;
            return Ok(Expr::Default { value: Box::new(value), fallback: Box::new(fallback) });
        }
        Ok(value)
    }

    /// Parses the ternary conditional level (right-associative).
    fn parse_ternary(&mut self, depth: usize) -> Result<Expr, ExprError> {
        let condition = self.parse_or(depth)?;
        if matches!(self.peek().map(|token| &token.kind), Some(TokenKind::Question)) {
            self.index += 1;
            let when_true = self.parse_ternary(depth + 1)?;
            self.expect(&TokenKind::Colon, "':' in ternary expression")?;
            let when_false = self.parse_ternary(depth + 1)?;
            return Ok(Expr::Ternary {
                condition: Box::new(condition),
                when_true: Box::new(when_true),
                when_false: Box::new(when_false),
            });
        }
        Ok(condition)
    }

    /// Parses the `or` level.
    fn parse_or(&mut self, depth: usize) -> Result<Expr, ExprError> {
        let mut left = self.parse_and(depth)?;
        while self.peek_keyword("or") {
            self.index += 1;
            let right = self.parse_and(depth + 1)?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// Parses the `and` level.
    fn parse_and(&mut self, depth: usize) -> Result<Expr, ExprError> {
        let mut left = self.parse_comparison(depth)?;
        while self.peek_keyword("and") {
            self.index += 1;
            let right = self.parse_comparison(depth + 1)?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// Parses the comparison level (non-associative in practice).
    fn parse_comparison(&mut self, depth: usize) -> Result<Expr, ExprError> {
        let left = self.parse_additive(depth)?;
        let op = match self.peek().map(|token| &token.kind) {
            Some(TokenKind::EqEq) => Some(BinaryOp::Eq),
            Some(TokenKind::NotEq) => Some(BinaryOp::NotEq),
            Some(TokenKind::Lt) => Some(BinaryOp::Lt),
            Some(TokenKind::LtEq) => Some(BinaryOp::LtEq),
            Some(TokenKind::Gt) => Some(BinaryOp::Gt),
            Some(TokenKind::GtEq) => Some(BinaryOp::GtEq),
            _ => None,
        };
        let Some(op) = op else {
            return Ok(left);
        };
        self.index += 1;
        let right = self.parse_additive(depth + 1)?;
        Ok(Expr::Binary { op, left: Box::new(left), right: Box::new(right) })
    }

    /// Parses the additive level.
    fn parse_additive(&mut self, depth: usize) -> Result<Expr, ExprError> {
        let mut left = self.parse_multiplicative(depth)?;
        loop {
            let op = match self.peek().map(|token| &token.kind) {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.index += 1;
            let right = self.parse_multiplicative(depth + 1)?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    /// Parses the multiplicative level.
    fn parse_multiplicative(&mut self, depth: usize) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary(depth)?;
        loop {
            let op = match self.peek().map(|token| &token.kind) {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.index += 1;
            let right = self.parse_unary(depth + 1)?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    /// Parses unary operators.
    fn parse_unary(&mut self, depth: usize) -> Result<Expr, ExprError> {
        if depth > MAX_DEPTH {
            return Err(ExprError::DepthLimit);
        }
        if self.peek_keyword("not") {
            self.index += 1;
            let operand = self.parse_unary(depth + 1)?;
            return Ok(Expr::Unary { op: UnaryOp::Not, operand: Box::new(operand) });
        }
        if matches!(self.peek().map(|token| &token.kind), Some(TokenKind::Minus)) {
            self.index += 1;
            let operand = self.parse_unary(depth + 1)?;
            return Ok(Expr::Unary { op: UnaryOp::Neg, operand: Box::new(operand) });
        }
        self.parse_postfix(depth)
    }

    /// Parses postfix member access and indexing.
    fn parse_postfix(&mut self, depth: usize) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary(depth)?;
        loop {
            match self.peek().map(|token| &token.kind) {
                Some(TokenKind::Dot) => {
                    self.index += 1;
                    let position = self.position();
                    match self.advance() {
                        Some(Token { kind: TokenKind::Ident(name), .. }) => {
                            expr = Expr::Member { base: Box::new(expr), name };
                        }
                        _ => {
                            return Err(ExprError::Parse {
                                position,
                                message: "expected member name after '.'".to_string(),
                            });
                        }
                    }
                }
                Some(TokenKind::BracketOpen) => {
                    self.index += 1;
                    let index = self.parse_expr(depth + 1)?;
                    self.expect(&TokenKind::BracketClose, "']'")?;
                    expr = Expr::Index { base: Box::new(expr), index: Box::new(index) };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// Parses primary expressions: literals, groups, calls, references.
    fn parse_primary(&mut self, depth: usize) -> Result<Expr, ExprError> {
        let position = self.position();
        let Some(token) = self.advance() else {
            return Err(ExprError::Parse {
                position,
                message: "expected expression".to_string(),
            });
        };
        match token.kind {
            TokenKind::Int(value) => Ok(Expr::Literal(ExprValue::Int(value))),
            TokenKind::Float(value) => Ok(Expr::Literal(ExprValue::Float(value))),
            TokenKind::Str(value) => Ok(Expr::Literal(ExprValue::Str(value))),
            TokenKind::ParenOpen => {
                let inner = self.parse_expr(depth + 1)?;
                self.expect(&TokenKind::ParenClose, "')'")?;
                Ok(inner)
            }
            TokenKind::Ident(name) => self.parse_ident(name, depth),
            _ => Err(ExprError::Parse {
                position: token.position,
                message: "expected expression".to_string(),
            }),
        }
    }

    /// Parses an identifier into a keyword literal, call, reference root, or
    /// bare-word string.
    fn parse_ident(&mut self, name: String, depth: usize) -> Result<Expr, ExprError> {
        match name.as_str() {
            "true" => return Ok(Expr::Literal(ExprValue::Bool(true))),
            "false" => return Ok(Expr::Literal(ExprValue::Bool(false))),
            "null" => return Ok(Expr::Literal(ExprValue::Null)),
            _ => {}
        }
        if matches!(self.peek().map(|token| &token.kind), Some(TokenKind::ParenOpen)) {
            let Some(function) = Function::from_name(&name) else {
                return Err(ExprError::Parse {
                    position: self.position(),
                    message: format!("unknown function: {name}"),
                });
            };
            self.index += 1;
            let mut args = Vec::new();
            if !matches!(self.peek().map(|token| &token.kind), Some(TokenKind::ParenClose)) {
                loop {
                    args.push(self.parse_expr(depth + 1)?);
                    if matches!(self.peek().map(|token| &token.kind), Some(TokenKind::Comma)) {
                        self.index += 1;
                    } else {
                        break;
                    }
                }
            }
            self.expect(&TokenKind::ParenClose, "')'")?;
            return Ok(Expr::Call { function, args });
        }
        if is_reserved_root(&name) {
            return Ok(Expr::Root(name));
        }
        // Bare words outside the reference roots read as string literals,
        // giving `:-` defaults their shell-style form.
        Ok(Expr::Literal(ExprValue::Str(name)))
    }

    /// Returns true when the current token is the given keyword.
    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(
            self.peek().map(|token| &token.kind),
            Some(TokenKind::Ident(name)) if name == keyword
        )
    }
}
