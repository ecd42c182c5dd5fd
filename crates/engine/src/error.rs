//! Error types.
//!
//! Structural failures (`SheetError`) abort a single mutating call and leave
//! the sheet untouched. Computational failures (`FormulaError`) are ordinary
//! values that formulas produce, cache, and propagate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Address;

/// Failure of a sheet operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SheetError {
    #[error("invalid position {{{}, {}}}", .0.row, .0.col)]
    InvalidPosition(Address),

    #[error("formula syntax error: {0}")]
    FormulaSyntax(#[from] FormulaSyntaxError),

    /// `cell` would (transitively) read itself; `via` is the referenced cell
    /// whose existing dependencies lead back to `cell`.
    #[error("circular dependency: {cell} would depend on itself through {via}")]
    CircularDependency { cell: Address, via: Address },
}

impl SheetError {
    /// Short machine-readable code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            SheetError::InvalidPosition(_) => "invalid_position",
            SheetError::FormulaSyntax(_) => "formula_syntax",
            SheetError::CircularDependency { .. } => "circular_dependency",
        }
    }
}

/// Malformed formula expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaSyntaxError {
    #[error("empty expression")]
    Empty,
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("invalid cell reference '{0}'")]
    InvalidReference(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("unbalanced parentheses")]
    UnbalancedParens,
    #[error("expression is {0} characters long")]
    TooLong(usize),
    #[error("parentheses nested deeper than {0} levels")]
    TooDeep(usize),
}

/// Error value a formula can evaluate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
pub enum FormulaError {
    /// Reference to a cell outside the grid.
    #[error("#REF!")]
    Ref,
    /// Operand that is not a number.
    #[error("#VALUE!")]
    Value,
    /// Division by zero or a non-finite arithmetic result.
    #[error("#DIV/0!")]
    Div0,
}

/// Malformed A1 address text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseAddressError {
    #[error("address is {0} characters long")]
    TooLong(usize),
    #[error("missing column letters")]
    MissingColumn,
    #[error("{0} column letters (at most 3 allowed)")]
    TooManyLetters(usize),
    #[error("missing row number")]
    MissingRow,
    #[error("invalid row number '{0}'")]
    InvalidRow(String),
}
