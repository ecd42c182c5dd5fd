// Formula parsing and evaluation

pub mod eval;
pub mod parser;
pub mod refs;

use crate::address::Address;
use crate::error::FormulaSyntaxError;

pub use eval::{CellLookup, EvalResult};
use parser::Expr;

/// A parsed formula.
///
/// Parsing happens once; the formula can then be evaluated any number of
/// times against a `CellLookup`, rendered back to canonical text, and asked
/// which cells it reads.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    expr: Expr,
    refs: Vec<Address>,
}

impl Formula {
    /// Parse an expression (without the leading `=`).
    pub fn parse(expression: &str) -> Result<Self, FormulaSyntaxError> {
        let expr = parser::parse(expression)?;
        let refs = refs::extract_refs(&expr);
        Ok(Self { expr, refs })
    }

    pub fn evaluate<L: CellLookup + ?Sized>(&self, lookup: &L) -> EvalResult {
        eval::evaluate(&self.expr, lookup)
    }

    /// Canonical expression text (no leading `=`).
    pub fn expression(&self) -> String {
        self.expr.to_string()
    }

    /// In-grid cells this formula reads, sorted by (row, col), no duplicates.
    pub fn referenced_cells(&self) -> &[Address] {
        &self.refs
    }
}
