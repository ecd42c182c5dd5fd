// Formula evaluator - walks the AST, pulling referenced values from a CellLookup

use crate::address::Address;
use crate::error::FormulaError;
use crate::value::Value;

use super::parser::{Expr, Op, UnaryOp};

/// Outcome of evaluating a formula.
pub type EvalResult = Result<f64, FormulaError>;

/// Source of cell values during evaluation.
///
/// Implementations return the visible value of the cell at `addr`; absent
/// cells are empty text. Only valid addresses are ever requested.
pub trait CellLookup {
    fn get_value(&self, addr: Address) -> Value;
}

impl<F> CellLookup for F
where
    F: Fn(Address) -> Value,
{
    fn get_value(&self, addr: Address) -> Value {
        self(addr)
    }
}

/// Evaluate an expression. The first error encountered (left to right) wins.
pub fn evaluate<L: CellLookup + ?Sized>(expr: &Expr, lookup: &L) -> EvalResult {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::CellRef(addr) => {
            if !addr.is_valid() {
                return Err(FormulaError::Ref);
            }
            lookup.get_value(*addr).to_operand()
        }
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, lookup)?;
            Ok(match op {
                UnaryOp::Plus => value,
                UnaryOp::Minus => -value,
            })
        }
        Expr::BinaryOp { op, left, right } => {
            let l = evaluate(left, lookup)?;
            let r = evaluate(right, lookup)?;
            let result = match op {
                Op::Add => l + r,
                Op::Sub => l - r,
                Op::Mul => l * r,
                Op::Div => {
                    if r == 0.0 {
                        return Err(FormulaError::Div0);
                    }
                    l / r
                }
            };
            if result.is_finite() {
                Ok(result)
            } else {
                Err(FormulaError::Div0)
            }
        }
    }
}
