use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FormulaError;

/// Visible value of a cell: its text, a formula's number, or a formula error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Text(String),
    Number(f64),
    Error(FormulaError),
}

impl Default for Value {
    fn default() -> Self {
        Value::Text(String::new())
    }
}

impl Value {
    /// Numeric operand for arithmetic.
    ///
    /// Empty text counts as zero; other text must parse as a finite number.
    /// Errors propagate unchanged.
    pub fn to_operand(&self) -> Result<f64, FormulaError> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Error(e) => Err(*e),
            Value::Text(s) if s.is_empty() => Ok(0.0),
            Value::Text(s) => parse_number(s).ok_or(FormulaError::Value),
        }
    }
}

impl From<Result<f64, FormulaError>> for Value {
    fn from(result: Result<f64, FormulaError>) -> Self {
        match result {
            Ok(n) => Value::Number(n),
            Err(e) => Value::Error(e),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Error(e) => write!(f, "{}", e),
        }
    }
}

/// Parse cell text as a number. Rejects `inf`/`nan` spellings that
/// `f64::from_str` would otherwise accept.
fn parse_number(text: &str) -> Option<f64> {
    let starts_numeric = text
        .trim_start_matches(['+', '-'])
        .starts_with(|c: char| c.is_ascii_digit() || c == '.');
    if !starts_numeric {
        return None;
    }
    text.parse::<f64>().ok().filter(|n| n.is_finite())
}
