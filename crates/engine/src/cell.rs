//! Cell contents and the per-cell dependency edges.
//!
//! Formula results are cached in place and dropped on invalidation.

use std::cell::Cell as Slot;

use rustc_hash::FxHashSet;

use crate::address::Address;
use crate::error::FormulaSyntaxError;
use crate::formula::{CellLookup, EvalResult, Formula};
use crate::value::Value;

/// Leading character that marks a formula.
pub const FORMULA_SIGN: char = '=';
/// Leading character that forces literal text; dropped from the visible value.
pub const ESCAPE_SIGN: char = '\'';

/// What a cell holds.
#[derive(Debug, Default)]
pub enum CellContent {
    #[default]
    Empty,
    /// Raw text as typed, escape marker included.
    Text(String),
    Formula {
        formula: Formula,
        /// Last evaluation result; `None` until evaluated or after invalidation.
        cache: Slot<Option<EvalResult>>,
    },
}

impl CellContent {
    /// Classify raw input.
    ///
    /// - `""` is `Empty`
    /// - `=` followed by at least one character is a formula
    /// - anything else (including a lone `=`) is text, kept verbatim
    pub fn from_input(input: &str) -> Result<Self, FormulaSyntaxError> {
        if input.is_empty() {
            return Ok(CellContent::Empty);
        }

        match input.strip_prefix(FORMULA_SIGN) {
            Some(expression) if !expression.is_empty() => Ok(CellContent::Formula {
                formula: Formula::parse(expression)?,
                cache: Slot::new(None),
            }),
            _ => Ok(CellContent::Text(input.to_string())),
        }
    }

    /// Cells this content reads.
    pub fn referenced_cells(&self) -> &[Address] {
        match self {
            CellContent::Formula { formula, .. } => formula.referenced_cells(),
            _ => &[],
        }
    }
}

/// A single grid slot.
///
/// Dependency edges are stored as addresses, never as handles to other
/// cells: `reads` are the cells this formula reads, `read_by` the cells
/// whose formulas read this one. Both are resolved through the owning sheet.
#[derive(Debug, Default)]
pub struct Cell {
    content: CellContent,
    reads: Vec<Address>,
    read_by: FxHashSet<Address>,
}

impl Cell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self) -> &CellContent {
        &self.content
    }

    /// Editable text: literal text as typed, or `=` plus the canonical
    /// expression for formulas.
    pub fn text(&self) -> String {
        match &self.content {
            CellContent::Empty => String::new(),
            CellContent::Text(s) => s.clone(),
            CellContent::Formula { formula, .. } => {
                format!("{}{}", FORMULA_SIGN, formula.expression())
            }
        }
    }

    /// Visible value. Formulas answer from the cache when populated and
    /// otherwise evaluate against `lookup`, filling the cache.
    pub fn value_with<L: CellLookup + ?Sized>(&self, lookup: &L) -> Value {
        match &self.content {
            CellContent::Empty => Value::default(),
            CellContent::Text(s) => {
                Value::Text(s.strip_prefix(ESCAPE_SIGN).unwrap_or(s).to_string())
            }
            CellContent::Formula { formula, cache } => {
                let result = match cache.get() {
                    Some(result) => result,
                    None => {
                        let result = formula.evaluate(lookup);
                        cache.set(Some(result));
                        result
                    }
                };
                Value::from(result)
            }
        }
    }

    /// Outgoing edges.
    pub fn reads(&self) -> &[Address] {
        &self.reads
    }

    /// Incoming edges (unordered).
    pub fn read_by(&self) -> impl Iterator<Item = Address> + '_ {
        self.read_by.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.content, CellContent::Empty)
    }

    pub fn is_formula(&self) -> bool {
        matches!(self.content, CellContent::Formula { .. })
    }

    pub fn is_cached(&self) -> bool {
        match &self.content {
            CellContent::Formula { cache, .. } => cache.get().is_some(),
            _ => false,
        }
    }

    /// Forget the cached result so the next read re-evaluates.
    /// Returns true if a cached result was dropped.
    pub fn drop_cache(&self) -> bool {
        match &self.content {
            CellContent::Formula { cache, .. } => cache.take().is_some(),
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn cached(&self) -> Option<EvalResult> {
        match &self.content {
            CellContent::Formula { cache, .. } => cache.get(),
            _ => None,
        }
    }

    /// Install new content and its edge list, returning the old edge list.
    /// The caller rewires `read_by` on the other end.
    pub(crate) fn replace(&mut self, content: CellContent) -> Vec<Address> {
        let reads = content.referenced_cells().to_vec();
        self.content = content;
        std::mem::replace(&mut self.reads, reads)
    }

    #[cfg(test)]
    pub(crate) fn readers(&self) -> &FxHashSet<Address> {
        &self.read_by
    }

    pub(crate) fn readers_mut(&mut self) -> &mut FxHashSet<Address> {
        &mut self.read_by
    }

    pub(crate) fn take_readers(&mut self) -> FxHashSet<Address> {
        std::mem::take(&mut self.read_by)
    }
}
