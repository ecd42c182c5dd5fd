//! The sheet: sparse owner of every cell.
//!
//! Cells live in a ragged row store. Each stored row extends only to its
//! last materialized slot, and after a shrink pass every stored row ends in
//! a non-empty cell, so the printable size is simply
//! `(rows.len(), max row length)`.

use std::io::{self, Write};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use crate::address::{Address, Size};
use crate::cell::Cell;
use crate::error::SheetError;
use crate::formula::CellLookup;
use crate::value::Value;

type Row = Vec<Option<Cell>>;

#[derive(Debug, Default)]
pub struct Sheet {
    rows: Vec<Row>,
    columns_count: usize,
    /// Readers of addresses that have no cell yet. Adopted by the cell when
    /// one is created there; refilled when shrink drops an empty cell that
    /// still has readers.
    pending_readers: FxHashMap<Address, FxHashSet<Address>>,
}

impl CellLookup for Sheet {
    fn get_value(&self, addr: Address) -> Value {
        self.value_of(addr)
    }
}

impl Sheet {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Public API
    // =========================================================================

    /// Set the content of the cell at `addr`.
    ///
    /// Fails without touching the sheet if the address is out of bounds, the
    /// text is a malformed formula, or the formula would close a reference
    /// cycle. Setting empty text is the same as `clear_cell`.
    pub fn set_cell(&mut self, addr: Address, text: &str) -> Result<(), SheetError> {
        check_position(addr)?;
        if text.is_empty() {
            self.clear(addr);
            return Ok(());
        }
        self.apply_edit(addr, text)
    }

    /// The cell at `addr`, if it exists and has non-empty text.
    pub fn get_cell(&self, addr: Address) -> Result<Option<CellView<'_>>, SheetError> {
        check_position(addr)?;
        Ok(self
            .cell(addr)
            .filter(|cell| !cell.is_empty())
            .map(|cell| CellView {
                sheet: self,
                addr,
                cell,
            }))
    }

    /// Empty the cell at `addr`. Clearing an absent or empty cell is a no-op.
    pub fn clear_cell(&mut self, addr: Address) -> Result<(), SheetError> {
        check_position(addr)?;
        self.clear(addr);
        Ok(())
    }

    /// Smallest rectangle anchored at A1 covering every non-empty cell.
    pub fn printable_size(&self) -> Size {
        Size::new(self.rows.len(), self.columns_count)
    }

    /// Visible value at `addr`; absent cells read as empty text.
    pub fn value_at(&self, addr: Address) -> Result<Value, SheetError> {
        check_position(addr)?;
        Ok(self.value_of(addr))
    }

    /// Editable text at `addr`; absent cells read as empty text.
    pub fn text_at(&self, addr: Address) -> Result<String, SheetError> {
        check_position(addr)?;
        Ok(self.cell(addr).map(Cell::text).unwrap_or_default())
    }

    /// Number of cells with non-empty content.
    pub fn cell_count(&self) -> usize {
        self.cells().filter(|(_, cell)| !cell.is_empty()).count()
    }

    /// Write every value in the printable area, tab-separated, one line per row.
    pub fn print_values<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        self.print_cells(out, |out, addr, cell| write!(out, "{}", self.value_of_cell(addr, cell)))
    }

    /// Write every cell's text in the printable area, tab-separated, one line per row.
    pub fn print_texts<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        self.print_cells(out, |out, _, cell| write!(out, "{}", cell.text()))
    }

    /// Non-empty cells in row-major order.
    pub fn snapshot(&self) -> Vec<CellSnapshot> {
        self.cells()
            .filter(|(_, cell)| !cell.is_empty())
            .map(|(addr, cell)| CellSnapshot {
                address: addr.to_string(),
                text: cell.text(),
                value: self.value_of_cell(addr, cell),
            })
            .collect()
    }

    // =========================================================================
    // Storage
    // =========================================================================

    /// Every materialized cell (empty ones included) in row-major order.
    pub(crate) fn cells(&self) -> impl Iterator<Item = (Address, &Cell)> + '_ {
        self.rows.iter().enumerate().flat_map(|(row, slots)| {
            slots
                .iter()
                .enumerate()
                .filter_map(move |(col, slot)| Some((Address::new(row, col), slot.as_ref()?)))
        })
    }

    pub(crate) fn cell(&self, addr: Address) -> Option<&Cell> {
        self.rows.get(addr.row)?.get(addr.col)?.as_ref()
    }

    pub(crate) fn cell_mut(&mut self, addr: Address) -> Option<&mut Cell> {
        self.rows.get_mut(addr.row)?.get_mut(addr.col)?.as_mut()
    }

    /// Materialize the cell at `addr`, growing storage and the printable
    /// area to cover it. A new cell adopts any readers recorded for its
    /// address while it did not exist.
    pub(crate) fn ensure_cell(&mut self, addr: Address) -> &mut Cell {
        if self.rows.len() <= addr.row {
            self.rows.resize_with(addr.row + 1, Vec::new);
        }
        let row = &mut self.rows[addr.row];
        if row.len() <= addr.col {
            row.resize_with(addr.col + 1, || None);
        }
        self.columns_count = self.columns_count.max(row.len());

        let pending = &mut self.pending_readers;
        row[addr.col].get_or_insert_with(|| {
            let mut cell = Cell::new();
            if let Some(readers) = pending.remove(&addr) {
                cell.readers_mut().extend(readers);
            }
            cell
        })
    }

    /// Reader set for `addr`, wherever it is currently kept.
    pub(crate) fn readers_mut(&mut self, addr: Address) -> &mut FxHashSet<Address> {
        let Sheet {
            rows,
            pending_readers,
            ..
        } = self;
        match rows
            .get_mut(addr.row)
            .and_then(|row| row.get_mut(addr.col))
            .and_then(Option::as_mut)
        {
            Some(cell) => cell.readers_mut(),
            None => pending_readers.entry(addr).or_default(),
        }
    }

    /// Drop `reader` from the reader set of `addr`.
    pub(crate) fn remove_reader(&mut self, addr: Address, reader: Address) {
        if let Some(cell) = self.cell_mut(addr) {
            cell.readers_mut().remove(&reader);
            return;
        }
        if let Some(readers) = self.pending_readers.get_mut(&addr) {
            readers.remove(&reader);
            if readers.is_empty() {
                self.pending_readers.remove(&addr);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_readers(&self) -> &FxHashMap<Address, FxHashSet<Address>> {
        &self.pending_readers
    }

    /// True if `addr` is the last stored slot of its row.
    pub(crate) fn ends_row(&self, addr: Address) -> bool {
        self.rows
            .get(addr.row)
            .map_or(false, |row| row.len() == addr.col + 1)
    }

    /// Trim trailing empty cells from every row and trailing empty rows from
    /// the sheet, then recompute the printable area.
    pub(crate) fn shrink(&mut self) {
        let Sheet {
            rows,
            columns_count,
            pending_readers,
        } = self;

        *columns_count = 0;
        for (row_idx, row) in rows.iter_mut().enumerate() {
            while row.last().map_or(false, is_empty_slot) {
                let col = row.len() - 1;
                if let Some(Some(mut cell)) = row.pop() {
                    let readers = cell.take_readers();
                    if !readers.is_empty() {
                        pending_readers.insert(Address::new(row_idx, col), readers);
                    }
                }
            }
            *columns_count = (*columns_count).max(row.len());
        }
        while rows.last().map_or(false, Vec::is_empty) {
            rows.pop();
        }

        log::debug!("shrink: printable size now {}x{}", rows.len(), columns_count);
    }

    // =========================================================================
    // Values
    // =========================================================================

    pub(crate) fn value_of(&self, addr: Address) -> Value {
        match self.cell(addr) {
            Some(cell) => self.value_of_cell(addr, cell),
            None => Value::default(),
        }
    }

    /// Value of `cell` (stored at `addr`). Uncached precedents are evaluated
    /// first, dependencies before dependents, so evaluation never recurses
    /// deeper than one formula.
    fn value_of_cell(&self, addr: Address, cell: &Cell) -> Value {
        if cell.is_formula() && !cell.is_cached() {
            self.warm_precedents(addr);
        }
        cell.value_with(self)
    }

    fn print_cells<W, F>(&self, out: &mut W, mut print_cell: F) -> io::Result<()>
    where
        W: Write + ?Sized,
        F: FnMut(&mut W, Address, &Cell) -> io::Result<()>,
    {
        for (row_idx, row) in self.rows.iter().enumerate() {
            for col in 0..self.columns_count {
                if col > 0 {
                    out.write_all(b"\t")?;
                }
                if let Some(Some(cell)) = row.get(col) {
                    print_cell(out, Address::new(row_idx, col), cell)?;
                }
            }
            out.write_all(b"\n")?;
        }
        Ok(())
    }
}

fn check_position(addr: Address) -> Result<(), SheetError> {
    if addr.is_valid() {
        Ok(())
    } else {
        Err(SheetError::InvalidPosition(addr))
    }
}

fn is_empty_slot(slot: &Option<Cell>) -> bool {
    slot.as_ref().map_or(true, Cell::is_empty)
}

/// Borrowed view of a non-empty cell, able to evaluate it in its sheet.
#[derive(Clone, Copy)]
pub struct CellView<'a> {
    sheet: &'a Sheet,
    addr: Address,
    cell: &'a Cell,
}

impl<'a> CellView<'a> {
    pub fn address(&self) -> Address {
        self.addr
    }

    pub fn value(&self) -> Value {
        self.sheet.value_of_cell(self.addr, self.cell)
    }

    pub fn text(&self) -> String {
        self.cell.text()
    }

    /// Cells this cell's formula reads, sorted by (row, col).
    pub fn referenced_cells(&self) -> &'a [Address] {
        self.cell.reads()
    }

    /// Cells whose formulas read this cell, sorted by (row, col).
    pub fn dependents(&self) -> Vec<Address> {
        let mut dependents: Vec<Address> = self.cell.read_by().collect();
        dependents.sort_by_key(|a| (a.row, a.col));
        dependents
    }

    pub fn is_formula(&self) -> bool {
        self.cell.is_formula()
    }

    pub fn is_cached(&self) -> bool {
        self.cell.is_cached()
    }

    /// Force the next `value()` of this cell, and of every formula that
    /// reads it, to re-evaluate.
    pub fn drop_cache(&self) {
        if self.cell.drop_cache() {
            self.sheet.invalidate_dependents(self.addr);
        }
    }
}

impl std::fmt::Debug for CellView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellView")
            .field("address", &self.addr)
            .field("text", &self.cell.text())
            .finish()
    }
}

/// Serializable record of one non-empty cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellSnapshot {
    pub address: String,
    pub text: String,
    pub value: Value,
}
