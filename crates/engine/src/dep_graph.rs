//! Dependency tracking for formula cells.
//!
//! Edges live on the cells themselves, keyed by address:
//!
//! ```text
//! B.reads ∋ A   and   A.read_by ∋ B   mean  "B's formula reads A"
//! ```
//!
//! Edits go through a validate-then-commit transaction. Parsing and cycle
//! validation run against the committed graph and may fail; invalidation,
//! rewiring and commit only run once the edit is known to be valid and
//! cannot fail.
//!
//! # Invariants
//!
//! 1. **Symmetry:** if A ∈ B.reads then B ∈ A.read_by (or, when no cell
//!    exists at A, B ∈ pending_readers[A]), and vice versa.
//! 2. **Acyclicity:** following `reads` never returns to the starting cell.
//! 3. **Cache soundness:** a populated cache equals what evaluating the
//!    formula now would produce.
//! 4. **Uncached closure:** a formula without a cached result has no
//!    cached dependents. Evaluation caches precedents before dependents and
//!    invalidation drops dependents transitively, so this holds after every
//!    operation and lets the invalidation walk stop at uncached cells.
//! 5. **No empty pending sets** are stored.

use rustc_hash::FxHashSet;

use crate::address::Address;
use crate::cell::CellContent;
use crate::error::SheetError;
use crate::sheet::Sheet;

impl Sheet {
    /// Replace the content at a valid `addr` with non-empty `text`.
    pub(crate) fn apply_edit(&mut self, addr: Address, text: &str) -> Result<(), SheetError> {
        // Candidate build: nothing is touched if this fails
        let content = CellContent::from_input(text)?;

        // Cycle validation against the committed graph
        if let Some(via) = self.find_cycle(addr, content.referenced_cells()) {
            log::debug!("rejected edit of {}: cycle through {}", addr, via);
            return Err(SheetError::CircularDependency { cell: addr, via });
        }

        self.ensure_cell(addr);
        let dropped = self.invalidate_dependents(addr);
        self.commit(addr, content);

        log::debug!(
            "set {}: {} reads, {} dependent caches dropped",
            addr,
            self.cell(addr).map_or(0, |c| c.reads().len()),
            dropped
        );
        Ok(())
    }

    /// Empty the cell at a valid `addr`, shrinking the printable area when
    /// the cell was the last one stored in its row.
    pub(crate) fn clear(&mut self, addr: Address) {
        match self.cell(addr) {
            Some(cell) if !cell.is_empty() => {}
            _ => return,
        }

        let dropped = self.invalidate_dependents(addr);
        self.commit(addr, CellContent::Empty);
        log::debug!("cleared {}: {} dependent caches dropped", addr, dropped);

        if self.ends_row(addr) {
            self.shrink();
        }
    }

    /// Rewire edges and install `content` at an existing cell.
    fn commit(&mut self, addr: Address, content: CellContent) {
        let new_reads = content.referenced_cells().to_vec();
        let old_reads = match self.cell_mut(addr) {
            Some(cell) => cell.replace(content),
            None => return,
        };

        for read in old_reads {
            self.remove_reader(read, addr);
        }
        for read in new_reads {
            self.readers_mut(read).insert(addr);
        }
    }

    /// Would giving `target` the edges `new_reads` close a cycle?
    ///
    /// Walks the committed `reads` edges depth-first from each candidate
    /// read. Returns the candidate read from which `target` is reachable.
    /// Each cell is visited at most once per call.
    pub(crate) fn find_cycle(&self, target: Address, new_reads: &[Address]) -> Option<Address> {
        let mut visited = FxHashSet::default();

        for &start in new_reads {
            let mut stack = vec![start];
            while let Some(current) = stack.pop() {
                if current == target {
                    return Some(start);
                }
                if !visited.insert(current) {
                    continue;
                }
                if let Some(cell) = self.cell(current) {
                    stack.extend(cell.reads().iter().copied());
                }
            }
        }

        None
    }

    /// Drop the cached result of every formula that transitively reads
    /// `origin`. Must run before `origin`'s edges are rewired. Returns the
    /// number of caches actually dropped.
    ///
    /// A dependent that was already uncached has no cached dependents of its
    /// own (invariant 4), so the walk does not continue past it.
    pub(crate) fn invalidate_dependents(&self, origin: Address) -> usize {
        let Some(cell) = self.cell(origin) else {
            return 0;
        };

        let mut visited = FxHashSet::default();
        let mut stack: Vec<Address> = cell.read_by().collect();
        let mut dropped = 0;

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(dependent) = self.cell(current) {
                if dependent.drop_cache() {
                    dropped += 1;
                    stack.extend(dependent.read_by());
                }
            }
        }

        dropped
    }

    /// Evaluate, dependencies first, every uncached formula that `root`
    /// transitively reads, so evaluating `root` itself only ever sees
    /// cached or literal operands.
    pub(crate) fn warm_precedents(&self, root: Address) {
        for addr in self.uncached_precedents(root) {
            if let Some(cell) = self.cell(addr) {
                cell.value_with(self);
            }
        }
    }

    /// Uncached formula cells reachable from `root` through `reads`, in
    /// post-order (a cell appears after everything it reads). `root` itself
    /// is excluded.
    fn uncached_precedents(&self, root: Address) -> Vec<Address> {
        struct Frame {
            addr: Address,
            next_idx: usize,
        }

        let needs_eval = |addr: Address| {
            self.cell(addr)
                .map_or(false, |c| c.is_formula() && !c.is_cached())
        };

        let mut order = Vec::new();
        let mut visited = FxHashSet::default();
        visited.insert(root);
        let mut dfs_stack = vec![Frame { addr: root, next_idx: 0 }];

        while let Some(frame) = dfs_stack.last_mut() {
            let reads = self.cell(frame.addr).map_or(&[][..], |c| c.reads());
            if frame.next_idx < reads.len() {
                let next = reads[frame.next_idx];
                frame.next_idx += 1;
                if needs_eval(next) && visited.insert(next) {
                    dfs_stack.push(Frame { addr: next, next_idx: 0 });
                }
            } else {
                let finished = dfs_stack.pop().map(|f| f.addr);
                if let Some(addr) = finished.filter(|a| *a != root) {
                    order.push(addr);
                }
            }
        }

        order
    }

    /// Check all invariants. Panics if any are violated.
    ///
    /// Only available in test builds.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        use crate::formula::CellLookup;
        use crate::value::Value;

        /// Evaluates formulas from scratch, ignoring every cache.
        struct Fresh<'a>(&'a Sheet);

        impl CellLookup for Fresh<'_> {
            fn get_value(&self, addr: Address) -> Value {
                match self.0.cell(addr).map(|c| c.content()) {
                    Some(CellContent::Formula { formula, .. }) => {
                        Value::from(formula.evaluate(self))
                    }
                    Some(_) => self.0.value_of(addr),
                    None => Value::default(),
                }
            }
        }

        let mut rows_end = 0;
        let mut cols_end = 0;

        for (addr, cell) in self.cells() {
            if !cell.is_empty() {
                rows_end = rows_end.max(addr.row + 1);
                cols_end = cols_end.max(addr.col + 1);
            }

            // Invariant 1: reads -> read_by
            for read in cell.reads() {
                let mirrored = match self.cell(*read) {
                    Some(target) => target.readers().contains(&addr),
                    None => self
                        .pending_readers()
                        .get(read)
                        .map_or(false, |s| s.contains(&addr)),
                };
                assert!(mirrored, "Missing read_by edge: {} should list {}", read, addr);
            }

            // Invariant 1: read_by -> reads
            for reader in cell.read_by() {
                assert!(
                    self.cell(reader).map_or(false, |r| r.reads().contains(&addr)),
                    "Stale read_by edge: {} lists {} which does not read it",
                    addr,
                    reader
                );
            }

            // Invariant 2: no cycle through this cell
            assert_eq!(self.find_cycle(addr, cell.reads()), None, "Cycle through {}", addr);

            // Invariant 4: uncached formulas have no cached dependents
            if cell.is_formula() && !cell.is_cached() {
                for reader in cell.read_by() {
                    assert!(
                        !self.cell(reader).map_or(false, |r| r.is_cached()),
                        "{} is cached but reads uncached {}",
                        reader,
                        addr
                    );
                }
            }

            // Invariant 3: cache equals a fresh evaluation
            if let (Some(cached), CellContent::Formula { formula, .. }) =
                (cell.cached(), cell.content())
            {
                assert_eq!(
                    Value::from(cached),
                    Value::from(formula.evaluate(&Fresh(self))),
                    "Stale cache at {}",
                    addr
                );
            }
        }

        // Invariant 5, and pending edges only for addresses without a cell
        for (addr, readers) in self.pending_readers() {
            assert!(self.cell(*addr).is_none(), "Pending readers for existing cell {}", addr);
            assert!(!readers.is_empty(), "Empty pending set stored for {}", addr);
            for reader in readers {
                assert!(
                    self.cell(*reader).map_or(false, |r| r.reads().contains(addr)),
                    "Stale pending edge: {} listed as reading {}",
                    reader,
                    addr
                );
            }
        }

        // Printable area is tight
        let size = self.printable_size();
        assert_eq!(size.rows, rows_end, "Printable rows not tight");
        assert_eq!(size.cols, cols_end, "Printable cols not tight");
    }
}

#[cfg(test)]
mod tests {
    use crate::address::{Address, Size, MAX_ROWS};
    use crate::error::SheetError;
    use crate::sheet::Sheet;
    use crate::value::Value;

    fn pos(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn sheet_with(cells: &[(&str, &str)]) -> Sheet {
        let mut sheet = Sheet::new();
        for (addr, text) in cells {
            sheet.set_cell(pos(addr), text).unwrap();
        }
        sheet.assert_consistent();
        sheet
    }

    fn value(sheet: &Sheet, s: &str) -> Value {
        sheet.value_at(pos(s)).unwrap()
    }

    fn is_cached(sheet: &Sheet, s: &str) -> bool {
        sheet.cell(pos(s)).map_or(false, |c| c.is_cached())
    }

    #[test]
    fn test_self_reference() {
        let mut sheet = Sheet::new();
        let err = sheet.set_cell(pos("A1"), "=A1").unwrap_err();
        assert_eq!(
            err,
            SheetError::CircularDependency { cell: pos("A1"), via: pos("A1") }
        );
        assert!(sheet.get_cell(pos("A1")).unwrap().is_none());
        assert_eq!(sheet.printable_size(), Size::new(0, 0));
        sheet.assert_consistent();
    }

    #[test]
    fn test_cycle_two_cell() {
        let mut sheet = sheet_with(&[("A1", "=B1")]);
        let err = sheet.set_cell(pos("B1"), "=A1").unwrap_err();
        assert_eq!(
            err,
            SheetError::CircularDependency { cell: pos("B1"), via: pos("A1") }
        );

        // The failed edit had no effect
        assert!(sheet.get_cell(pos("B1")).unwrap().is_none());
        assert_eq!(sheet.printable_size(), Size::new(1, 1));
        sheet.assert_consistent();
    }

    #[test]
    fn test_cycle_indirect() {
        // A1 -> B1 -> C1 -> D1, closing D1 -> A1 fails
        let mut sheet = sheet_with(&[("A1", "=B1"), ("B1", "=C1"), ("C1", "=D1+1")]);
        let err = sheet.set_cell(pos("D1"), "=5*A1").unwrap_err();
        assert!(matches!(err, SheetError::CircularDependency { cell, .. } if cell == pos("D1")));
        assert!(sheet.get_cell(pos("D1")).unwrap().is_none());
        sheet.assert_consistent();
    }

    #[test]
    fn test_cycle_rejected_on_existing_cell() {
        let mut sheet = sheet_with(&[("A1", "1"), ("B1", "=A1*2"), ("C1", "=B1+A1")]);
        assert_eq!(value(&sheet, "C1"), Value::Number(3.0));

        assert!(sheet.set_cell(pos("A1"), "=C1").is_err());
        assert_eq!(sheet.text_at(pos("A1")).unwrap(), "1");
        assert_eq!(value(&sheet, "C1"), Value::Number(3.0));
        // Caches survive a rejected edit
        assert!(is_cached(&sheet, "C1"));
        sheet.assert_consistent();
    }

    #[test]
    fn test_no_cycle_on_diamond() {
        //     A1
        //    /  \
        //   B1  C1
        //    \  /
        //     D1
        let sheet = sheet_with(&[
            ("A1", "2"),
            ("B1", "=A1+1"),
            ("C1", "=A1*10"),
            ("D1", "=B1+C1"),
        ]);
        assert_eq!(value(&sheet, "D1"), Value::Number(23.0));
        sheet.assert_consistent();
    }

    #[test]
    fn test_diamond_invalidation() {
        let mut sheet = sheet_with(&[
            ("A1", "2"),
            ("B1", "=A1+1"),
            ("C1", "=A1*10"),
            ("D1", "=B1+C1"),
        ]);
        assert_eq!(value(&sheet, "D1"), Value::Number(23.0));
        for addr in ["B1", "C1", "D1"] {
            assert!(is_cached(&sheet, addr));
        }

        sheet.set_cell(pos("A1"), "3").unwrap();
        for addr in ["B1", "C1", "D1"] {
            assert!(!is_cached(&sheet, addr), "{} should be invalidated", addr);
        }
        assert_eq!(value(&sheet, "D1"), Value::Number(34.0));
        sheet.assert_consistent();
    }

    #[test]
    fn test_invalidation_does_not_touch_unrelated_cells() {
        let mut sheet = sheet_with(&[
            ("A1", "1"),
            ("B1", "=A1"),
            ("A2", "2"),
            ("B2", "=A2"),
        ]);
        value(&sheet, "B1");
        value(&sheet, "B2");

        sheet.set_cell(pos("A1"), "10").unwrap();
        assert!(!is_cached(&sheet, "B1"));
        assert!(is_cached(&sheet, "B2"));
        sheet.assert_consistent();
    }

    #[test]
    fn test_rewiring() {
        // B1 = A1, then B1 = A2
        let mut sheet = sheet_with(&[("A1", "1"), ("A2", "2"), ("B1", "=A1")]);
        assert_eq!(value(&sheet, "B1"), Value::Number(1.0));

        sheet.set_cell(pos("B1"), "=A2").unwrap();
        assert_eq!(value(&sheet, "B1"), Value::Number(2.0));
        assert!(sheet.cell(pos("A1")).unwrap().read_by().next().is_none());
        assert_eq!(
            sheet.cell(pos("A2")).unwrap().read_by().collect::<Vec<_>>(),
            vec![pos("B1")]
        );

        // Editing the old precedent no longer affects B1
        sheet.set_cell(pos("A1"), "100").unwrap();
        assert!(is_cached(&sheet, "B1"));
        sheet.assert_consistent();
    }

    #[test]
    fn test_unwiring() {
        // B1 = A1, then B1 becomes text
        let mut sheet = sheet_with(&[("A1", "1"), ("B1", "=A1")]);
        sheet.set_cell(pos("B1"), "plain").unwrap();
        assert!(sheet.cell(pos("A1")).unwrap().read_by().next().is_none());
        assert!(sheet.cell(pos("B1")).unwrap().reads().is_empty());

        // And A1 may now read B1 without a cycle
        sheet.set_cell(pos("B1"), "4").unwrap();
        sheet.set_cell(pos("A1"), "=B1").unwrap();
        assert_eq!(value(&sheet, "A1"), Value::Number(4.0));
        sheet.assert_consistent();
    }

    #[test]
    fn test_clear_formula_unwires() {
        let mut sheet = sheet_with(&[("A1", "1"), ("B1", "=A1")]);
        sheet.clear_cell(pos("B1")).unwrap();
        assert!(sheet.cell(pos("A1")).unwrap().read_by().next().is_none());
        sheet.set_cell(pos("A1"), "=B1").unwrap();
        sheet.assert_consistent();
    }

    #[test]
    fn test_cleared_formula_dependents_invalidated() {
        let mut sheet = sheet_with(&[("A1", "=2*3"), ("B1", "=A1+1")]);
        assert_eq!(value(&sheet, "B1"), Value::Number(7.0));

        sheet.clear_cell(pos("A1")).unwrap();
        assert_eq!(value(&sheet, "B1"), Value::Number(1.0));
        sheet.assert_consistent();
    }

    #[test]
    fn test_phantom_edge_reconciled_on_creation() {
        // B1 reads A1 before A1 exists
        let mut sheet = sheet_with(&[("B1", "=A1+1")]);
        assert_eq!(value(&sheet, "B1"), Value::Number(1.0));
        assert!(is_cached(&sheet, "B1"));

        sheet.set_cell(pos("A1"), "41").unwrap();
        assert!(!is_cached(&sheet, "B1"));
        assert_eq!(value(&sheet, "B1"), Value::Number(42.0));
        assert_eq!(
            sheet.get_cell(pos("A1")).unwrap().unwrap().dependents(),
            vec![pos("B1")]
        );
        sheet.assert_consistent();
    }

    #[test]
    fn test_phantom_edge_survives_shrink() {
        // C1 is the last cell in row 0; A1 reads it
        let mut sheet = sheet_with(&[("A1", "=C1*2"), ("C1", "5")]);
        assert_eq!(value(&sheet, "A1"), Value::Number(10.0));

        // Clearing C1 shrinks it out of storage; the edge moves to pending
        sheet.clear_cell(pos("C1")).unwrap();
        assert!(sheet.cell(pos("C1")).is_none());
        assert_eq!(sheet.printable_size(), Size::new(1, 1));
        assert_eq!(value(&sheet, "A1"), Value::Number(0.0));
        sheet.assert_consistent();

        // Recreating C1 still invalidates A1
        sheet.set_cell(pos("C1"), "6").unwrap();
        assert_eq!(value(&sheet, "A1"), Value::Number(12.0));
        sheet.assert_consistent();
    }

    #[test]
    fn test_phantom_cycle_detected() {
        // A1 reads B1 before B1 exists; B1 = A1 must still be rejected
        let mut sheet = sheet_with(&[("A1", "=B1")]);
        assert!(matches!(
            sheet.set_cell(pos("B1"), "=A1"),
            Err(SheetError::CircularDependency { .. })
        ));
        sheet.assert_consistent();
    }

    #[test]
    fn test_uncached_dependents_of_uncached_cell() {
        let mut sheet = sheet_with(&[("A1", "1"), ("B1", "=A1"), ("C1", "=B1")]);
        // Nothing evaluated yet: the edit drops nothing but stays consistent
        sheet.set_cell(pos("A1"), "2").unwrap();
        assert_eq!(value(&sheet, "C1"), Value::Number(2.0));
        sheet.set_cell(pos("A1"), "3").unwrap();
        assert_eq!(value(&sheet, "C1"), Value::Number(3.0));
        sheet.assert_consistent();
    }

    #[test]
    fn test_warm_precedents_evaluates_in_order() {
        let sheet = sheet_with(&[("A1", "=B1+C1"), ("B1", "=C1*2"), ("C1", "=D1+1"), ("D1", "1")]);
        assert!(!is_cached(&sheet, "B1"));
        assert_eq!(
            sheet.uncached_precedents(pos("A1")),
            vec![pos("C1"), pos("B1")]
        );
        assert_eq!(value(&sheet, "A1"), Value::Number(6.0));
        for addr in ["A1", "B1", "C1"] {
            assert!(is_cached(&sheet, addr));
        }
        sheet.assert_consistent();
    }

    #[test]
    fn test_long_chain() {
        // A1 = A2+1, A2 = A3+1, ..., down the full height of the grid
        const N: usize = MAX_ROWS;
        let mut sheet = Sheet::new();
        for row in 0..N - 1 {
            let text = format!("={}+1", Address::new(row + 1, 0));
            sheet.set_cell(Address::new(row, 0), &text).unwrap();
        }
        sheet.set_cell(Address::new(N - 1, 0), "0").unwrap();

        assert_eq!(
            sheet.value_at(Address::new(0, 0)).unwrap(),
            Value::Number((N - 1) as f64)
        );

        // Changing the tail invalidates the whole chain
        sheet.set_cell(Address::new(N - 1, 0), "1").unwrap();
        assert_eq!(
            sheet.value_at(Address::new(0, 0)).unwrap(),
            Value::Number(N as f64)
        );

        // Closing the loop is found without recursion
        let err = sheet.set_cell(Address::new(N - 1, 0), "=A1").unwrap_err();
        assert!(matches!(err, SheetError::CircularDependency { .. }));
        assert_eq!(sheet.printable_size(), Size::new(N, 1));
    }
}
