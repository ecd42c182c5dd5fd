//! Test harness for sheet operations with invariant tracking.
//!
//! This module provides `SheetHarness`, a wrapper around `Sheet` that:
//! - Applies scripted `Op`s and records which were rejected
//! - Checks every graph invariant after each op
//! - Keeps a shadow copy of the expected cell texts
//!
//! Use this harness to drive long random edit sequences through the engine.

use rustc_hash::FxHashMap;

use crate::address::Address;
use crate::error::SheetError;
use crate::sheet::Sheet;

/// Operation to apply to a sheet.
#[derive(Debug, Clone)]
pub enum Op {
    /// Set a cell's text (formulas start with `=`).
    Set { addr: Address, text: String },
    /// Clear a cell.
    Clear { addr: Address },
    /// Read a cell's value, filling caches along the way.
    Read { addr: Address },
}

/// Result of applying operations.
#[derive(Debug, Default)]
pub struct ApplyResult {
    /// Number of ops that succeeded.
    pub applied: usize,
    /// Ops that were rejected, with their errors.
    pub rejected: Vec<(usize, SheetError)>,
}

/// Test harness wrapping `Sheet` with a text model.
pub struct SheetHarness {
    sheet: Sheet,
    /// Input and stored text of every non-empty cell.
    texts: FxHashMap<Address, (String, String)>,
}

impl SheetHarness {
    pub fn new() -> Self {
        Self {
            sheet: Sheet::new(),
            texts: FxHashMap::default(),
        }
    }

    pub fn sheet(&self) -> &Sheet {
        &self.sheet
    }

    /// Apply `ops` in order. A rejected op must leave the sheet unchanged,
    /// and the remaining ops still run.
    pub fn apply_ops(&mut self, ops: &[Op]) -> ApplyResult {
        let mut result = ApplyResult::default();

        for (idx, op) in ops.iter().enumerate() {
            match self.apply_single_op(op) {
                Ok(()) => result.applied += 1,
                Err(e) => result.rejected.push((idx, e)),
            }
            self.check();
        }

        result
    }

    fn apply_single_op(&mut self, op: &Op) -> Result<(), SheetError> {
        match op {
            Op::Set { addr, text } => {
                let before = self.sheet.text_at(*addr).ok();
                match self.sheet.set_cell(*addr, text) {
                    Ok(()) => {
                        let stored = self.sheet.text_at(*addr)?;
                        if stored.is_empty() {
                            self.texts.remove(addr);
                        } else {
                            self.texts.insert(*addr, (text.clone(), stored));
                        }
                        Ok(())
                    }
                    Err(e) => {
                        assert_eq!(
                            self.sheet.text_at(*addr).ok(),
                            before,
                            "Rejected edit of {} changed its text",
                            addr
                        );
                        Err(e)
                    }
                }
            }
            Op::Clear { addr } => {
                self.sheet.clear_cell(*addr)?;
                self.texts.remove(addr);
                Ok(())
            }
            Op::Read { addr } => self.sheet.value_at(*addr).map(|_| ()),
        }
    }

    /// Graph invariants hold and every stored text matches the model.
    pub fn check(&self) {
        self.sheet.assert_consistent();

        for (addr, (_, stored)) in &self.texts {
            assert_eq!(
                &self.sheet.text_at(*addr).unwrap_or_default(),
                stored,
                "Text drift at {}",
                addr
            );
        }
        let stored = self
            .sheet
            .cells()
            .filter(|(_, cell)| !cell.is_empty())
            .count();
        assert_eq!(stored, self.texts.len(), "Unexpected non-empty cells");
    }

    /// A sheet rebuilt from the inputs of the current cells shows the same
    /// values.
    pub fn assert_rebuild_matches(&self) {
        let mut rebuilt = Sheet::new();
        for (addr, (text, _)) in &self.texts {
            if let Err(e) = rebuilt.set_cell(*addr, text) {
                panic!("Rebuilding {} from {:?} failed: {}", addr, text, e);
            }
        }
        rebuilt.assert_consistent();

        let mut expected = Vec::new();
        let mut actual = Vec::new();
        self.sheet.print_values(&mut expected).unwrap_or_default();
        rebuilt.print_values(&mut actual).unwrap_or_default();
        assert_eq!(
            String::from_utf8_lossy(&actual),
            String::from_utf8_lossy(&expected),
            "Rebuilt sheet disagrees"
        );
    }
}

impl Default for SheetHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const GRID: usize = 4;

    fn pos(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn set(addr: &str, text: &str) -> Op {
        Op::Set {
            addr: pos(addr),
            text: text.to_string(),
        }
    }

    fn config() -> ProptestConfig {
        ProptestConfig {
            cases: std::env::var("PROPTEST_CASES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(256),
            failure_persistence: None,
            ..ProptestConfig::default()
        }
    }

    fn arb_addr() -> impl Strategy<Value = Address> {
        (0..GRID, 0..GRID).prop_map(|(row, col)| Address::new(row, col))
    }

    fn arb_operand() -> impl Strategy<Value = String> {
        prop_oneof![
            4 => arb_addr().prop_map(|a| a.to_string()),
            2 => (0u8..10).prop_map(|n| n.to_string()),
            1 => Just("XFE1".to_string()),
        ]
    }

    fn arb_formula() -> impl Strategy<Value = String> {
        (
            arb_operand(),
            proptest::collection::vec(
                (prop::sample::select(vec!["+", "-", "*", "/"]), arb_operand()),
                0..3,
            ),
        )
            .prop_map(|(first, rest)| {
                let mut text = format!("={}", first);
                for (op, operand) in rest {
                    text.push_str(op);
                    text.push_str(&operand);
                }
                text
            })
    }

    fn arb_text() -> impl Strategy<Value = String> {
        prop_oneof![
            6 => arb_formula(),
            3 => (-5i32..20).prop_map(|n| n.to_string()),
            1 => Just("meow".to_string()),
            1 => Just("'=A1".to_string()),
            1 => Just("=".to_string()),
            1 => Just(String::new()),
            1 => Just("=1+".to_string()),
        ]
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            6 => (arb_addr(), arb_text()).prop_map(|(addr, text)| Op::Set { addr, text }),
            2 => arb_addr().prop_map(|addr| Op::Clear { addr }),
            3 => arb_addr().prop_map(|addr| Op::Read { addr }),
        ]
    }

    #[test]
    fn test_rejected_ops_are_reported() {
        let mut h = SheetHarness::new();
        let result = h.apply_ops(&[
            set("A1", "=B1"),
            set("B1", "=A1"),
            set("C1", "=1+"),
            set("C1", "3"),
            Op::Read { addr: pos("A1") },
        ]);

        assert_eq!(result.applied, 3);
        assert_eq!(result.rejected.len(), 2);
        assert_eq!(result.rejected[0].0, 1);
        assert_eq!(result.rejected[0].1.code(), "circular_dependency");
        assert_eq!(result.rejected[1].0, 2);
        assert_eq!(result.rejected[1].1.code(), "formula_syntax");
        h.assert_rebuild_matches();
    }

    #[test]
    fn test_invalid_position_is_rejected() {
        let mut h = SheetHarness::new();
        let result = h.apply_ops(&[
            Op::Set {
                addr: Address::NONE,
                text: "1".to_string(),
            },
            Op::Clear { addr: Address::NONE },
        ]);
        assert_eq!(result.applied, 0);
        assert!(result
            .rejected
            .iter()
            .all(|(_, e)| matches!(e, SheetError::InvalidPosition(_))));
    }

    #[test]
    fn test_clear_round_trip() {
        let mut h = SheetHarness::new();
        h.apply_ops(&[
            set("A1", "1"),
            set("B2", "=A1*2"),
            Op::Read { addr: pos("B2") },
            Op::Clear { addr: pos("B2") },
            Op::Clear { addr: pos("A1") },
        ]);
        assert_eq!(h.sheet().cell_count(), 0);
        assert!(h.sheet().printable_size().is_empty());
    }

    proptest! {
        #![proptest_config(config())]
        #[test]
        fn random_edits_keep_invariants(ops in proptest::collection::vec(arb_op(), 1..60)) {
            let mut h = SheetHarness::new();
            let result = h.apply_ops(&ops);
            prop_assert_eq!(result.applied + result.rejected.len(), ops.len());
            h.assert_rebuild_matches();
        }

        #[test]
        fn reads_do_not_change_values(
            ops in proptest::collection::vec(arb_op(), 1..40),
            reads in proptest::collection::vec(arb_addr(), 1..8),
        ) {
            let mut h = SheetHarness::new();
            h.apply_ops(&ops);

            let mut before = Vec::new();
            h.sheet().print_values(&mut before).unwrap();
            h.apply_ops(&reads.into_iter().map(|addr| Op::Read { addr }).collect::<Vec<_>>());
            let mut after = Vec::new();
            h.sheet().print_values(&mut after).unwrap();

            prop_assert_eq!(before, after);
        }
    }
}
