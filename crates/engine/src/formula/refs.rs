//! Reference extraction from formula AST.
//!
//! Produces the addresses a formula reads, which become its outgoing edges
//! in the dependency graph.

use crate::address::Address;

use super::parser::Expr;

/// Extract the in-grid cell references of an expression.
///
/// Sorted by (row, col) and deduplicated so edge sets are reproducible.
/// Out-of-grid references are skipped; they evaluate to `#REF!` and can
/// never take part in a cycle.
pub fn extract_refs(expr: &Expr) -> Vec<Address> {
    let mut refs = Vec::new();
    collect_refs(expr, &mut refs);
    refs.sort_by_key(|a| (a.row, a.col));
    refs.dedup();
    refs
}

fn collect_refs(expr: &Expr, refs: &mut Vec<Address>) {
    match expr {
        Expr::Number(_) => {}
        Expr::CellRef(addr) => {
            if addr.is_valid() {
                refs.push(*addr);
            }
        }
        Expr::Unary { operand, .. } => collect_refs(operand, refs),
        Expr::BinaryOp { left, right, .. } => {
            collect_refs(left, refs);
            collect_refs(right, refs);
        }
    }
}
