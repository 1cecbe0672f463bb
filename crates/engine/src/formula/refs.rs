//! Reference extraction from a formula AST.

use rustc_hash::FxHashSet;

use crate::position::Position;

use super::parser::Expr;

/// Collect every cell reference in the expression, deduplicated and sorted.
///
/// Reference lists are sets: a formula naming A1 twice depends on A1 once.
/// Sorting keeps dependency iteration deterministic.
pub fn extract_positions(expr: &Expr) -> Vec<Position> {
    let mut seen = FxHashSet::default();
    collect(expr, &mut seen);
    let mut refs: Vec<Position> = seen.into_iter().collect();
    refs.sort();
    refs
}

fn collect(expr: &Expr, refs: &mut FxHashSet<Position>) {
    match expr {
        Expr::Number(_) => {}
        Expr::Ref(pos) => {
            refs.insert(*pos);
        }
        Expr::Unary { operand, .. } => collect(operand, refs),
        Expr::Binary { left, right, .. } => {
            collect(left, refs);
            collect(right, refs);
        }
    }
}
