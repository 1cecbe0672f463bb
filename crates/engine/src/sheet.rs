//! The sheet: cell storage, lifecycle, and the dependency machinery.
//!
//! Cells live in a slot arena keyed by stable [`CellRef`] handles, with a
//! position index mapping coordinates to slots. There is no graph object:
//! the dependency graph is exactly the `referenced`/`dependents` sets inside
//! each cell. The traversals (cycle check, edge diff, invalidation) live
//! here because they span many cells, while the edges stay per cell.
//!
//! # Edit protocol
//!
//! `set_cell` validates fully before touching anything: syntax, then
//! reference range, then the would-be cycle. Only a fully valid edit
//! commits, and a commit is: ensure slots exist, swap dependency edges,
//! install the content, invalidate downstream caches. A rejected edit is
//! unobservable.
//!
//! # Invariants
//!
//! 1. **Edge symmetry:** A ∈ B.dependents ⟺ B ∈ A.referenced, restored by
//!    `update_dependencies` before any caller can observe the sheet again.
//! 2. **Acyclicity:** `creates_cycle` runs over the proposed reference list
//!    before commit, so no intermediate state ever contains a cycle.
//! 3. **Cache coherence:** any content change clears the caches of the
//!    edited cell and everything transitively downstream of it; nothing
//!    re-evaluates until the next read.

use std::io::{self, Write};

use log::{debug, trace};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::cell::{Cell, CellContent};
use crate::cell_ref::CellRef;
use crate::error::SheetError;
use crate::formula::{CellResolver, Formula, FormulaError, Value};
use crate::position::{Position, Size};

/// A single spreadsheet: owns every cell, keyed by position.
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    slots: FxHashMap<CellRef, Cell>,
    index: FxHashMap<Position, CellRef>,
    next_ref: u32,
    printable: Size,
    evals: u64,
}

impl Sheet {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Edits
    // =========================================================================

    /// Set the cell at `pos` from raw input.
    ///
    /// Fails without any state change on an invalid target position, a
    /// formula that does not compile, a reference outside the sheet bounds,
    /// or an edit that would create a reference cycle.
    pub fn set_cell(&mut self, pos: Position, input: &str) -> Result<(), SheetError> {
        if !pos.is_valid() {
            return Err(SheetError::InvalidPosition(pos));
        }
        let content = CellContent::parse(input).map_err(SheetError::Syntax)?;
        let new_refs = content.references().to_vec();
        if let Some(&out_of_range) = new_refs.iter().find(|p| !p.is_valid()) {
            return Err(SheetError::InvalidPosition(out_of_range));
        }
        if self.creates_cycle(pos, &new_refs) {
            return Err(SheetError::Circular(pos));
        }

        let cell_ref = self.ensure_cell(pos);
        let was_blank = self.slots[&cell_ref].is_blank();
        let blank = matches!(content, CellContent::Empty);
        self.update_dependencies(cell_ref, &new_refs);
        self.slots.get_mut(&cell_ref).unwrap().set_content(content);
        self.invalidate_from(cell_ref);
        debug!("set {} ({} refs)", pos, new_refs.len());

        if !blank {
            self.printable.expand_to(pos);
        } else if !was_blank {
            self.recalc_printable();
        }
        Ok(())
    }

    /// Clear the cell at `pos`.
    ///
    /// Equivalent to setting empty content: full edge teardown plus
    /// downstream invalidation. The slot itself is freed only once nothing
    /// references it, so dependent formulas keep a live anchor.
    pub fn clear_cell(&mut self, pos: Position) -> Result<(), SheetError> {
        if !pos.is_valid() {
            return Err(SheetError::InvalidPosition(pos));
        }
        let Some(&cell_ref) = self.index.get(&pos) else {
            return Ok(());
        };
        self.update_dependencies(cell_ref, &[]);
        self.slots
            .get_mut(&cell_ref)
            .unwrap()
            .set_content(CellContent::Empty);
        self.invalidate_from(cell_ref);
        if self.slots[&cell_ref].dependents.is_empty() {
            self.slots.remove(&cell_ref);
            self.index.remove(&pos);
            trace!("freed {} at {}", cell_ref, pos);
        }
        self.recalc_printable();
        debug!("cleared {}", pos);
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Look up the cell at `pos`. `Ok(None)` for a valid, unoccupied
    /// position.
    pub fn get_cell(&self, pos: Position) -> Result<Option<&Cell>, SheetError> {
        if !pos.is_valid() {
            return Err(SheetError::InvalidPosition(pos));
        }
        Ok(self.index.get(&pos).map(|r| &self.slots[r]))
    }

    /// Current value of the cell at `pos`, computing and caching formula
    /// results on demand. Absent cells read as the empty text value.
    pub fn value(&mut self, pos: Position) -> Result<Value, SheetError> {
        if !pos.is_valid() {
            return Err(SheetError::InvalidPosition(pos));
        }
        Ok(self.value_unchecked(pos))
    }

    /// Editable source form of the cell at `pos` ("" when absent).
    pub fn text(&self, pos: Position) -> Result<String, SheetError> {
        if !pos.is_valid() {
            return Err(SheetError::InvalidPosition(pos));
        }
        Ok(self
            .index
            .get(&pos)
            .map(|r| self.slots[r].text())
            .unwrap_or_default())
    }

    /// Positions referenced by the formula at `pos` (empty otherwise).
    pub fn referenced_cells(&self, pos: Position) -> Result<Vec<Position>, SheetError> {
        if !pos.is_valid() {
            return Err(SheetError::InvalidPosition(pos));
        }
        Ok(self
            .index
            .get(&pos)
            .map(|r| self.slots[r].referenced_positions().to_vec())
            .unwrap_or_default())
    }

    /// Smallest extent covering every cell with non-blank text.
    pub fn printable_size(&self) -> Size {
        self.printable
    }

    /// Number of live cell slots (including empty anchors for referenced,
    /// never-set positions).
    pub fn cell_count(&self) -> usize {
        self.slots.len()
    }

    /// Formula evaluations performed so far; cache hits do not count.
    pub fn evals_performed(&self) -> u64 {
        self.evals
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Render evaluated results, tab-separated, up to the printable extent.
    pub fn print_values<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        let size = self.printable;
        for row in 0..size.rows {
            for col in 0..size.cols {
                if col > 0 {
                    out.write_all(b"\t")?;
                }
                let pos = Position::new(row, col);
                if self.index.contains_key(&pos) {
                    let value = self.value_unchecked(pos);
                    write!(out, "{}", value.to_display())?;
                }
            }
            out.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Render source texts, tab-separated, up to the printable extent.
    pub fn print_texts<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let size = self.printable;
        for row in 0..size.rows {
            for col in 0..size.cols {
                if col > 0 {
                    out.write_all(b"\t")?;
                }
                let pos = Position::new(row, col);
                if let Some(cell_ref) = self.index.get(&pos) {
                    write!(out, "{}", self.slots[cell_ref].text())?;
                }
            }
            out.write_all(b"\n")?;
        }
        Ok(())
    }

    // =========================================================================
    // Dependency machinery
    // =========================================================================

    fn ensure_cell(&mut self, pos: Position) -> CellRef {
        if let Some(&cell_ref) = self.index.get(&pos) {
            return cell_ref;
        }
        let cell_ref = CellRef::from_raw(self.next_ref);
        self.next_ref += 1;
        self.slots.insert(cell_ref, Cell::new());
        self.index.insert(pos, cell_ref);
        cell_ref
    }

    /// Would installing `new_refs` at `pos` close a reference loop?
    ///
    /// Walks existing `referenced` edges outward from every proposed
    /// reference; reaching the edited cell means the new edges would
    /// complete a cycle. The edited cell's own current edges are irrelevant
    /// here — the new content is not linked yet. Self-reference is the
    /// one-edge case of the same check.
    fn creates_cycle(&self, pos: Position, new_refs: &[Position]) -> bool {
        if new_refs.contains(&pos) {
            return true;
        }
        let Some(&target) = self.index.get(&pos) else {
            // Nothing can reference a cell that does not exist yet.
            return false;
        };
        let mut visited: FxHashSet<CellRef> = FxHashSet::default();
        let mut stack: Vec<CellRef> = new_refs
            .iter()
            .filter_map(|p| self.index.get(p).copied())
            .collect();
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            stack.extend(self.slots[&current].referenced.iter().copied());
        }
        false
    }

    /// Swap the cell's outgoing edges to `new_refs`, diffing against the old
    /// set so every neighbor's `dependents` stays symmetric. Referenced
    /// positions get an empty anchor cell if not yet occupied. Runs only
    /// after the cycle check has passed.
    fn update_dependencies(&mut self, cell_ref: CellRef, new_refs: &[Position]) {
        let new_set: FxHashSet<CellRef> =
            new_refs.iter().map(|&p| self.ensure_cell(p)).collect();
        let old_set = std::mem::take(&mut self.slots.get_mut(&cell_ref).unwrap().referenced);
        for gone in old_set.difference(&new_set) {
            self.slots.get_mut(gone).unwrap().dependents.remove(&cell_ref);
        }
        for added in new_set.difference(&old_set) {
            self.slots.get_mut(added).unwrap().dependents.insert(cell_ref);
        }
        self.slots.get_mut(&cell_ref).unwrap().referenced = new_set;
    }

    /// Clear the cache of `start` and of every cell reachable over
    /// `dependents` edges, each exactly once. Pure invalidation: nothing
    /// re-evaluates until the next read.
    fn invalidate_from(&mut self, start: CellRef) {
        let mut visited: FxHashSet<CellRef> = FxHashSet::default();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let cell = self.slots.get_mut(&current).unwrap();
            cell.clear_cache();
            stack.extend(cell.dependents.iter().copied());
        }
        trace!("invalidated {} cells", visited.len());
    }

    fn recalc_printable(&mut self) {
        let mut size = Size::default();
        for (&pos, cell_ref) in &self.index {
            if !self.slots[cell_ref].is_blank() {
                size.expand_to(pos);
            }
        }
        self.printable = size;
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    fn value_unchecked(&mut self, pos: Position) -> Value {
        match self.index.get(&pos).copied() {
            Some(cell_ref) => self.eval_slot(cell_ref),
            None => Value::empty(),
        }
    }

    fn eval_slot(&mut self, cell_ref: CellRef) -> Value {
        enum Step {
            Ready(Value),
            Eval(Formula),
        }
        let step = {
            let cell = &self.slots[&cell_ref];
            match cell.content() {
                CellContent::Formula(f) => match cell.cached_value() {
                    Some(value) => Step::Ready(value.clone()),
                    None => Step::Eval(f.clone()),
                },
                _ => Step::Ready(cell.literal_value().unwrap()),
            }
        };
        match step {
            Step::Ready(value) => value,
            Step::Eval(formula) => {
                self.evals += 1;
                let value = formula.evaluate(self);
                self.slots
                    .get_mut(&cell_ref)
                    .unwrap()
                    .set_cache(value.clone());
                value
            }
        }
    }

    // =========================================================================
    // Auditing
    // =========================================================================

    /// Audit the graph invariants: edge symmetry in both directions,
    /// acyclicity of `referenced`, and caches only on formula cells.
    ///
    /// Intended for tests and debugging; linear in cells plus edges.
    pub fn check_consistency(&self) -> Result<(), String> {
        for (&cell_ref, cell) in &self.slots {
            for referenced in &cell.referenced {
                let neighbor = self.slots.get(referenced).ok_or_else(|| {
                    format!("{} references freed slot {}", cell_ref, referenced)
                })?;
                if !neighbor.dependents.contains(&cell_ref) {
                    return Err(format!(
                        "asymmetric edge: {} references {} without a back edge",
                        cell_ref, referenced
                    ));
                }
            }
            for dependent in &cell.dependents {
                let neighbor = self.slots.get(dependent).ok_or_else(|| {
                    format!("{} depended on by freed slot {}", cell_ref, dependent)
                })?;
                if !neighbor.referenced.contains(&cell_ref) {
                    return Err(format!(
                        "asymmetric edge: {} depended on by {} without a forward edge",
                        cell_ref, dependent
                    ));
                }
            }
            if cell.cached_value().is_some()
                && !matches!(cell.content(), CellContent::Formula(_))
            {
                return Err(format!("{} caches a value without a formula", cell_ref));
            }
        }

        // Acyclicity: iterative DFS over `referenced` with a path set.
        let mut done: FxHashSet<CellRef> = FxHashSet::default();
        for &root in self.slots.keys() {
            if done.contains(&root) {
                continue;
            }
            let mut on_path: FxHashSet<CellRef> = FxHashSet::default();
            let mut stack: Vec<(CellRef, bool)> = vec![(root, false)];
            while let Some((node, leaving)) = stack.pop() {
                if leaving {
                    on_path.remove(&node);
                    done.insert(node);
                    continue;
                }
                if done.contains(&node) {
                    continue;
                }
                if !on_path.insert(node) {
                    return Err(format!("reference cycle through {}", node));
                }
                stack.push((node, true));
                for &next in &self.slots[&node].referenced {
                    if on_path.contains(&next) {
                        return Err(format!("reference cycle through {}", next));
                    }
                    if !done.contains(&next) {
                        stack.push((next, false));
                    }
                }
            }
        }
        Ok(())
    }
}

impl CellResolver for Sheet {
    fn cell_value(&mut self, pos: Position) -> Value {
        if !pos.is_valid() {
            return Value::Error(FormulaError::Ref);
        }
        self.value_unchecked(pos)
    }
}
