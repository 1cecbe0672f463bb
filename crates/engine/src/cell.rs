//! Cell content, result cache, and dependency edge sets.

use rustc_hash::FxHashSet;

use crate::cell_ref::CellRef;
use crate::formula::{Formula, Value};
use crate::position::Position;

/// Marks input as a formula when it is the first character.
pub const FORMULA_MARKER: char = '=';
/// A leading apostrophe keeps the rest as literal text in the cell's value.
pub const ESCAPE_MARKER: char = '\'';

/// What a cell holds. Immutable once constructed; replaced wholesale on
/// every edit.
#[derive(Debug, Clone, Default)]
pub enum CellContent {
    #[default]
    Empty,
    Text(String),
    Formula(Formula),
}

impl CellContent {
    /// Classify raw input.
    ///
    /// `=expr` compiles as a formula; a lone `=` is literal text; empty
    /// input is `Empty`; everything else is text, kept verbatim.
    pub fn parse(input: &str) -> Result<CellContent, String> {
        if input.is_empty() {
            return Ok(CellContent::Empty);
        }
        let mut chars = input.chars();
        if chars.next() == Some(FORMULA_MARKER) && chars.next().is_some() {
            let formula = Formula::compile(&input[1..])?;
            return Ok(CellContent::Formula(formula));
        }
        Ok(CellContent::Text(input.to_string()))
    }

    /// Positions this content reads (empty unless a formula).
    pub fn references(&self) -> &[Position] {
        match self {
            CellContent::Formula(f) => f.references(),
            _ => &[],
        }
    }
}

/// One cell of the sheet.
///
/// Owns one content variant, an optional cached evaluation result, and the
/// two edge sets tying it into the dependency graph: `referenced` holds the
/// cells this cell's formula reads, `dependents` the cells whose formulas
/// read this one. The sheet maintains three invariants across edits:
///
/// 1. **Edge symmetry:** A ∈ B.dependents ⟺ B ∈ A.referenced.
/// 2. **Acyclicity:** no cell transitively references itself.
/// 3. **Cache coherence:** a present cache equals what re-evaluating now
///    would produce; a cell whose transitive inputs changed holds no cache.
#[derive(Debug, Clone, Default)]
pub struct Cell {
    content: CellContent,
    cache: Option<Value>,
    pub(crate) referenced: FxHashSet<CellRef>,
    pub(crate) dependents: FxHashSet<CellRef>,
}

impl Cell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self) -> &CellContent {
        &self.content
    }

    pub(crate) fn set_content(&mut self, content: CellContent) {
        self.content = content;
    }

    /// The editable source form: text verbatim, formulas with their marker.
    pub fn text(&self) -> String {
        match &self.content {
            CellContent::Empty => String::new(),
            CellContent::Text(s) => s.clone(),
            CellContent::Formula(f) => format!("{}{}", FORMULA_MARKER, f.text()),
        }
    }

    /// True if the cell renders as blank (counts for the printable box).
    pub fn is_blank(&self) -> bool {
        matches!(self.content, CellContent::Empty)
    }

    /// The value of non-formula content: empty string for `Empty`, text with
    /// a leading escape marker stripped. `None` for formulas, whose value
    /// comes from evaluation.
    pub fn literal_value(&self) -> Option<Value> {
        match &self.content {
            CellContent::Empty => Some(Value::empty()),
            CellContent::Text(s) => Some(Value::Text(
                s.strip_prefix(ESCAPE_MARKER).unwrap_or(s).to_string(),
            )),
            CellContent::Formula(_) => None,
        }
    }

    /// Positions this cell's formula reads (empty for non-formulas).
    pub fn referenced_positions(&self) -> &[Position] {
        self.content.references()
    }

    /// Cached evaluation result, if current.
    pub fn cached_value(&self) -> Option<&Value> {
        self.cache.as_ref()
    }

    pub(crate) fn set_cache(&mut self, value: Value) {
        self.cache = Some(value);
    }

    pub(crate) fn clear_cache(&mut self) {
        self.cache = None;
    }

    /// Number of cells whose formulas read this one.
    pub fn dependent_count(&self) -> usize {
        self.dependents.len()
    }
}
