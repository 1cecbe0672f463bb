//! Engine error types.
//!
//! These are rejected-edit errors: every variant guarantees the sheet was
//! left exactly as it was. Computation failures are not errors — they travel
//! through the graph as [`Value::Error`](crate::formula::Value) data.

use thiserror::Error;

use crate::position::Position;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SheetError {
    /// The target or a referenced position lies outside the sheet bounds.
    #[error("invalid position {0}")]
    InvalidPosition(Position),

    /// Formula text failed to compile.
    #[error("formula syntax error: {0}")]
    Syntax(String),

    /// The edit would make the reference graph cyclic.
    #[error("circular reference: setting {0} would make it depend on itself")]
    Circular(Position),
}
