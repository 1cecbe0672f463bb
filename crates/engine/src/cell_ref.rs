//! Stable cell identity.
//!
//! A `CellRef` is a handle to a cell slot owned by the sheet. Handles are
//! assigned monotonically and never reused, so an edge set holding one can
//! never silently alias a different cell. Edge sets store handles, never
//! ownership: destruction always goes through the sheet.

use std::fmt;

/// Opaque handle to a cell slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef(u32);

impl CellRef {
    pub(crate) fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell#{}", self.0)
    }
}
