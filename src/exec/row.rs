//! Borrowed views of input and shadow rows.

use std::fmt;

use super::block::{RowKind, SharedItemBlock};
use super::register::RegisterId;
use super::value::Value;

/// Read-only view of one row inside a shared block.
///
/// Cloning is cheap and keeps the block alive. A row that has not been
/// fetched yet is modeled as `Option<InputRow>`.
#[derive(Clone)]
pub struct InputRow {
    block: SharedItemBlock,
    index: usize,
}

impl InputRow {
    pub(crate) fn new(block: SharedItemBlock, index: usize) -> Self {
        debug_assert!(index < block.rows());
        Self { block, index }
    }

    /// Reads a register.
    pub fn value(&self, reg: RegisterId) -> &Value {
        self.block.value(self.index, reg)
    }

    /// All registers of the row.
    pub fn values(&self) -> &[Value] {
        self.block.row_values(self.index)
    }

    /// Number of registers.
    pub fn regs(&self) -> usize {
        self.block.regs()
    }

    /// Tag of the row.
    pub fn kind(&self) -> RowKind {
        self.block.kind(self.index)
    }

    /// True if this is a shadow row.
    pub fn is_shadow_row(&self) -> bool {
        self.kind().shadow_depth().is_some()
    }

    /// Identity comparison: same block and same index.
    pub fn is_same_block_and_index(&self, other: &InputRow) -> bool {
        self.index == other.index && self.block.ptr_eq(&other.block)
    }

    /// Value comparison over every register; `NaN` never compares equal.
    pub fn equals(&self, other: &InputRow) -> bool {
        self.values() == other.values()
    }

    /// Position inside the block.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The block the row lives in.
    pub fn block(&self) -> &SharedItemBlock {
        &self.block
    }
}

impl fmt::Debug for InputRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputRow")
            .field("index", &self.index)
            .field("kind", &self.kind())
            .field("values", &self.values())
            .finish()
    }
}

/// Input row known to be a shadow row.
#[derive(Clone, Debug)]
pub struct ShadowRow {
    row: InputRow,
    depth: usize,
}

impl ShadowRow {
    /// Wraps `row` if it is tagged as shadow row.
    pub fn from_input(row: InputRow) -> Option<Self> {
        let depth = row.kind().shadow_depth()?;
        Some(Self { row, depth })
    }

    /// Nesting depth; 0 closes a run of the innermost subquery.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// True if the row closes a run of the level the reading stage works on.
    pub fn is_relevant(&self) -> bool {
        self.depth == 0
    }

    /// Reads a register.
    pub fn value(&self, reg: RegisterId) -> &Value {
        self.row.value(reg)
    }

    /// Underlying row view.
    pub fn as_input_row(&self) -> &InputRow {
        &self.row
    }

    /// Value comparison over every register.
    pub fn equals(&self, other: &ShadowRow) -> bool {
        self.depth == other.depth && self.row.equals(&other.row)
    }
}
