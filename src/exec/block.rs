//! Row x register value matrices.
//!
//! A block is written by exactly one [`ItemBlockBuilder`] and then frozen into
//! a [`SharedItemBlock`] that any number of input rows may alias. The buffers
//! go back to the owning [`BlockManager`](super::block_manager::BlockManager)
//! when the last handle drops.

use std::fmt;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

use super::block_manager::PoolInner;
use super::value::Value;
use crate::error::{ExecError, Result};

/// Tag of a row inside a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RowKind {
    /// Regular row of the current nesting level.
    #[default]
    Data,
    /// Marks the end of one subquery run; `depth` 0 is the innermost level.
    Shadow {
        /// Number of subquery levels between this row and the current one.
        depth: usize,
    },
}

impl RowKind {
    /// Depth if this is a shadow row.
    pub fn shadow_depth(&self) -> Option<usize> {
        match self {
            RowKind::Data => None,
            RowKind::Shadow { depth } => Some(*depth),
        }
    }
}

pub(crate) struct BlockStorage {
    values: Vec<Value>,
    kinds: Vec<RowKind>,
    regs: usize,
    pool: Weak<PoolInner>,
}

impl BlockStorage {
    pub(crate) fn from_buffers(
        mut values: Vec<Value>,
        mut kinds: Vec<RowKind>,
        rows: usize,
        regs: usize,
        pool: Weak<PoolInner>,
    ) -> Self {
        values.clear();
        values.resize(rows * regs, Value::Null);
        kinds.clear();
        kinds.resize(rows, RowKind::Data);
        Self {
            values,
            kinds,
            regs,
            pool,
        }
    }

    fn rows(&self) -> usize {
        self.kinds.len()
    }

    fn offset(&self, row: usize, reg: usize) -> usize {
        debug_assert!(row < self.rows(), "row {row} out of {}", self.rows());
        debug_assert!(reg < self.regs, "register {reg} out of {}", self.regs);
        row * self.regs + reg
    }
}

impl Drop for BlockStorage {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.release(
                std::mem::take(&mut self.values),
                std::mem::take(&mut self.kinds),
            );
        }
    }
}

/// Exclusive writer of a fresh block.
pub struct ItemBlockBuilder {
    storage: BlockStorage,
}

impl ItemBlockBuilder {
    /// Allocates an unpooled block of `rows` data rows with every register
    /// set to null.
    pub fn new(rows: usize, regs: usize) -> Self {
        Self::from_storage(BlockStorage::from_buffers(
            Vec::new(),
            Vec::new(),
            rows,
            regs,
            Weak::new(),
        ))
    }

    pub(crate) fn from_storage(storage: BlockStorage) -> Self {
        Self { storage }
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.storage.rows()
    }

    /// Number of registers per row.
    pub fn regs(&self) -> usize {
        self.storage.regs
    }

    /// Reads a register.
    pub fn value(&self, row: usize, reg: usize) -> &Value {
        &self.storage.values[self.storage.offset(row, reg)]
    }

    /// Writes a register.
    pub fn set_value(&mut self, row: usize, reg: usize, value: Value) {
        let idx = self.storage.offset(row, reg);
        self.storage.values[idx] = value;
    }

    /// Tag of a row.
    pub fn kind(&self, row: usize) -> RowKind {
        self.storage.kinds[row]
    }

    /// Tags a row as data or shadow row.
    pub fn set_kind(&mut self, row: usize, kind: RowKind) {
        self.storage.kinds[row] = kind;
    }

    /// Drops every row from `rows` on.
    pub fn shrink(&mut self, rows: usize) {
        if rows < self.rows() {
            self.storage.values.truncate(rows * self.storage.regs);
            self.storage.kinds.truncate(rows);
        }
    }

    /// Ends the write phase.
    pub fn freeze(self) -> SharedItemBlock {
        SharedItemBlock {
            inner: Arc::new(self.storage),
        }
    }
}

impl fmt::Debug for ItemBlockBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemBlockBuilder")
            .field("rows", &self.rows())
            .field("regs", &self.regs())
            .finish()
    }
}

/// Immutable, reference counted block.
#[derive(Clone)]
pub struct SharedItemBlock {
    inner: Arc<BlockStorage>,
}

impl SharedItemBlock {
    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.inner.rows()
    }

    /// Number of registers per row.
    pub fn regs(&self) -> usize {
        self.inner.regs
    }

    /// Reads a register.
    pub fn value(&self, row: usize, reg: usize) -> &Value {
        &self.inner.values[self.inner.offset(row, reg)]
    }

    /// All registers of one row.
    pub fn row_values(&self, row: usize) -> &[Value] {
        let start = row * self.inner.regs;
        &self.inner.values[start..start + self.inner.regs]
    }

    /// Tag of a row.
    pub fn kind(&self, row: usize) -> RowKind {
        self.inner.kinds[row]
    }

    /// True if `row` is a shadow row.
    pub fn is_shadow_row(&self, row: usize) -> bool {
        self.kind(row).shadow_depth().is_some()
    }

    /// Number of shadow rows in the block.
    pub fn count_shadow_rows(&self) -> usize {
        self.inner
            .kinds
            .iter()
            .filter(|kind| kind.shadow_depth().is_some())
            .count()
    }

    /// True if both handles alias the same block.
    pub fn ptr_eq(&self, other: &SharedItemBlock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live handles to this block.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Reopens the block for writing if this is the only handle left.
    pub fn try_into_builder(self) -> std::result::Result<ItemBlockBuilder, SharedItemBlock> {
        Arc::try_unwrap(self.inner)
            .map(ItemBlockBuilder::from_storage)
            .map_err(|inner| SharedItemBlock { inner })
    }

    /// Checks that every shadow row of depth `d > 0` directly follows a
    /// shadow row of depth at least `d - 1`.
    ///
    /// The first row is exempt, its predecessor lives in the previous block.
    pub fn validate_shadow_row_consistency(&self) -> Result<()> {
        let kinds = &self.inner.kinds;
        for (row, kind) in kinds.iter().enumerate().skip(1) {
            let Some(depth) = kind.shadow_depth() else {
                continue;
            };
            if depth == 0 {
                continue;
            }
            match kinds[row - 1].shadow_depth() {
                Some(prev) if prev + 1 >= depth => {}
                prev => {
                    return Err(ExecError::internal(format!(
                        "shadow row of depth {depth} at index {row} follows {}",
                        match prev {
                            Some(prev) => format!("a shadow row of depth {prev}"),
                            None => "a data row".to_owned(),
                        }
                    )));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for SharedItemBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for row in 0..self.rows() {
            match self.kind(row) {
                RowKind::Data => list.entry(&self.row_values(row)),
                RowKind::Shadow { depth } => list.entry(&(depth, self.row_values(row))),
            };
        }
        list.finish()
    }
}
