//! Write cursor over the block a stage fills.

use std::sync::Arc;

use smallvec::SmallVec;

use super::block::{ItemBlockBuilder, RowKind, SharedItemBlock};
use super::call::AqlCall;
use super::register::{RegisterId, RegisterInfos};
use super::row::{InputRow, ShadowRow};
use super::value::Value;
use crate::error::{ExecError, Result};

/// Exclusive write cursor into the block a stage is filling.
///
/// The cursor writes one row at a time. A data row is complete once every
/// output register of the stage has been written, which also copies the kept
/// registers of the source row. [`OutputRow::advance_row`] then moves to the
/// next slot and charges data rows against the client call.
pub struct OutputRow {
    block: Option<ItemBlockBuilder>,
    base_index: usize,
    call: AqlCall,
    infos: Arc<RegisterInfos>,
    written: SmallVec<[bool; 4]>,
    num_written: usize,
    produced: bool,
}

impl OutputRow {
    /// Cursor over `block`; `None` yields a cursor that is always full.
    pub fn new(block: Option<ItemBlockBuilder>, infos: Arc<RegisterInfos>, call: AqlCall) -> Self {
        let written = SmallVec::from_elem(false, infos.output_registers().len());
        Self {
            block,
            base_index: 0,
            call,
            infos,
            written,
            num_written: 0,
            produced: false,
        }
    }

    /// True if a block is attached.
    pub fn is_initialized(&self) -> bool {
        self.block.is_some()
    }

    /// The call as reduced by the rows produced so far.
    pub fn client_call(&self) -> AqlCall {
        self.call
    }

    /// Replaces the client call for the next produce round.
    pub fn set_call(&mut self, call: AqlCall) {
        self.call = call;
    }

    /// Register layout the cursor writes with.
    pub fn register_infos(&self) -> &RegisterInfos {
        &self.infos
    }

    /// Rows that may still be produced: the smaller of free slots and the
    /// remaining limit.
    pub fn num_rows_left(&self) -> usize {
        match &self.block {
            Some(block) => (block.rows() - self.base_index).min(self.call.get_limit()),
            None => 0,
        }
    }

    /// True once the block or the call leaves no room for a data row.
    pub fn is_full(&self) -> bool {
        self.num_rows_left() == 0
    }

    /// True once every slot of the attached block is written.
    pub fn all_rows_used(&self) -> bool {
        match &self.block {
            Some(block) => self.base_index >= block.rows(),
            None => true,
        }
    }

    /// Rows completed so far.
    pub fn num_rows_written(&self) -> usize {
        self.base_index
    }

    /// True if the current row is complete.
    pub fn produced(&self) -> bool {
        self.produced
    }

    fn slot(&mut self) -> Result<(&mut ItemBlockBuilder, usize)> {
        let row = self.base_index;
        let block = self
            .block
            .as_mut()
            .ok_or_else(|| ExecError::internal("write into an output row without a block"))?;
        if row >= block.rows() {
            return Err(ExecError::internal(format!(
                "write past the end of a block with {} rows",
                block.rows()
            )));
        }
        Ok((block, row))
    }

    fn write_value(&mut self, reg: RegisterId, value: Value) -> Result<()> {
        let pos = self
            .infos
            .output_registers()
            .iter()
            .position(|out| *out == reg)
            .ok_or_else(|| ExecError::internal(format!("register {reg} is not an output register")))?;
        if self.written[pos] {
            return Err(ExecError::internal(format!(
                "register {reg} written twice in row {}",
                self.base_index
            )));
        }
        let (block, row) = self.slot()?;
        block.set_value(row, reg, value);
        self.written[pos] = true;
        self.num_written += 1;
        Ok(())
    }

    fn all_values_written(&self) -> bool {
        self.num_written == self.written.len()
    }

    fn copy_kept(&mut self, source: Option<&InputRow>) -> Result<()> {
        let infos = Arc::clone(&self.infos);
        let (block, row) = self.slot()?;
        if let Some(source) = source {
            for reg in infos.registers_to_keep() {
                block.set_value(row, *reg, source.value(*reg).clone());
            }
        }
        block.set_kind(row, RowKind::Data);
        self.produced = true;
        Ok(())
    }

    /// Writes `value` into output register `reg` of the current row.
    ///
    /// Writing the last output register completes the row and copies the
    /// kept registers of `source`.
    pub fn move_value_into(&mut self, reg: RegisterId, source: &InputRow, value: Value) -> Result<()> {
        self.write_value(reg, value)?;
        if self.all_values_written() {
            self.copy_kept(Some(source))?;
        }
        Ok(())
    }

    /// Like [`OutputRow::move_value_into`] for rows that have no source row,
    /// such as aggregates. Kept registers stay null.
    pub fn move_value_without_input(&mut self, reg: RegisterId, value: Value) -> Result<()> {
        self.write_value(reg, value)?;
        if self.all_values_written() {
            self.copy_kept(None)?;
        }
        Ok(())
    }

    /// Completes the current row as a copy of `source`.
    pub fn copy_row(&mut self, source: &InputRow) -> Result<()> {
        if self.produced {
            return Ok(());
        }
        if !self.all_values_written() {
            return Err(ExecError::internal(format!(
                "row copied with {} of {} output registers written",
                self.num_written,
                self.written.len()
            )));
        }
        self.copy_kept(Some(source))
    }

    fn write_shadow(&mut self, source: &InputRow, depth: usize) -> Result<()> {
        if self.num_written > 0 || self.produced {
            return Err(ExecError::internal("shadow row written over a started data row"));
        }
        let (block, row) = self.slot()?;
        let regs = source.regs().min(block.regs());
        for reg in 0..regs {
            block.set_value(row, reg, source.value(reg).clone());
        }
        block.set_kind(row, RowKind::Shadow { depth });
        self.produced = true;
        Ok(())
    }

    /// Forwards a shadow row unchanged.
    pub fn move_row(&mut self, shadow: &ShadowRow) -> Result<()> {
        self.write_shadow(shadow.as_input_row(), shadow.depth())
    }

    /// Forwards a shadow row one level deeper, used when entering a subquery.
    pub fn increase_shadow_row_depth(&mut self, shadow: &ShadowRow) -> Result<()> {
        self.write_shadow(shadow.as_input_row(), shadow.depth() + 1)
    }

    /// Forwards a shadow row one level shallower, used when leaving a
    /// subquery.
    pub fn decrease_shadow_row_depth(&mut self, shadow: &ShadowRow) -> Result<()> {
        let depth = shadow.depth().checked_sub(1).ok_or_else(|| {
            ExecError::internal("relevant shadow row cannot be lifted out of its subquery")
        })?;
        self.write_shadow(shadow.as_input_row(), depth)
    }

    /// Writes a depth-0 shadow row holding the values of data row `source`.
    pub fn create_shadow_row(&mut self, source: &InputRow) -> Result<()> {
        if source.is_shadow_row() {
            return Err(ExecError::internal("shadow row created from a shadow row"));
        }
        self.write_shadow(source, 0)
    }

    /// Turns the relevant shadow row closing a subquery run into a data row
    /// carrying `value` in `reg`.
    pub fn consume_shadow_row(&mut self, reg: RegisterId, shadow: &ShadowRow, value: Value) -> Result<()> {
        if !shadow.is_relevant() {
            return Err(ExecError::internal(format!(
                "consumed a shadow row of depth {}",
                shadow.depth()
            )));
        }
        self.move_value_into(reg, shadow.as_input_row(), value)
    }

    /// Moves to the next slot. Data rows are charged against the call.
    pub fn advance_row(&mut self) -> Result<()> {
        if !self.produced {
            return Err(ExecError::internal(format!(
                "advanced past incomplete row {}",
                self.base_index
            )));
        }
        let (block, row) = self.slot()?;
        if block.kind(row) == RowKind::Data {
            if self.call.get_limit() == 0 {
                return Err(ExecError::internal(format!(
                    "row produced beyond the limit of call {}",
                    self.call
                )));
            }
            self.call.did_produce(1);
        }
        self.base_index += 1;
        self.written.iter_mut().for_each(|flag| *flag = false);
        self.num_written = 0;
        self.produced = false;
        Ok(())
    }

    /// Detaches the filled part of the block. Returns `None` if nothing was
    /// written; the cursor is uninitialized afterwards.
    pub fn steal_block(&mut self) -> Option<SharedItemBlock> {
        let mut block = self.block.take()?;
        if self.base_index == 0 {
            return None;
        }
        block.shrink(self.base_index);
        self.base_index = 0;
        Some(block.freeze())
    }
}

impl std::fmt::Debug for OutputRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputRow")
            .field("block", &self.block)
            .field("base_index", &self.base_index)
            .field("call", &self.call)
            .finish()
    }
}
