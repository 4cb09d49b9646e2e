//! Read cursor over the rows a dependency handed in.

use std::collections::VecDeque;

use super::block::SharedItemBlock;
use super::executor::ExecutorState;
use super::row::{InputRow, ShadowRow};

/// Cursor over the blocks an upstream call returned.
///
/// Data rows and shadow rows are consumed through separate methods: a stage
/// reading data rows stops in front of the next shadow row and never moves
/// past it on its own.
#[derive(Clone, Debug)]
pub struct InputRange {
    blocks: VecDeque<SharedItemBlock>,
    row_index: usize,
    final_state: ExecutorState,
}

impl InputRange {
    /// Empty range; `final_state` is what upstream reported.
    pub fn new(final_state: ExecutorState) -> Self {
        Self {
            blocks: VecDeque::new(),
            row_index: 0,
            final_state,
        }
    }

    /// Range over `blocks` in order.
    pub fn from_blocks(
        final_state: ExecutorState,
        blocks: impl IntoIterator<Item = SharedItemBlock>,
    ) -> Self {
        let mut range = Self {
            blocks: blocks.into_iter().filter(|block| block.rows() > 0).collect(),
            row_index: 0,
            final_state,
        };
        range.normalize();
        range
    }

    /// Range over a single optional block.
    pub fn from_block(final_state: ExecutorState, block: Option<SharedItemBlock>) -> Self {
        Self::from_blocks(final_state, block)
    }

    fn normalize(&mut self) {
        while let Some(front) = self.blocks.front() {
            if self.row_index < front.rows() {
                break;
            }
            self.blocks.pop_front();
            self.row_index = 0;
        }
    }

    fn current(&self) -> Option<InputRow> {
        self.blocks
            .front()
            .map(|block| InputRow::new(block.clone(), self.row_index))
    }

    fn current_is_shadow(&self) -> Option<bool> {
        self.blocks
            .front()
            .map(|block| block.is_shadow_row(self.row_index))
    }

    fn step(&mut self) {
        if !self.blocks.is_empty() {
            self.row_index += 1;
            self.normalize();
        }
    }

    fn remaining(&self) -> impl Iterator<Item = bool> + '_ {
        self.blocks.iter().enumerate().flat_map(move |(pos, block)| {
            let start = if pos == 0 { self.row_index } else { 0 };
            (start..block.rows()).map(move |row| block.is_shadow_row(row))
        })
    }

    /// What upstream reported when this range was fetched.
    pub fn final_state(&self) -> ExecutorState {
        self.final_state
    }

    /// State as seen by a data-row consumer: `HasMore` while a data row is
    /// next, `Done` in front of a shadow row, and upstream's state once the
    /// range is used up.
    pub fn upstream_state(&self) -> ExecutorState {
        match self.current_is_shadow() {
            Some(false) => ExecutorState::HasMore,
            Some(true) => ExecutorState::Done,
            None => self.final_state,
        }
    }

    /// True if the next row is a data row.
    pub fn has_data_row(&self) -> bool {
        self.current_is_shadow() == Some(false)
    }

    /// Next data row without consuming it.
    pub fn peek_data_row(&self) -> Option<InputRow> {
        if self.has_data_row() {
            self.current()
        } else {
            None
        }
    }

    /// Consumes the next data row. The state describes what is left after it.
    pub fn next_data_row(&mut self) -> (ExecutorState, Option<InputRow>) {
        let row = self.peek_data_row();
        if row.is_some() {
            self.step();
        }
        (self.upstream_state(), row)
    }

    /// Drops the next data row.
    pub fn advance_data_row(&mut self) {
        if self.has_data_row() {
            self.step();
        }
    }

    /// True if the next row is a shadow row.
    pub fn has_shadow_row(&self) -> bool {
        self.current_is_shadow() == Some(true)
    }

    /// Next shadow row without consuming it.
    pub fn peek_shadow_row(&self) -> Option<ShadowRow> {
        if self.has_shadow_row() {
            self.current().and_then(ShadowRow::from_input)
        } else {
            None
        }
    }

    /// Consumes the next shadow row. The state is `HasMore` while any row is
    /// left and upstream's state afterwards.
    pub fn next_shadow_row(&mut self) -> (ExecutorState, Option<ShadowRow>) {
        let row = self.peek_shadow_row();
        if row.is_some() {
            self.step();
        }
        let state = if self.has_valid_row() {
            ExecutorState::HasMore
        } else {
            self.final_state
        };
        (state, row)
    }

    /// True if any row, data or shadow, is left.
    pub fn has_valid_row(&self) -> bool {
        !self.blocks.is_empty()
    }

    /// Skips up to `n` data rows without crossing a shadow row.
    pub fn skip_data_rows(&mut self, n: usize) -> usize {
        let mut skipped = 0;
        while skipped < n && self.has_data_row() {
            self.step();
            skipped += 1;
        }
        skipped
    }

    /// Skips data rows up to the next shadow row.
    pub fn skip_all_remaining_data_rows(&mut self) -> usize {
        self.skip_data_rows(usize::MAX)
    }

    /// Data rows left in the range, across shadow rows.
    pub fn count_data_rows(&self) -> usize {
        self.remaining().filter(|shadow| !shadow).count()
    }

    /// Shadow rows left in the range.
    pub fn count_shadow_rows(&self) -> usize {
        self.remaining().filter(|shadow| *shadow).count()
    }
}
