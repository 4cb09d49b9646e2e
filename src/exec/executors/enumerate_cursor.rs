//! Emits every document of a cursor for each input row.

use std::ops::AddAssign;

use crate::error::Result;
use crate::exec::{
    AqlCall, Executor, ExecutorState, InputRange, InputRow, OutputRow, RegisterId,
    TransactionalCursor,
};

/// Documents read by an [`EnumerateCursorExecutor`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CursorStats {
    /// Documents written to the output.
    pub scanned: usize,
    /// Documents passed over by skipping.
    pub skipped: usize,
}

impl AddAssign for CursorStats {
    fn add_assign(&mut self, rhs: CursorStats) {
        self.scanned += rhs.scanned;
        self.skipped += rhs.skipped;
    }
}

/// Emits every document of a cursor for each input row. The cursor is
/// rewound whenever a new input row starts.
pub struct EnumerateCursorExecutor<C> {
    cursor: C,
    output_register: RegisterId,
    current: Option<InputRow>,
}

impl<C: TransactionalCursor> EnumerateCursorExecutor<C> {
    /// Enumerates `cursor` into `output_register`.
    pub fn new(cursor: C, output_register: RegisterId) -> Self {
        Self {
            cursor,
            output_register,
            current: None,
        }
    }

    /// The wrapped cursor.
    pub fn cursor(&self) -> &C {
        &self.cursor
    }

    fn current_row(&mut self, input: &mut InputRange) -> Option<InputRow> {
        if self.current.is_none() {
            let (_, row) = input.next_data_row();
            if row.is_some() {
                self.cursor.reset();
            }
            self.current = row;
        }
        self.current.clone()
    }

    fn state(&self, input: &InputRange) -> ExecutorState {
        if self.current.is_some() {
            ExecutorState::HasMore
        } else {
            input.upstream_state()
        }
    }
}

impl<C: TransactionalCursor> Executor for EnumerateCursorExecutor<C> {
    type Stats = CursorStats;
    const NAME: &'static str = "EnumerateCursorExecutor";

    fn produce_rows(
        &mut self,
        input: &mut InputRange,
        output: &mut OutputRow,
    ) -> Result<(ExecutorState, CursorStats, AqlCall)> {
        let mut stats = CursorStats::default();
        while !output.is_full() {
            let Some(row) = self.current_row(input) else { break };
            if self.cursor.has_more() {
                let mut documents = Vec::new();
                self.cursor
                    .next(&mut |document| documents.push(document), output.num_rows_left())?;
                for document in documents {
                    output.move_value_into(self.output_register, &row, document)?;
                    output.advance_row()?;
                    stats.scanned += 1;
                }
            }
            if !self.cursor.has_more() {
                self.current = None;
            }
        }
        Ok((self.state(input), stats, AqlCall::new()))
    }

    fn skip_rows_range(
        &mut self,
        input: &mut InputRange,
        call: &mut AqlCall,
    ) -> Result<(ExecutorState, CursorStats, usize, AqlCall)> {
        let mut stats = CursorStats::default();
        let mut skipped = 0;
        while call.need_skip_more() {
            if self.current_row(input).is_none() {
                break;
            }
            let wanted = if call.get_offset() > 0 {
                call.get_offset()
            } else {
                usize::MAX
            };
            let step = self.cursor.skip(wanted)?;
            call.did_skip(step);
            skipped += step;
            stats.skipped += step;
            if !self.cursor.has_more() {
                self.current = None;
            } else if step == 0 {
                break;
            }
        }
        Ok((self.state(input), stats, skipped, AqlCall::new()))
    }

    fn expected_number_of_rows(&self, _input: &InputRange, call: &AqlCall) -> usize {
        call.get_limit()
    }

    fn reset(&mut self) {
        self.current = None;
    }
}
