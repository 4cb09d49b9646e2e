//! Opens one subquery run per input row.

use crate::error::Result;
use crate::exec::{
    AqlCall, Executor, ExecutorKind, ExecutorState, InputRange, InputRow, NoStats, OutputRow,
};

/// Opens a subquery. Every input data row is written once as a data row for
/// the subquery to work on, then again as the depth-0 shadow row closing the
/// subquery's run for it.
///
/// Between the two the row is pending: the executor reports `Done` so the
/// driver lets the shadow row through before the next data row.
#[derive(Default)]
pub struct SubqueryStartExecutor {
    pending: Option<InputRow>,
}

impl SubqueryStartExecutor {
    /// Stage with no pending row.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Executor for SubqueryStartExecutor {
    type Stats = NoStats;
    const NAME: &'static str = "SubqueryStartExecutor";
    const KIND: ExecutorKind = ExecutorKind::SubqueryStart;
    // A fast-forward has to leave the pending row alone.
    const FAST_FORWARD_NEEDS_EXECUTOR: bool = true;

    fn produce_rows(
        &mut self,
        input: &mut InputRange,
        output: &mut OutputRow,
    ) -> Result<(ExecutorState, NoStats, AqlCall)> {
        if self.pending.is_some() {
            return Ok((ExecutorState::Done, NoStats, AqlCall::new()));
        }
        let Some(row) = input.peek_data_row() else {
            return Ok((input.upstream_state(), NoStats, AqlCall::new()));
        };
        if output.is_full() {
            return Ok((ExecutorState::HasMore, NoStats, AqlCall::new()));
        }
        output.copy_row(&row)?;
        output.advance_row()?;
        self.pending = Some(row);
        Ok((ExecutorState::Done, NoStats, AqlCall::new()))
    }

    fn skip_rows_range(
        &mut self,
        input: &mut InputRange,
        call: &mut AqlCall,
    ) -> Result<(ExecutorState, NoStats, usize, AqlCall)> {
        if self.pending.is_some() {
            return Ok((ExecutorState::Done, NoStats, 0, AqlCall::new()));
        }
        if call.need_skip_more() {
            if let Some(row) = input.peek_data_row() {
                self.pending = Some(row);
                call.did_skip(1);
                return Ok((ExecutorState::Done, NoStats, 1, AqlCall::new()));
            }
        }
        Ok((input.upstream_state(), NoStats, 0, AqlCall::new()))
    }

    fn expected_number_of_rows(&self, input: &InputRange, _call: &AqlCall) -> usize {
        // Each row comes back as a shadow row as well.
        input
            .count_data_rows()
            .saturating_mul(2)
            .saturating_add(usize::from(self.pending.is_some()))
    }

    fn produce_shadow_row(&mut self, input: &mut InputRange, output: &mut OutputRow) -> Result<bool> {
        if output.all_rows_used() {
            return Ok(false);
        }
        let Some(row) = self.pending.take() else {
            return Ok(false);
        };
        output.create_shadow_row(&row)?;
        output.advance_row()?;
        input.advance_data_row();
        Ok(true)
    }
}
