//! Counts the data rows of each subquery run.

use crate::error::Result;
use crate::exec::{
    AqlCall, Executor, ExecutorState, InputRange, NoStats, OutputRow, RegisterId, Value,
};

/// Counts the data rows of every run and writes the count as a single row
/// once the run ends.
pub struct CountCollectExecutor {
    output_register: RegisterId,
    count: usize,
    flushed: bool,
}

impl CountCollectExecutor {
    /// Writes each run's count into `output_register`.
    pub fn new(output_register: RegisterId) -> Self {
        Self {
            output_register,
            count: 0,
            flushed: false,
        }
    }

    /// Rows counted in the current run so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Consumes the run's data rows; true once the run is complete.
    fn consume(&mut self, input: &mut InputRange) -> bool {
        self.count += input.skip_all_remaining_data_rows();
        input.upstream_state() == ExecutorState::Done
    }

    fn state(&self) -> ExecutorState {
        if self.flushed {
            ExecutorState::Done
        } else {
            ExecutorState::HasMore
        }
    }
}

impl Executor for CountCollectExecutor {
    type Stats = NoStats;
    const NAME: &'static str = "CountCollectExecutor";

    fn produce_rows(
        &mut self,
        input: &mut InputRange,
        output: &mut OutputRow,
    ) -> Result<(ExecutorState, NoStats, AqlCall)> {
        if !self.flushed && self.consume(input) && !output.is_full() {
            let count = i64::try_from(self.count).unwrap_or(i64::MAX);
            output.move_value_without_input(self.output_register, Value::Int(count))?;
            output.advance_row()?;
            self.flushed = true;
        }
        Ok((self.state(), NoStats, AqlCall::new()))
    }

    fn skip_rows_range(
        &mut self,
        input: &mut InputRange,
        call: &mut AqlCall,
    ) -> Result<(ExecutorState, NoStats, usize, AqlCall)> {
        let mut skipped = 0;
        if !self.flushed && self.consume(input) && call.need_skip_more() {
            call.did_skip(1);
            skipped = 1;
            self.flushed = true;
        }
        Ok((self.state(), NoStats, skipped, AqlCall::new()))
    }

    fn expected_number_of_rows(&self, _input: &InputRange, call: &AqlCall) -> usize {
        usize::from(!self.flushed).min(call.get_limit())
    }

    fn reset(&mut self) {
        self.count = 0;
        self.flushed = false;
    }
}
