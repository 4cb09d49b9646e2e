//! Pass-through stage.

use super::{one_per_data_row, skip_counted_rows};
use crate::error::Result;
use crate::exec::{AqlCall, Executor, ExecutorState, InputRange, NoStats, OutputRow};

/// Forwards its input unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdExecutor;

impl Executor for IdExecutor {
    type Stats = NoStats;
    const NAME: &'static str = "IdExecutor";

    fn produce_rows(
        &mut self,
        input: &mut InputRange,
        output: &mut OutputRow,
    ) -> Result<(ExecutorState, NoStats, AqlCall)> {
        while !output.is_full() {
            let (_, row) = input.next_data_row();
            let Some(row) = row else { break };
            output.copy_row(&row)?;
            output.advance_row()?;
        }
        Ok((input.upstream_state(), NoStats, AqlCall::new()))
    }

    fn skip_rows_range(
        &mut self,
        input: &mut InputRange,
        call: &mut AqlCall,
    ) -> Result<(ExecutorState, NoStats, usize, AqlCall)> {
        let skipped = skip_counted_rows(input, call);
        Ok((input.upstream_state(), NoStats, skipped, AqlCall::new()))
    }

    fn expected_number_of_rows(&self, input: &InputRange, call: &AqlCall) -> usize {
        one_per_data_row(input, call)
    }
}
