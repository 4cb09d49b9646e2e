//! Writes an evaluated expression into an output register.

use super::{one_per_data_row, skip_counted_rows};
use crate::error::Result;
use crate::exec::{
    AqlCall, Evaluator, Executor, ExecutorState, InputRange, NoStats, OutputRow, RegisterId,
};

/// Writes the result of an expression into one output register per row.
pub struct CalculationExecutor<E> {
    evaluator: E,
    output_register: RegisterId,
}

impl<E: Evaluator> CalculationExecutor<E> {
    /// Stage evaluating `evaluator` into `output_register`.
    pub fn new(evaluator: E, output_register: RegisterId) -> Self {
        Self {
            evaluator,
            output_register,
        }
    }
}

impl<E: Evaluator> Executor for CalculationExecutor<E> {
    type Stats = NoStats;
    const NAME: &'static str = "CalculationExecutor";

    fn produce_rows(
        &mut self,
        input: &mut InputRange,
        output: &mut OutputRow,
    ) -> Result<(ExecutorState, NoStats, AqlCall)> {
        while !output.is_full() {
            let (_, row) = input.next_data_row();
            let Some(row) = row else { break };
            let value = self.evaluator.evaluate(&row)?;
            output.move_value_into(self.output_register, &row, value)?;
            output.advance_row()?;
        }
        Ok((input.upstream_state(), NoStats, AqlCall::new()))
    }

    // Evaluation cannot drop a row, so skipping needs no evaluation.
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
