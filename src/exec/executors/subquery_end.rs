//! Collects each subquery run into a list value.

use crate::error::Result;
use crate::exec::{
    AqlCall, Executor, ExecutorKind, ExecutorState, InputRange, NoStats, OutputRow, RegisterId,
    ShadowRow, Value,
};

/// Closes a subquery: collects the values of one register over a run and
/// writes them as an array into the row closing the run.
pub struct SubqueryEndExecutor {
    input_register: Option<RegisterId>,
    output_register: RegisterId,
    accumulator: Vec<Value>,
}

impl SubqueryEndExecutor {
    /// Collects `input_register` into `output_register`. Without an input
    /// register every run yields an empty array.
    pub fn new(input_register: Option<RegisterId>, output_register: RegisterId) -> Self {
        Self {
            input_register,
            output_register,
            accumulator: Vec::new(),
        }
    }

    fn accumulate(&mut self, input: &mut InputRange) {
        while let (_, Some(row)) = input.next_data_row() {
            if let Some(reg) = self.input_register {
                self.accumulator.push(row.value(reg).clone());
            }
        }
    }
}

impl Executor for SubqueryEndExecutor {
    type Stats = NoStats;
    const NAME: &'static str = "SubqueryEndExecutor";
    const KIND: ExecutorKind = ExecutorKind::SubqueryEnd;

    fn produce_rows(
        &mut self,
        input: &mut InputRange,
        _output: &mut OutputRow,
    ) -> Result<(ExecutorState, NoStats, AqlCall)> {
        self.accumulate(input);
        Ok((input.upstream_state(), NoStats, AqlCall::new()))
    }

    // Offsets of the client apply on the enclosing level upstream; rows of
    // the subquery itself are never skipped here.
    fn skip_rows_range(
        &mut self,
        input: &mut InputRange,
        _call: &mut AqlCall,
    ) -> Result<(ExecutorState, NoStats, usize, AqlCall)> {
        self.accumulate(input);
        Ok((input.upstream_state(), NoStats, 0, AqlCall::new()))
    }

    fn expected_number_of_rows(&self, input: &InputRange, _call: &AqlCall) -> usize {
        input.count_shadow_rows()
    }

    fn consume_shadow_row(&mut self, shadow: &ShadowRow, output: &mut OutputRow) -> Result<()> {
        let collected = std::mem::take(&mut self.accumulator);
        output.consume_shadow_row(self.output_register, shadow, Value::Array(collected))
    }

    fn reset(&mut self) {
        self.accumulator.clear();
    }
}
