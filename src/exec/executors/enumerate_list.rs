//! Emits one row per element of a list register.

use crate::error::{ErrorCode, ExecError, Result};
use crate::exec::{
    AqlCall, Executor, ExecutorState, InputRange, InputRow, NoStats, OutputRow, RegisterId, Value,
};

/// Emits one row per element of the array in its input register.
///
/// A row whose array does not fit into the output block is remembered
/// together with the position reached, and continued on the next call.
pub struct EnumerateListExecutor {
    input_register: RegisterId,
    output_register: RegisterId,
    current: Option<InputRow>,
    position: usize,
}

impl EnumerateListExecutor {
    /// Enumerates `input_register` into `output_register`.
    pub fn new(input_register: RegisterId, output_register: RegisterId) -> Self {
        Self {
            input_register,
            output_register,
            current: None,
            position: 0,
        }
    }

    /// Row being enumerated, fetching the next one once the last is used up.
    fn current_row(&mut self, input: &mut InputRange) -> Option<InputRow> {
        if self.current.is_none() {
            let (_, row) = input.next_data_row();
            self.current = row;
            self.position = 0;
        }
        self.current.clone()
    }

    fn items<'a>(&self, row: &'a InputRow) -> Result<&'a [Value]> {
        let value = row.value(self.input_register);
        value.as_array().ok_or_else(|| {
            ExecError::query(
                ErrorCode::TypeMismatch,
                format!("cannot enumerate a value of type {}", value.type_name()),
            )
        })
    }

    fn state(&self, input: &InputRange) -> ExecutorState {
        if self.current.is_some() {
            ExecutorState::HasMore
        } else {
            input.upstream_state()
        }
    }
}

impl Executor for EnumerateListExecutor {
    type Stats = NoStats;
    const NAME: &'static str = "EnumerateListExecutor";

    fn produce_rows(
        &mut self,
        input: &mut InputRange,
        output: &mut OutputRow,
    ) -> Result<(ExecutorState, NoStats, AqlCall)> {
        while !output.is_full() {
            let Some(row) = self.current_row(input) else { break };
            let items = self.items(&row)?;
            if let Some(item) = items.get(self.position) {
                output.move_value_into(self.output_register, &row, item.clone())?;
                output.advance_row()?;
                self.position += 1;
            }
            if self.position >= items.len() {
                self.current = None;
            }
        }
        Ok((self.state(input), NoStats, AqlCall::new()))
    }

    fn skip_rows_range(
        &mut self,
        input: &mut InputRange,
        call: &mut AqlCall,
    ) -> Result<(ExecutorState, NoStats, usize, AqlCall)> {
        let mut skipped = 0;
        while call.need_skip_more() {
            let Some(row) = self.current_row(input) else { break };
            let len = self.items(&row)?.len();
            let wanted = if call.get_offset() > 0 {
                call.get_offset()
            } else {
                usize::MAX
            };
            let step = (len - self.position).min(wanted);
            self.position += step;
            call.did_skip(step);
            skipped += step;
            if self.position >= len {
                self.current = None;
            }
        }
        Ok((self.state(input), NoStats, skipped, AqlCall::new()))
    }

    fn expected_number_of_rows(&self, _input: &InputRange, call: &AqlCall) -> usize {
        // Array lengths are unknown until the rows are read.
        call.get_limit()
    }

    fn reset(&mut self) {
        self.current = None;
        self.position = 0;
    }
}
