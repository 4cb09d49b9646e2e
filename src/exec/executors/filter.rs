//! Keeps rows whose condition register is truthy.

use std::ops::AddAssign;

use super::one_per_data_row;
use crate::error::Result;
use crate::exec::{AqlCall, Executor, ExecutorState, InputRange, OutputRow, RegisterId};

/// Rows dropped by a [`FilterExecutor`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FilterStats {
    /// Rows whose condition was false.
    pub filtered: usize,
}

impl AddAssign for FilterStats {
    fn add_assign(&mut self, rhs: FilterStats) {
        self.filtered += rhs.filtered;
    }
}

/// Keeps the rows whose condition register is truthy.
#[derive(Clone, Copy, Debug)]
pub struct FilterExecutor {
    input_register: RegisterId,
}

impl FilterExecutor {
    /// Filters on the truthiness of `input_register`.
    pub fn new(input_register: RegisterId) -> Self {
        Self { input_register }
    }
}

impl Executor for FilterExecutor {
    type Stats = FilterStats;
    const NAME: &'static str = "FilterExecutor";

    fn produce_rows(
        &mut self,
        input: &mut InputRange,
        output: &mut OutputRow,
    ) -> Result<(ExecutorState, FilterStats, AqlCall)> {
        let mut stats = FilterStats::default();
        while !output.is_full() {
            let (_, row) = input.next_data_row();
            let Some(row) = row else { break };
            if row.value(self.input_register).to_boolean() {
                output.copy_row(&row)?;
                output.advance_row()?;
            } else {
                stats.filtered += 1;
            }
        }
        Ok((input.upstream_state(), stats, AqlCall::new()))
    }

    // Only rows passing the condition count as skipped.
    fn skip_rows_range(
        &mut self,
        input: &mut InputRange,
        call: &mut AqlCall,
    ) -> Result<(ExecutorState, FilterStats, usize, AqlCall)> {
        let mut stats = FilterStats::default();
        let mut skipped = 0;
        while call.need_skip_more() {
            let (_, row) = input.next_data_row();
            let Some(row) = row else { break };
            if row.value(self.input_register).to_boolean() {
                call.did_skip(1);
                skipped += 1;
            } else {
                stats.filtered += 1;
            }
        }
        Ok((input.upstream_state(), stats, skipped, AqlCall::new()))
    }

    fn expected_number_of_rows(&self, input: &InputRange, call: &AqlCall) -> usize {
        one_per_data_row(input, call)
    }
}
