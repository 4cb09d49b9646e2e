//! Offset and limit applied within every subquery run.

use std::ops::AddAssign;

use crate::error::Result;
use crate::exec::{AqlCall, Executor, ExecutorState, InputRange, OutputRow};

/// Rows counted by a [`LimitExecutor`] with full count enabled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LimitStats {
    /// Every input row seen, including the ones dropped by offset and limit.
    pub full_count: usize,
}

impl AddAssign for LimitStats {
    fn add_assign(&mut self, rhs: LimitStats) {
        self.full_count += rhs.full_count;
    }
}

/// Drops the first `offset` rows of every run and passes at most `limit`
/// of the rest. With full count on, the remaining rows are counted instead of
/// left behind.
pub struct LimitExecutor {
    offset: usize,
    limit: usize,
    full_count: bool,
    dropped: usize,
    passed: usize,
}

impl LimitExecutor {
    /// Limit stage for `offset` and `limit`.
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit,
            full_count: false,
            dropped: 0,
            passed: 0,
        }
    }

    /// Enables counting all input rows into [`LimitStats::full_count`].
    pub fn with_full_count(mut self, full_count: bool) -> Self {
        self.full_count = full_count;
        self
    }

    fn drop_offset(&mut self, input: &mut InputRange, stats: &mut LimitStats) {
        let dropped = input.skip_data_rows(self.offset - self.dropped);
        self.dropped += dropped;
        self.count(stats, dropped);
    }

    fn count(&self, stats: &mut LimitStats, rows: usize) {
        if self.full_count {
            stats.full_count += rows;
        }
    }

    fn remaining(&self) -> usize {
        self.limit - self.passed
    }

    fn finish(&mut self, input: &mut InputRange, stats: &mut LimitStats) -> ExecutorState {
        if self.remaining() > 0 {
            return input.upstream_state();
        }
        if self.full_count {
            let rest = input.skip_all_remaining_data_rows();
            self.count(stats, rest);
            return input.upstream_state();
        }
        ExecutorState::Done
    }
}

impl Executor for LimitExecutor {
    type Stats = LimitStats;
    const NAME: &'static str = "LimitExecutor";

    fn produce_rows(
        &mut self,
        input: &mut InputRange,
        output: &mut OutputRow,
    ) -> Result<(ExecutorState, LimitStats, AqlCall)> {
        let mut stats = LimitStats::default();
        self.drop_offset(input, &mut stats);
        while self.remaining() > 0 && !output.is_full() {
            let (_, row) = input.next_data_row();
            let Some(row) = row else { break };
            output.copy_row(&row)?;
            output.advance_row()?;
            self.passed += 1;
            self.count(&mut stats, 1);
        }
        let state = self.finish(input, &mut stats);
        Ok((state, stats, AqlCall::new()))
    }

    fn skip_rows_range(
        &mut self,
        input: &mut InputRange,
        call: &mut AqlCall,
    ) -> Result<(ExecutorState, LimitStats, usize, AqlCall)> {
        let mut stats = LimitStats::default();
        self.drop_offset(input, &mut stats);
        let wanted = if call.get_offset() > 0 {
            call.get_offset()
        } else if call.need_skip_more() {
            usize::MAX
        } else {
            0
        };
        let skipped = input.skip_data_rows(wanted.min(self.remaining()));
        self.passed += skipped;
        self.count(&mut stats, skipped);
        call.did_skip(skipped);
        let state = self.finish(input, &mut stats);
        Ok((state, stats, skipped, AqlCall::new()))
    }

    fn expected_number_of_rows(&self, input: &InputRange, call: &AqlCall) -> usize {
        input.count_data_rows().min(self.remaining()).min(call.get_limit())
    }

    fn reset(&mut self) {
        self.dropped = 0;
        self.passed = 0;
    }
}
