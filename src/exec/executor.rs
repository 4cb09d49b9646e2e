//! Contracts between the driver loop, the stages it runs and the blocks that
//! chain them together.

use std::fmt;
use std::ops::AddAssign;

use super::block::SharedItemBlock;
use super::call::AqlCall;
use super::call_stack::AqlCallStack;
use super::output::OutputRow;
use super::range::InputRange;
use super::row::ShadowRow;
use super::skip::SkipResult;
use crate::error::{ExecError, Result};

/// Progress reported by a stage. `Done` is terminal for the current run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExecutorState {
    /// More rows may follow.
    HasMore,
    /// Nothing more will follow.
    Done,
}

/// Progress reported by a block to its client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExecutionState {
    /// Call again for more rows.
    HasMore,
    /// The block is exhausted.
    Done,
    /// An asynchronous dependency is not ready. Retry the same call later;
    /// nothing was produced or skipped.
    Suspended,
}

impl From<ExecutorState> for ExecutionState {
    fn from(state: ExecutorState) -> Self {
        match state {
            ExecutorState::HasMore => ExecutionState::HasMore,
            ExecutorState::Done => ExecutionState::Done,
        }
    }
}

/// How a stage relates to subquery nesting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExecutorKind {
    /// Works within one nesting level.
    Regular,
    /// Opens a subquery: every data row starts a new run.
    SubqueryStart,
    /// Closes a subquery: every run collapses into one data row.
    SubqueryEnd,
}

/// Statistics type for stages that keep none.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoStats;

impl AddAssign for NoStats {
    fn add_assign(&mut self, _rhs: NoStats) {}
}

/// One pipeline stage.
///
/// Both entry points are re-entrant: a stage keeps its progress between
/// invocations and picks up where the input range left off. Neither may move
/// past a shadow row; the driver forwards those.
pub trait Executor {
    /// Per-stage counters, summed over all invocations.
    type Stats: Default + AddAssign + Clone + fmt::Debug;

    /// Stage name used in logs.
    const NAME: &'static str;

    /// Nesting behaviour of the stage.
    const KIND: ExecutorKind = ExecutorKind::Regular;

    /// True if rows dropped by a fast-forward still have to pass through the
    /// stage, because processing them has effects beyond the output.
    const FAST_FORWARD_NEEDS_EXECUTOR: bool = false;

    /// Writes at most `output.num_rows_left()` rows.
    ///
    /// Returns the stage state, the stats of this invocation, and the call to
    /// send upstream if the input runs dry.
    fn produce_rows(
        &mut self,
        input: &mut InputRange,
        output: &mut OutputRow,
    ) -> Result<(ExecutorState, Self::Stats, AqlCall)>;

    /// Skips the rows this stage would have produced, honouring
    /// `call.get_offset()` and, once the limit is used up, the full count.
    ///
    /// Must report through `call.did_skip` exactly the rows that count and
    /// return the same number.
    fn skip_rows_range(
        &mut self,
        input: &mut InputRange,
        call: &mut AqlCall,
    ) -> Result<(ExecutorState, Self::Stats, usize, AqlCall)>;

    /// Upper bound of data rows the stage will write for `input`, used to size
    /// output blocks.
    fn expected_number_of_rows(&self, input: &InputRange, call: &AqlCall) -> usize;

    /// Clears per-run state. Called when a relevant shadow row passes.
    fn reset(&mut self) {}

    /// Writes the shadow row that closes the run of the pending data row.
    /// Only subquery start stages implement this.
    fn produce_shadow_row(&mut self, _input: &mut InputRange, _output: &mut OutputRow) -> Result<bool> {
        Ok(false)
    }

    /// Turns the relevant shadow row closing a run into the run's result row.
    /// Only subquery end stages implement this.
    fn consume_shadow_row(&mut self, shadow: &ShadowRow, _output: &mut OutputRow) -> Result<()> {
        Err(ExecError::internal(format!(
            "stage cannot consume a shadow row of depth {}",
            shadow.depth()
        )))
    }
}

/// Result of one [`ExecutionBlock::execute`] call.
pub type ExecuteResult = (ExecutionState, SkipResult, Option<SharedItemBlock>);

/// A node of the pipeline that answers call stacks with blocks.
pub trait ExecutionBlock {
    /// Answers the innermost call of `stack`.
    ///
    /// The returned skip result has one level per level of `stack`. A
    /// `Suspended` answer carries neither rows nor skips.
    fn execute(&mut self, stack: AqlCallStack) -> Result<ExecuteResult>;

    /// Name used in logs.
    fn name(&self) -> &str;
}

impl<B: ExecutionBlock + ?Sized> ExecutionBlock for Box<B> {
    fn execute(&mut self, stack: AqlCallStack) -> Result<ExecuteResult> {
        (**self).execute(stack)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
