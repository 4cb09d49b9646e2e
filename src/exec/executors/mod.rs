//! Stages shipped with the core.
//!
//! Each one implements [`Executor`](crate::exec::Executor) and is run through
//! [`ExecutionBlockImpl`](crate::exec::ExecutionBlockImpl). None of them asks
//! its dependency for anything but an unlimited call; offsets and limits are
//! applied on the rows that arrive.

mod calculation;
mod count_collect;
mod enumerate_cursor;
mod enumerate_list;
mod filter;
mod id;
mod limit;
mod subquery_end;
mod subquery_start;

pub use calculation::CalculationExecutor;
pub use count_collect::CountCollectExecutor;
pub use enumerate_cursor::{CursorStats, EnumerateCursorExecutor};
pub use enumerate_list::EnumerateListExecutor;
pub use filter::{FilterExecutor, FilterStats};
pub use id::IdExecutor;
pub use limit::{LimitExecutor, LimitStats};
pub use subquery_end::SubqueryEndExecutor;
pub use subquery_start::SubqueryStartExecutor;

use super::call::AqlCall;
use super::range::InputRange;

/// Skips the data rows `call` still wants skipped, up to the next shadow row:
/// the offset first, then everything if only a full count is left.
pub(crate) fn skip_counted_rows(input: &mut InputRange, call: &mut AqlCall) -> usize {
    let wanted = if call.get_offset() > 0 {
        call.get_offset()
    } else if call.need_skip_more() {
        usize::MAX
    } else {
        0
    };
    let skipped = input.skip_data_rows(wanted);
    call.did_skip(skipped);
    skipped
}

/// Upper bound for stages writing at most one row per input data row.
pub(crate) fn one_per_data_row(input: &InputRange, call: &AqlCall) -> usize {
    input.count_data_rows().min(call.get_limit())
}
