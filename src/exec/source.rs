//! Root block serving prepared blocks.

use std::collections::VecDeque;

use tracing::debug;

use super::block::{RowKind, SharedItemBlock};
use super::call::AqlCall;
use super::call_stack::AqlCallStack;
use super::context::ExecContext;
use super::executor::{ExecuteResult, ExecutionBlock, ExecutionState};
use super::skip::SkipResult;
use crate::error::{ExecError, Result};

/// What happens to the next data row under a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DataRowAction {
    Skip,
    Emit,
    Drop,
    Stop,
}

impl DataRowAction {
    fn for_call(call: &AqlCall) -> Self {
        if call.need_skip_more() {
            DataRowAction::Skip
        } else if call.get_limit() > 0 {
            DataRowAction::Emit
        } else if call.has_hard_limit() {
            DataRowAction::Drop
        } else {
            DataRowAction::Stop
        }
    }
}

/// Root of a pipeline serving pre-built blocks.
///
/// Every `execute` works on the front block only. Data rows are skipped,
/// handed out or dropped as the innermost call of the stack asks, and a
/// depth-0 shadow row moves on to the next call of that level. Without one
/// the answer ends after the shadow rows. The source reports `Done` together
/// with the rows of its last block.
pub struct ConstSource {
    blocks: VecDeque<SharedItemBlock>,
    /// First row of the front block not looked at yet.
    position: usize,
    context: ExecContext,
}

impl ConstSource {
    /// Source serving `blocks` in order.
    pub fn new(context: ExecContext, blocks: impl IntoIterator<Item = SharedItemBlock>) -> Self {
        Self {
            blocks: blocks.into_iter().collect(),
            position: 0,
            context,
        }
    }

    /// Appends a block to serve after the ones already queued.
    pub fn inject_block(&mut self, block: SharedItemBlock) {
        self.blocks.push_back(block);
    }

    /// Blocks not fully handed out yet.
    pub fn remaining_blocks(&self) -> usize {
        self.blocks.len()
    }

    fn copy_rows(&self, block: &SharedItemBlock, rows: &[usize]) -> SharedItemBlock {
        let mut builder = self.context.block_manager().request_block(rows.len(), block.regs());
        for (out, &row) in rows.iter().enumerate() {
            builder.set_kind(out, block.kind(row));
            for reg in 0..block.regs() {
                builder.set_value(out, reg, block.value(row, reg).clone());
            }
        }
        builder.freeze()
    }
}

impl ExecutionBlock for ConstSource {
    fn execute(&mut self, mut stack: AqlCallStack) -> Result<ExecuteResult> {
        self.context.check_killed()?;
        let depth = stack.subquery_level();
        let mut list = stack.pop_call()?;
        let mut call = list
            .pop_next_call()
            .ok_or_else(|| ExecError::internal("const source called without a call"))?;
        call.validate()?;
        let mut skipped = SkipResult::with_depth(depth);

        let Some(block) = self.blocks.front().cloned() else {
            debug!(block = "ConstSource", %call, "no blocks left");
            return Ok((ExecutionState::Done, skipped, None));
        };
        if self.position == 0 && self.context.options().validate_shadow_rows {
            block.validate_shadow_row_consistency()?;
        }

        let start = self.position;
        let mut emitted = Vec::new();
        let mut awaiting_call = false;
        let mut row = start;
        while row < block.rows() {
            match block.kind(row) {
                RowKind::Data => {
                    if awaiting_call {
                        break;
                    }
                    match DataRowAction::for_call(&call) {
                        DataRowAction::Skip => {
                            call.did_skip(1);
                            skipped.did_skip(1);
                        }
                        DataRowAction::Emit => {
                            call.did_produce(1);
                            emitted.push(row);
                        }
                        DataRowAction::Drop => {}
                        DataRowAction::Stop => break,
                    }
                }
                RowKind::Shadow { depth } => {
                    if depth == 0 {
                        if awaiting_call {
                            break;
                        }
                        match list.pop_next_call() {
                            Some(next) => {
                                next.validate()?;
                                call = next;
                            }
                            None => awaiting_call = true,
                        }
                    }
                    emitted.push(row);
                }
            }
            row += 1;
        }

        let output = if emitted.is_empty() {
            None
        } else if start == 0 && emitted.len() == block.rows() {
            Some(block.clone())
        } else {
            Some(self.copy_rows(&block, &emitted))
        };
        if row == block.rows() {
            self.blocks.pop_front();
            self.position = 0;
        } else {
            self.position = row;
        }
        let state = if self.blocks.is_empty() {
            ExecutionState::Done
        } else {
            ExecutionState::HasMore
        };
        debug!(
            block = "ConstSource",
            %call,
            rows = emitted.len(),
            skipped = skipped.get_skip_count(),
            ?state,
            "serving rows"
        );
        Ok((state, skipped, output))
    }

    fn name(&self) -> &str {
        "ConstSource"
    }
}
