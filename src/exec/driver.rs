//! Driver loop running one [`Executor`] as an [`ExecutionBlock`].
//!
//! Every `execute` call walks a small state machine:
//!
//! * `CheckCall` picks the next action from the client call.
//! * `Skip` and `Produce` hand the current input range to the executor.
//! * `FastForward` drops or counts whatever the call no longer wants.
//! * `Upstream` asks the dependency for the next block.
//! * `ShadowRows` forwards the shadow rows closing a subquery run.
//! * `NextSubquery` moves on to the client's call for the next run.
//!
//! The loop ends in `Done` once the call is satisfied, the output block is
//! full, or the dependency has nothing left.

use std::sync::Arc;

use tracing::{debug, trace};

use super::call::AqlCall;
use super::call_list::AqlCallList;
use super::call_stack::AqlCallStack;
use super::context::ExecContext;
use super::executor::{
    ExecuteResult, ExecutionBlock, ExecutionState, Executor, ExecutorKind, ExecutorState,
};
use super::fault::fail_point;
use super::output::OutputRow;
use super::profile::{profile_timer, record_profile_timer, ExecProfileKind};
use super::range::InputRange;
use super::register::RegisterInfos;
use super::skip::SkipResult;
use crate::error::{ExecError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ExecState {
    CheckCall,
    Skip,
    Produce,
    FastForward,
    Upstream,
    ShadowRows,
    NextSubquery,
    Done,
}

/// How rows the client no longer wants are disposed of.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FastForwardVariant {
    /// Skip through the executor and report the count.
    FullCount,
    /// Skip through the executor and forget the count.
    Executor,
    /// Drop the input without bothering the executor.
    Fetcher,
}

/// Charges one row against `call`, failing if its limit is used up.
fn charge_row(call: &mut AqlCall) -> Result<()> {
    if call.get_limit() == 0 {
        return Err(ExecError::internal(format!(
            "row produced beyond the limit of call {call}"
        )));
    }
    call.did_produce(1);
    Ok(())
}

/// Books a forwarded shadow row of `depth` on the level it belongs to and
/// retires the call of the run it closes.
fn count_shadow_row_produced(stack: &mut AqlCallStack, depth: usize) -> Result<()> {
    charge_row(stack.modify_call_at_depth(depth)?)?;
    if depth > 0 {
        stack.modify_call_list_at_depth(depth - 1)?.pop_next_call();
    }
    Ok(())
}

/// Runs executor `E` on the rows of one dependency.
pub struct ExecutionBlockImpl<E: Executor> {
    executor: E,
    infos: Arc<RegisterInfos>,
    dependency: Box<dyn ExecutionBlock>,
    context: ExecContext,
    exec_state: ExecState,
    last_range: InputRange,
    upstream_state: ExecutorState,
    upstream_request: AqlCall,
    client_request: AqlCall,
    stack_before_suspend: AqlCallStack,
    output: Option<OutputRow>,
    skipped: SkipResult,
    executor_returned_done: bool,
    default_upstream_request: Option<AqlCall>,
    has_memoized_call: bool,
    block_stats: E::Stats,
    transitions: usize,
}

impl<E: Executor> ExecutionBlockImpl<E> {
    /// Wraps `executor`, reading from `dependency`.
    pub fn new(
        executor: E,
        infos: RegisterInfos,
        dependency: impl ExecutionBlock + 'static,
        context: ExecContext,
    ) -> Self {
        Self {
            executor,
            infos: Arc::new(infos),
            dependency: Box::new(dependency),
            context,
            exec_state: ExecState::CheckCall,
            last_range: InputRange::new(ExecutorState::HasMore),
            upstream_state: ExecutorState::HasMore,
            upstream_request: AqlCall::new(),
            client_request: AqlCall::new(),
            stack_before_suspend: AqlCallStack::default(),
            output: None,
            skipped: SkipResult::new(),
            executor_returned_done: false,
            default_upstream_request: None,
            has_memoized_call: false,
            block_stats: E::Stats::default(),
            transitions: 0,
        }
    }

    /// Statistics summed over every executor invocation so far.
    pub fn stats(&self) -> &E::Stats {
        &self.block_stats
    }

    /// The wrapped executor.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    fn poll_kill(&mut self) -> Result<()> {
        self.transitions = self.transitions.wrapping_add(1);
        if self.transitions % self.context.options().kill_check_interval.max(1) == 0 {
            self.context.check_killed()?;
        }
        Ok(())
    }

    fn next_state(&self, call: &AqlCall) -> ExecState {
        if self.executor_returned_done {
            return ExecState::FastForward;
        }
        if call.get_offset() > 0 {
            return ExecState::Skip;
        }
        if call.get_limit() > 0 {
            return ExecState::Produce;
        }
        if call.hard_limit() == 0 {
            return ExecState::FastForward;
        }
        ExecState::Done
    }

    fn fast_forward_type(call: &AqlCall) -> FastForwardVariant {
        if call.needs_full_count() && call.get_offset() == 0 && call.get_limit() == 0 {
            return FastForwardVariant::FullCount;
        }
        if E::FAST_FORWARD_NEEDS_EXECUTOR {
            return FastForwardVariant::Executor;
        }
        FastForwardVariant::Fetcher
    }

    fn execute_fast_forward(
        &mut self,
        client_call: &mut AqlCall,
    ) -> Result<(ExecutorState, E::Stats, usize, AqlCall)> {
        match Self::fast_forward_type(client_call) {
            FastForwardVariant::FullCount => {
                debug!(block = E::NAME, "apply full count");
                let result = self.executor.skip_rows_range(&mut self.last_range, client_call)?;
                self.executor_returned_done = result.0 == ExecutorState::Done;
                Ok(result)
            }
            FastForwardVariant::Executor => {
                debug!(block = E::NAME, "fast forward through executor");
                let mut dummy = AqlCall::full_count_only();
                let (state, stats, _, call) =
                    self.executor.skip_rows_range(&mut self.last_range, &mut dummy)?;
                self.executor_returned_done = state == ExecutorState::Done;
                Ok((state, stats, 0, call))
            }
            FastForwardVariant::Fetcher => {
                debug!(block = E::NAME, "bypass unused rows");
                self.last_range.skip_all_remaining_data_rows();
                Ok((
                    self.last_range.upstream_state(),
                    E::Stats::default(),
                    0,
                    AqlCall::fast_forward(),
                ))
            }
        }
    }

    /// Builds the list sent to the dependency. The first plain call issued
    /// while the client has calls for later runs becomes the default for
    /// every following run.
    fn create_upstream_call(&mut self, call: AqlCall, client_has_more_calls: bool) -> AqlCallList {
        if !self.has_memoized_call {
            if client_has_more_calls && call == AqlCall::new() {
                self.default_upstream_request = Some(call);
            }
            self.has_memoized_call = true;
        }
        match self.default_upstream_request {
            Some(default_call) => AqlCallList::with_default(call, default_call),
            None => AqlCallList::new(call),
        }
    }

    fn output_is_full(&self) -> bool {
        self.output
            .as_ref()
            .is_some_and(|output| output.is_initialized() && output.all_rows_used())
    }

    fn allocate_output_block(&self, call: AqlCall) -> OutputRow {
        let range = &self.last_range;
        let infos = Arc::clone(&self.infos);
        if !range.has_valid_row() && range.upstream_state() == ExecutorState::HasMore {
            // Nothing to work on yet; allocate once input arrives.
            return OutputRow::new(None, infos, call);
        }
        let batch_size = self.context.options().batch_size;
        let mut rows = batch_size;
        if range.final_state() == ExecutorState::Done || call.has_soft_limit() {
            rows = self.executor.expected_number_of_rows(range, &call);
            if range.final_state() == ExecutorState::HasMore {
                rows = rows.max(call.get_limit());
            }
            rows = rows.saturating_add(range.count_shadow_rows()).min(batch_size);
        }
        let block = (rows > 0).then(|| {
            self.context
                .block_manager()
                .request_block(rows, infos.number_of_output_registers())
        });
        OutputRow::new(block, infos, call)
    }

    fn ensure_output_block(&mut self, call: AqlCall) {
        if let Some(output) = self.output.as_mut() {
            if output.is_initialized() {
                output.set_call(call);
                return;
            }
        }
        self.output = Some(self.allocate_output_block(call));
    }

    fn output_mut(&mut self) -> Result<&mut OutputRow> {
        self.output
            .as_mut()
            .ok_or_else(|| ExecError::internal("shadow row forwarding without an output row"))
    }

    fn forward_shadow_row(&mut self, stack: &mut AqlCallStack) -> Result<ExecState> {
        if !self.last_range.has_shadow_row() {
            return Ok(ExecState::NextSubquery);
        }
        let (state, shadow) = self.last_range.next_shadow_row();
        let shadow = shadow.ok_or_else(|| ExecError::internal("shadow row vanished from range"))?;
        count_shadow_row_produced(stack, shadow.depth())?;
        if shadow.is_relevant() {
            debug!(block = E::NAME, "relevant shadow row, init executor");
            self.executor.reset();
            self.executor_returned_done = false;
        }
        let output = self.output_mut()?;
        output.move_row(&shadow)?;
        output.advance_row()?;

        if state == ExecutorState::Done {
            return Ok(ExecState::Done);
        }
        if self.last_range.has_data_row() {
            return Ok(ExecState::NextSubquery);
        }
        match self.last_range.peek_shadow_row() {
            Some(next) if !next.is_relevant() => Ok(ExecState::ShadowRows),
            _ => Ok(ExecState::NextSubquery),
        }
    }

    fn forward_shadow_row_subquery_start(&mut self, stack: &mut AqlCallStack) -> Result<ExecState> {
        if self.last_range.has_data_row() {
            let output = self
                .output
                .as_mut()
                .ok_or_else(|| ExecError::internal("shadow row forwarding without an output row"))?;
            let did_write = self.executor.produce_shadow_row(&mut self.last_range, output)?;
            // Subquery start reports done after every row.
            self.executor_returned_done = false;
            if !did_write {
                return Ok(ExecState::CheckCall);
            }
            charge_row(stack.modify_top_call()?)?;
            if self.last_range.has_shadow_row() {
                return Ok(ExecState::ShadowRows);
            }
            return Ok(ExecState::NextSubquery);
        }

        let (_, shadow) = self.last_range.next_shadow_row();
        let shadow = shadow.ok_or_else(|| ExecError::internal("shadow row vanished from range"))?;
        if shadow.depth() >= stack.subquery_level() {
            return Err(ExecError::internal(format!(
                "shadow row of depth {} with only {} enclosing levels",
                shadow.depth(),
                stack.subquery_level()
            )));
        }
        let output = self.output_mut()?;
        output.increase_shadow_row_depth(&shadow)?;
        output.advance_row()?;
        if self.last_range.has_shadow_row() {
            return Ok(ExecState::ShadowRows);
        }

        let list = stack.modify_call_list_at_depth(shadow.depth())?;
        if !list.has_default_calls() {
            return Ok(ExecState::Done);
        }
        let call = list
            .modify_next_call()
            .ok_or_else(|| ExecError::internal("call list with default ran dry"))?;
        if call.get_limit() == 0 && !call.need_skip_more() {
            return Ok(ExecState::Done);
        }
        self.executor_returned_done = false;
        Ok(ExecState::NextSubquery)
    }

    fn forward_shadow_row_subquery_end(&mut self, stack: &mut AqlCallStack) -> Result<ExecState> {
        if !self.last_range.has_shadow_row() {
            return Ok(ExecState::NextSubquery);
        }
        let (state, shadow) = self.last_range.next_shadow_row();
        let shadow = shadow.ok_or_else(|| ExecError::internal("shadow row vanished from range"))?;
        let output = self
            .output
            .as_mut()
            .ok_or_else(|| ExecError::internal("shadow row forwarding without an output row"))?;
        if shadow.is_relevant() {
            self.executor.consume_shadow_row(&shadow, output)?;
            // Subquery end reports done after every collected run.
            self.executor_returned_done = false;
        } else {
            output.decrease_shadow_row_depth(&shadow)?;
        }
        output.advance_row()?;
        let all_rows_used = output.all_rows_used();
        // The stack still holds the client's calls; inbound subquery rows are
        // booked on their own level.
        count_shadow_row_produced(stack, shadow.depth())?;

        if state == ExecutorState::Done {
            Ok(ExecState::Done)
        } else if self.last_range.has_data_row() {
            Ok(ExecState::NextSubquery)
        } else if self.last_range.has_shadow_row() {
            Ok(ExecState::ShadowRows)
        } else if all_rows_used {
            Ok(ExecState::Done)
        } else {
            Ok(ExecState::NextSubquery)
        }
    }

    /// Charges skips reported by the dependency to the enclosing levels of
    /// `stack` and merges them into this block's skip result.
    fn apply_upstream_skips(&mut self, stack: &mut AqlCallStack, mut skipped: SkipResult) -> Result<()> {
        let level_offset = if E::KIND == ExecutorKind::SubqueryStart { 0 } else { 1 };
        for depth in 0..stack.subquery_level() {
            let count = skipped.get_skip_on_subquery_level(depth + level_offset);
            if count > 0 {
                let call = stack.modify_call_at_depth(depth)?;
                call.did_skip(count);
                call.reset_skip_count();
            }
        }
        match E::KIND {
            ExecutorKind::Regular => {
                if skipped.get_skip_count() != 0 {
                    return Err(ExecError::internal(format!(
                        "dependency skipped {} rows without being asked to",
                        skipped.get_skip_count()
                    )));
                }
                self.skipped.merge(&skipped, true);
            }
            ExecutorKind::SubqueryStart => self.skipped.merge(&skipped, false),
            ExecutorKind::SubqueryEnd => {
                if skipped.get_skip_count() != 0 {
                    return Err(ExecError::internal(
                        "subquery end was reported skipped rows inside its subquery",
                    ));
                }
                skipped.decrement_subquery();
                self.skipped.merge(&skipped, false);
            }
        }
        Ok(())
    }

    fn execute_state_machine(&mut self, mut stack: AqlCallStack) -> Result<ExecuteResult> {
        let incoming_depth = stack.subquery_level();
        if !stack.has_all_valid_calls() {
            return Err(ExecError::internal(format!(
                "{} called with an exhausted call stack {stack}",
                E::NAME
            )));
        }
        let mut client_list = stack.pop_call()?;
        let mut client_call = if E::KIND == ExecutorKind::SubqueryEnd {
            // The client's calls stay on the stack for the subquery; the
            // executor itself collects everything.
            stack.push_call(client_list);
            client_list = AqlCallList::repeating(AqlCall::new());
            AqlCall::new()
        } else {
            client_list
                .pop_next_call()
                .ok_or_else(|| ExecError::internal("client call list is empty"))?
        };
        if client_call.get_skip_count() != 0 {
            return Err(ExecError::internal(format!(
                "called with a skip count already set: {client_call}"
            )));
        }
        client_call.validate()?;

        if self.skipped.depth() != incoming_depth {
            if !self.skipped.nothing_skipped() {
                return Err(ExecError::internal(
                    "call stack depth changed while skips were pending",
                ));
            }
            self.skipped = SkipResult::with_depth(incoming_depth);
        }

        if E::KIND != ExecutorKind::SubqueryEnd {
            if let Some(output) = self.output.as_ref().filter(|output| output.is_initialized()) {
                client_call = output.client_call();
            }
        }

        if self.exec_state == ExecState::Upstream {
            // Resuming after a suspension: the work done so far was booked on
            // the saved call and stack.
            if !self.client_request.request_less_data_than(&client_call) {
                return Err(ExecError::internal(format!(
                    "client changed its call across a suspension: {} then {client_call}",
                    self.client_request
                )));
            }
            if self.stack_before_suspend.subquery_level() != stack.subquery_level() {
                return Err(ExecError::internal(
                    "client changed its call stack across a suspension",
                ));
            }
            client_call = self.client_request;
            stack = std::mem::take(&mut self.stack_before_suspend);
        }

        let mut return_to_state = ExecState::CheckCall;
        let mut local_executor_state = ExecutorState::Done;

        debug!(block = E::NAME, call = %client_call, "starting state machine");
        while self.exec_state != ExecState::Done {
            self.poll_kill()?;
            trace!(block = E::NAME, state = ?self.exec_state, call = %client_call, "driver step");
            self.exec_state = match self.exec_state {
                ExecState::CheckCall => self.next_state(&client_call),
                ExecState::Skip => {
                    fail_point!("ExecutionBlock::skip");
                    let timer = profile_timer();
                    let result = self
                        .executor
                        .skip_rows_range(&mut self.last_range, &mut client_call);
                    client_call.reset_skip_count();
                    record_profile_timer(ExecProfileKind::Skip, timer);
                    let (state, stats, skipped, call) = result?;
                    self.executor_returned_done = state == ExecutorState::Done;
                    local_executor_state = state;
                    self.skipped.did_skip(skipped);
                    self.block_stats += stats;
                    if state == ExecutorState::Done {
                        ExecState::FastForward
                    } else if client_call.get_offset() > 0 {
                        self.upstream_request = call;
                        ExecState::Upstream
                    } else {
                        ExecState::CheckCall
                    }
                }
                ExecState::Produce => {
                    if self.output_is_full() {
                        // The client may change its mind before the next
                        // call, so the position is not recorded.
                        ExecState::Done
                    } else {
                        fail_point!("ExecutionBlock::produce");
                        let output_call = if E::KIND == ExecutorKind::SubqueryEnd {
                            stack.peek()?
                        } else {
                            client_call
                        };
                        self.ensure_output_block(output_call);
                        let output = self
                            .output
                            .as_mut()
                            .ok_or_else(|| ExecError::internal("output row missing after allocation"))?;
                        let timer = profile_timer();
                        let result = self.executor.produce_rows(&mut self.last_range, output);
                        record_profile_timer(ExecProfileKind::Produce, timer);
                        let (state, stats, call) = result?;
                        if E::KIND != ExecutorKind::SubqueryEnd {
                            client_call = output.client_call();
                        }
                        self.executor_returned_done = state == ExecutorState::Done;
                        self.block_stats += stats;
                        local_executor_state = state;
                        if state == ExecutorState::Done {
                            ExecState::FastForward
                        } else if client_call.get_limit() > 0 && self.output_is_full() {
                            ExecState::Done
                        } else if client_call.get_limit() > 0 && !self.last_range.has_data_row() {
                            self.upstream_request = call;
                            ExecState::Upstream
                        } else {
                            ExecState::CheckCall
                        }
                    }
                }
                ExecState::FastForward => {
                    debug!(block = E::NAME, "all produced, fast forward to end of run");
                    let timer = profile_timer();
                    let result = self.execute_fast_forward(&mut client_call);
                    client_call.reset_skip_count();
                    record_profile_timer(ExecProfileKind::Skip, timer);
                    let (state, stats, skipped, call) = result?;
                    self.skipped.did_skip(skipped);
                    self.block_stats += stats;
                    local_executor_state = state;
                    if state == ExecutorState::Done {
                        if self.last_range.has_valid_row() {
                            ExecState::ShadowRows
                        } else {
                            ExecState::Done
                        }
                    } else {
                        self.upstream_request = call;
                        ExecState::Upstream
                    }
                }
                ExecState::Upstream => {
                    if self.upstream_state == ExecutorState::Done {
                        return Err(ExecError::internal(format!(
                            "{} asked its finished dependency for more rows",
                            E::NAME
                        )));
                    }
                    if self.last_range.has_valid_row() {
                        return Err(ExecError::internal(format!(
                            "{} fetched with unconsumed input left",
                            E::NAME
                        )));
                    }
                    fail_point!("ExecutionBlock::upstream");
                    debug!(block = E::NAME, request = %self.upstream_request, "request dependency");
                    let mut upstream_stack = stack.clone();
                    if E::KIND != ExecutorKind::SubqueryStart {
                        // Subquery start hands the enclosing levels up as
                        // they are; its own level ends here.
                        let list =
                            self.create_upstream_call(self.upstream_request, client_list.has_more_calls());
                        upstream_stack.push_call(list);
                    }
                    let expected_depth = upstream_stack.subquery_level();
                    let timer = profile_timer();
                    let result = self.dependency.execute(upstream_stack);
                    record_profile_timer(ExecProfileKind::Upstream, timer);
                    let (state, skipped, block) = result?;

                    if state == ExecutionState::Suspended {
                        debug!(block = E::NAME, "dependency suspended");
                        self.client_request = client_call;
                        self.stack_before_suspend = stack;
                        return Ok((
                            ExecutionState::Suspended,
                            SkipResult::with_depth(incoming_depth),
                            None,
                        ));
                    }
                    if skipped.depth() != expected_depth {
                        return Err(ExecError::internal(format!(
                            "dependency {} reported skips for {} levels, expected {expected_depth}",
                            self.dependency.name(),
                            skipped.depth()
                        )));
                    }
                    if let Some(block) = &block {
                        if self.context.options().validate_shadow_rows {
                            block.validate_shadow_row_consistency()?;
                        }
                    }
                    self.apply_upstream_skips(&mut stack, skipped)?;

                    self.upstream_state = match state {
                        ExecutionState::Done => ExecutorState::Done,
                        _ => ExecutorState::HasMore,
                    };
                    self.last_range = InputRange::from_block(self.upstream_state, block);
                    match self.last_range.peek_shadow_row() {
                        Some(shadow) if !shadow.is_relevant() => ExecState::ShadowRows,
                        _ => ExecState::CheckCall,
                    }
                }
                ExecState::ShadowRows => {
                    if self.output_is_full() {
                        return_to_state = ExecState::ShadowRows;
                        ExecState::Done
                    } else {
                        debug!(block = E::NAME, "run completed, move shadow rows");
                        self.ensure_output_block(client_call);
                        let timer = profile_timer();
                        let next = match E::KIND {
                            ExecutorKind::Regular => self.forward_shadow_row(&mut stack),
                            ExecutorKind::SubqueryStart => {
                                self.forward_shadow_row_subquery_start(&mut stack)
                            }
                            ExecutorKind::SubqueryEnd => self.forward_shadow_row_subquery_end(&mut stack),
                        };
                        record_profile_timer(ExecProfileKind::ShadowRows, timer);
                        let next = next?;
                        if E::KIND != ExecutorKind::SubqueryEnd {
                            if let Some(output) = &self.output {
                                client_call = output.client_call();
                            }
                        }
                        next
                    }
                }
                ExecState::NextSubquery => {
                    debug!(block = E::NAME, "shadow rows moved, continue with next run");
                    let soft_limit_reached = E::KIND == ExecutorKind::SubqueryStart && {
                        let current = stack.peek()?;
                        current.get_limit() == 0 && current.has_soft_limit()
                    };
                    if soft_limit_reached || !stack.has_all_valid_calls() {
                        ExecState::Done
                    } else if self.output_is_full() {
                        // The next run must not touch its call before it can
                        // write; the client hands that call in next time.
                        ExecState::Done
                    } else if let Some(call) = client_list.pop_next_call() {
                        client_call = call;
                        ExecState::CheckCall
                    } else {
                        ExecState::Done
                    }
                }
                ExecState::Done => ExecState::Done,
            };
        }

        let block = self.output.take().and_then(|mut output| output.steal_block());
        self.exec_state = return_to_state;
        let skipped = self.skipped.clone();
        self.skipped.reset();
        if skipped.depth() != incoming_depth {
            return Err(ExecError::internal(format!(
                "skip result covers {} levels for a stack of {incoming_depth}",
                skipped.depth()
            )));
        }
        let state = if local_executor_state == ExecutorState::HasMore || self.last_range.has_valid_row() {
            ExecutionState::HasMore
        } else {
            self.upstream_state.into()
        };
        debug!(
            block = E::NAME,
            ?state,
            skipped = %skipped,
            rows = block.as_ref().map_or(0, |block| block.rows()),
            "state machine done"
        );
        Ok((state, skipped, block))
    }
}

impl<E: Executor> ExecutionBlock for ExecutionBlockImpl<E> {
    fn execute(&mut self, stack: AqlCallStack) -> Result<ExecuteResult> {
        self.context.check_killed()?;
        fail_point!("ExecutionBlock::execute");
        self.execute_state_machine(stack)
    }

    fn name(&self) -> &str {
        E::NAME
    }
}
