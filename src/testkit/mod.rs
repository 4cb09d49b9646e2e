//! Scaffolding for driving pipelines from tests.
//!
//! Builders for input blocks and call stacks, a block that suspends on
//! demand, an in-memory cursor, and helpers that play the downstream client.

use std::sync::Once;

use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::error::{ExecError, Result};
use crate::exec::{
    AqlCall, AqlCallList, AqlCallStack, ExecuteResult, ExecutionBlock, ExecutionState,
    ItemBlockBuilder, RowKind, SharedItemBlock, SkipResult, TransactionalCursor, Value,
};

/// A row as seen by tests: its kind and register values.
pub type TestRow = (RowKind, Vec<Value>);

/// Installs a `tracing` subscriber once per process, honouring `RUST_LOG`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("blockflow=info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

/// Data row with the given register values.
pub fn data_row(values: impl IntoIterator<Item = Value>) -> TestRow {
    (RowKind::Data, values.into_iter().collect())
}

/// Shadow row of `depth` with the given register values.
pub fn shadow_row(depth: usize, values: impl IntoIterator<Item = Value>) -> TestRow {
    (RowKind::Shadow { depth }, values.into_iter().collect())
}

/// Block of single-register data rows holding `values`.
pub fn rows_block(values: impl IntoIterator<Item = i64>) -> SharedItemBlock {
    shadow_block(values.into_iter().map(|value| data_row([Value::Int(value)])))
}

/// Block of arbitrary rows. The register count is the widest row; shorter
/// rows are padded with nulls.
pub fn shadow_block(rows: impl IntoIterator<Item = TestRow>) -> SharedItemBlock {
    let rows: Vec<TestRow> = rows.into_iter().collect();
    let regs = rows.iter().map(|(_, values)| values.len()).max().unwrap_or(0);
    let mut builder = ItemBlockBuilder::new(rows.len(), regs);
    for (row, (kind, values)) in rows.into_iter().enumerate() {
        builder.set_kind(row, kind);
        for (reg, value) in values.into_iter().enumerate() {
            builder.set_value(row, reg, value);
        }
    }
    builder.freeze()
}

/// Reads every row of `block` back.
pub fn collect_output(block: &SharedItemBlock) -> Vec<TestRow> {
    (0..block.rows())
        .map(|row| (block.kind(row), block.row_values(row).to_vec()))
        .collect()
}

/// Top-level stack holding the single call `call`.
pub fn single_stack(call: AqlCall) -> AqlCallStack {
    AqlCallStack::new(AqlCallList::new(call))
}

/// Stack for a client reading one subquery level deep: `outer` once for the
/// enclosing level, `inner` for every subquery run.
pub fn subquery_stack(outer: AqlCall, inner: AqlCall) -> AqlCallStack {
    AqlCallStack::from_lists([AqlCallList::new(outer), AqlCallList::repeating(inner)])
}

/// Everything a client collected while draining a block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Drained {
    /// Rows of all returned blocks, in order.
    pub rows: Vec<TestRow>,
    /// Skips per level, outermost first, summed over all calls.
    pub skipped: Vec<usize>,
    /// Non-suspended `execute` calls.
    pub calls: usize,
    /// `Suspended` answers seen.
    pub suspensions: usize,
}

impl Drained {
    /// Values of register `reg` of every data row.
    pub fn data_values(&self, reg: usize) -> Vec<Value> {
        self.rows
            .iter()
            .filter(|(kind, _)| *kind == RowKind::Data)
            .map(|(_, values)| values.get(reg).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Number of data rows.
    pub fn data_rows(&self) -> usize {
        self.rows.iter().filter(|(kind, _)| *kind == RowKind::Data).count()
    }

    fn absorb(&mut self, skipped: &SkipResult, block: Option<SharedItemBlock>) {
        if self.skipped.len() < skipped.depth() {
            self.skipped.resize(skipped.depth(), 0);
        }
        for (total, level) in self.skipped.iter_mut().zip(skipped.levels()) {
            *total += level;
        }
        if let Some(block) = block {
            self.rows.extend(collect_output(&block));
        }
    }
}

const MAX_CALLS: usize = 100_000;

/// Calls `block` with a copy of `stack` until it reports `Done`, retrying
/// after suspensions.
pub fn drain<B: ExecutionBlock + ?Sized>(block: &mut B, stack: &AqlCallStack) -> Result<Drained> {
    let mut drained = Drained::default();
    while drained.calls + drained.suspensions < MAX_CALLS {
        let (state, skipped, output) = block.execute(stack.clone())?;
        if state == ExecutionState::Suspended {
            drained.suspensions += 1;
            continue;
        }
        drained.calls += 1;
        drained.absorb(&skipped, output);
        if state == ExecutionState::Done {
            return Ok(drained);
        }
    }
    Err(ExecError::internal(format!("{} did not finish", block.name())))
}

/// Plays a top-level client that wants `call` in total: after every answer
/// the call is reduced by what was skipped and produced.
pub fn drain_with_call<B: ExecutionBlock + ?Sized>(block: &mut B, mut call: AqlCall) -> Result<Drained> {
    let mut drained = Drained::default();
    while drained.calls + drained.suspensions < MAX_CALLS {
        let (state, skipped, output) = block.execute(single_stack(call))?;
        if state == ExecutionState::Suspended {
            drained.suspensions += 1;
            continue;
        }
        drained.calls += 1;
        let produced = output.as_ref().map_or(0, |block| block.rows());
        call.did_skip(skipped.get_skip_count());
        call.reset_skip_count();
        call.did_produce(produced);
        drained.absorb(&skipped, output);
        if state == ExecutionState::Done {
            return Ok(drained);
        }
        if call.get_offset() == 0 && call.has_soft_limit() && call.get_limit() == 0 {
            debug!("soft limit reached, client stops asking");
            return Ok(drained);
        }
    }
    Err(ExecError::internal(format!("{} did not finish", block.name())))
}

/// Plays a client one subquery level deep: unlimited on the enclosing level
/// and `inner` for every run. A run left open by an answer is continued with
/// what remains of its call.
pub fn drain_runs<B: ExecutionBlock + ?Sized>(block: &mut B, inner: AqlCall) -> Result<Drained> {
    let mut drained = Drained::default();
    let mut current = inner;
    while drained.calls + drained.suspensions < MAX_CALLS {
        let stack = AqlCallStack::from_lists([
            AqlCallList::new(AqlCall::new()),
            AqlCallList::with_default(current, inner),
        ]);
        let (state, skipped, output) = block.execute(stack)?;
        if state == ExecutionState::Suspended {
            drained.suspensions += 1;
            continue;
        }
        drained.calls += 1;
        if let Some(output) = &output {
            for row in 0..output.rows() {
                match output.kind(row) {
                    RowKind::Data => {
                        // A run writes only once its offset is used up.
                        current = current.with_offset(0);
                        current.did_produce(1);
                    }
                    RowKind::Shadow { depth: 0 } => current = inner,
                    RowKind::Shadow { .. } => {}
                }
            }
        }
        drained.absorb(&skipped, output);
        if state == ExecutionState::Done {
            return Ok(drained);
        }
    }
    Err(ExecError::internal(format!("{} did not finish", block.name())))
}

/// When a [`SuspendingBlock`] pretends its dependency is not ready.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuspendBehaviour {
    /// Answers every call.
    Never,
    /// Suspends the first call only.
    Once,
    /// Suspends before every answer.
    Always,
}

/// Wraps a block and answers with `Suspended` according to its behaviour,
/// like an asynchronous network dependency would.
pub struct SuspendingBlock<B> {
    inner: B,
    behaviour: SuspendBehaviour,
    suspend_next: bool,
    suspensions: usize,
}

impl<B: ExecutionBlock> SuspendingBlock<B> {
    /// Wraps `inner`.
    pub fn new(inner: B, behaviour: SuspendBehaviour) -> Self {
        Self {
            inner,
            behaviour,
            suspend_next: behaviour != SuspendBehaviour::Never,
            suspensions: 0,
        }
    }

    /// `Suspended` answers given so far.
    pub fn suspensions(&self) -> usize {
        self.suspensions
    }
}

impl<B: ExecutionBlock> ExecutionBlock for SuspendingBlock<B> {
    fn execute(&mut self, stack: AqlCallStack) -> Result<ExecuteResult> {
        if self.suspend_next {
            self.suspend_next = false;
            self.suspensions += 1;
            return Ok((
                ExecutionState::Suspended,
                SkipResult::with_depth(stack.subquery_level()),
                None,
            ));
        }
        self.suspend_next = self.behaviour == SuspendBehaviour::Always;
        self.inner.execute(stack)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Cursor over an in-memory list of documents.
#[derive(Clone, Debug, Default)]
pub struct VecCursor {
    documents: Vec<Value>,
    position: usize,
    resets: usize,
}

impl VecCursor {
    /// Cursor yielding `documents` in order.
    pub fn new(documents: impl IntoIterator<Item = Value>) -> Self {
        Self {
            documents: documents.into_iter().collect(),
            position: 0,
            resets: 0,
        }
    }

    /// How often the cursor was rewound.
    pub fn resets(&self) -> usize {
        self.resets
    }
}

impl TransactionalCursor for VecCursor {
    fn has_more(&self) -> bool {
        self.position < self.documents.len()
    }

    fn next(&mut self, callback: &mut dyn FnMut(Value), at_most: usize) -> Result<bool> {
        let end = self.position.saturating_add(at_most).min(self.documents.len());
        for document in &self.documents[self.position..end] {
            callback(document.clone());
        }
        self.position = end;
        Ok(self.has_more())
    }

    fn skip(&mut self, n: usize) -> Result<usize> {
        let skipped = n.min(self.documents.len() - self.position);
        self.position += skipped;
        Ok(skipped)
    }

    fn reset(&mut self) {
        self.position = 0;
        self.resets += 1;
    }
}
