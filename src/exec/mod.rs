#![forbid(unsafe_code)]

//! Pull-based block execution core.
//!
//! A pipeline is a chain of [`ExecutionBlock`]s. The client asks the last
//! block with an [`AqlCallStack`]; each block asks its dependency in turn,
//! runs its [`Executor`] over the returned rows and answers with one block of
//! output plus the rows it skipped on every subquery level.

/// Reference-counted row × register blocks and their builders.
pub mod block;

/// Recycling allocator for block buffers.
pub mod block_manager;

/// Offset, limit and full-count accounting of a single call.
pub mod call;

/// Per-level queue of calls with an optional default.
pub mod call_list;

/// Calls of every open subquery level.
pub mod call_stack;

/// Interfaces of the evaluator and cursor collaborators.
pub mod collab;

/// State shared by the blocks of one pipeline.
pub mod context;

/// The state machine running an executor as a block.
pub mod driver;

/// Stage and block contracts.
pub mod executor;

/// Concrete stages.
pub mod executors;

/// Failure points for tests.
pub mod fault;

/// Driver tuning.
pub mod options;

/// Write cursor into output blocks.
pub mod output;

/// Timing counters of the driver phases.
pub mod profile;

/// Cursor over the input rows of one invocation.
pub mod range;

/// Register layouts.
pub mod register;

/// Read-only row views.
pub mod row;

/// Per-level skip counters.
pub mod skip;

/// Root block serving prepared blocks.
pub mod source;

/// Register values.
pub mod value;

pub use block::{ItemBlockBuilder, RowKind, SharedItemBlock};
pub use block_manager::{BlockManager, BlockManagerStats};
pub use call::{AqlCall, Limit};
pub use call_list::AqlCallList;
pub use call_stack::AqlCallStack;
pub use collab::{Evaluator, TransactionalCursor};
pub use context::ExecContext;
pub use driver::ExecutionBlockImpl;
pub use executor::{
    ExecuteResult, ExecutionBlock, ExecutionState, Executor, ExecutorKind, ExecutorState, NoStats,
};
pub use options::{ExecOptions, DEFAULT_BATCH_SIZE};
pub use output::OutputRow;
pub use profile::{exec_profile_snapshot, ExecProfileSnapshot};
pub use range::InputRange;
pub use register::{RegisterId, RegisterInfos, RegisterPlan};
pub use row::{InputRow, ShadowRow};
pub use skip::SkipResult;
pub use source::ConstSource;
pub use value::Value;
