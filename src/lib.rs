//! Demand-driven block streaming execution core.
//!
//! Stages pull bounded batches of rows from their dependencies, answer
//! partially when they must, and flatten nested subqueries into a single
//! row stream by interleaving shadow rows.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Crate error type and result alias.
pub mod error;

/// Execution core: calls, blocks, rows, the driver loop and its stages.
pub mod exec;

/// Helpers for driving pipelines in tests.
pub mod testkit;

pub use error::{ErrorCode, ExecError, Result};
pub use exec::{
    AqlCall, AqlCallList, AqlCallStack, ConstSource, ExecContext, ExecOptions, ExecutionBlock,
    ExecutionBlockImpl, ExecutionState, Executor, ExecutorState, SkipResult, Value,
};
