//! Collaborators the stages call out to. Their implementations live outside
//! the execution core.

use super::row::InputRow;
use super::value::Value;
use crate::error::Result;

/// Computes a value from the registers of an input row.
pub trait Evaluator {
    /// Value of the expression for `row`.
    fn evaluate(&self, row: &InputRow) -> Result<Value>;
}

impl<F> Evaluator for F
where
    F: Fn(&InputRow) -> Result<Value>,
{
    fn evaluate(&self, row: &InputRow) -> Result<Value> {
        self(row)
    }
}

/// Cursor over documents read within the query's transaction.
pub trait TransactionalCursor {
    /// True while documents are left.
    fn has_more(&self) -> bool;

    /// Hands up to `at_most` documents to `callback`. Returns whether
    /// documents are left afterwards.
    fn next(&mut self, callback: &mut dyn FnMut(Value), at_most: usize) -> Result<bool>;

    /// Moves past up to `n` documents and returns how many it passed.
    fn skip(&mut self, n: usize) -> Result<usize>;

    /// Rewinds to the first document.
    fn reset(&mut self);
}
