//! Calls for every subquery level, outermost first.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::call::AqlCall;
use super::call_list::AqlCallList;
use crate::error::{ExecError, Result};

/// Calls for every open subquery level, outermost first.
///
/// Each block pops the top list to learn what its client wants and pushes the
/// list it wants from its own dependency before passing the stack upstream.
/// Depth arguments count from the top: depth 0 is the innermost list that is
/// still on the stack.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AqlCallStack {
    operations: Vec<AqlCallList>,
}

impl AqlCallStack {
    /// Stack with a single level.
    pub fn new(list: AqlCallList) -> Self {
        Self {
            operations: vec![list],
        }
    }

    /// Stack built from lists given outermost first.
    pub fn from_lists(lists: impl IntoIterator<Item = AqlCallList>) -> Self {
        Self {
            operations: lists.into_iter().collect(),
        }
    }

    /// Number of levels on the stack.
    pub fn subquery_level(&self) -> usize {
        self.operations.len()
    }

    /// True if no level is left.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// True if rows produced against the top level are final query results.
    pub fn is_relevant(&self) -> bool {
        self.operations.len() <= 1
    }

    /// Pushes the list a block sends to its dependency.
    pub fn push_call(&mut self, list: AqlCallList) {
        self.operations.push(list);
    }

    /// Removes the innermost list.
    pub fn pop_call(&mut self) -> Result<AqlCallList> {
        self.operations
            .pop()
            .ok_or_else(|| ExecError::internal("popped a call from an empty call stack"))
    }

    /// Next call of the innermost list.
    pub fn peek(&self) -> Result<AqlCall> {
        self.operations
            .last()
            .and_then(AqlCallList::peek_next_call)
            .ok_or_else(|| ExecError::internal("no call left on the innermost level"))
    }

    /// Mutable access to the next call of the innermost list.
    pub fn modify_top_call(&mut self) -> Result<&mut AqlCall> {
        self.modify_call_at_depth(0)
    }

    /// Mutable access to the list `depth` levels below the top.
    pub fn modify_call_list_at_depth(&mut self, depth: usize) -> Result<&mut AqlCallList> {
        let len = self.operations.len();
        if depth >= len {
            return Err(ExecError::internal(format!(
                "shadow row of depth {depth} on a call stack with {len} levels"
            )));
        }
        Ok(&mut self.operations[len - 1 - depth])
    }

    /// Mutable access to the next call of the list `depth` levels below the top.
    pub fn modify_call_at_depth(&mut self, depth: usize) -> Result<&mut AqlCall> {
        self.modify_call_list_at_depth(depth)?
            .modify_next_call()
            .ok_or_else(|| ExecError::internal(format!("no call left at depth {depth}")))
    }

    /// True if every level still has a call that allows some work.
    ///
    /// A level whose next call has used up a soft limit without anything left
    /// to skip blocks the whole stack until the client asks again.
    pub fn has_all_valid_calls(&self) -> bool {
        self.operations.iter().all(|list| match list.peek_next_call() {
            Some(call) => !(call.get_limit() == 0 && call.get_offset() == 0 && call.has_soft_limit()),
            None => false,
        })
    }

    /// True if any level is currently skipping or fast-forwarding its subquery.
    pub fn need_to_skip_subquery(&self) -> bool {
        self.operations.iter().any(|list| {
            list.peek_next_call()
                .is_some_and(|call| call.need_skip_more() || call.hard_limit() == 0)
        })
    }

    /// True if every level asks for no more than the same level of `other`.
    pub fn request_less_data_than(&self, other: &AqlCallStack) -> bool {
        self.operations.len() == other.operations.len()
            && self
                .operations
                .iter()
                .zip(&other.operations)
                .all(|(mine, theirs)| match (mine.peek_next_call(), theirs.peek_next_call()) {
                    (Some(mine), Some(theirs)) => mine.request_less_data_than(&theirs),
                    (None, _) => true,
                    (Some(_), None) => false,
                })
    }
}

impl fmt::Display for AqlCallStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, list) in self.operations.iter().enumerate() {
            if idx > 0 {
                f.write_str(" <- ")?;
            }
            write!(f, "{list}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_levels() -> AqlCallStack {
        AqlCallStack::from_lists([
            AqlCallList::new(AqlCall::new().with_offset(1)),
            AqlCallList::repeating(AqlCall::new()),
        ])
    }

    #[test]
    fn depth_counts_from_the_top() {
        let mut stack = two_levels();
        assert_eq!(stack.subquery_level(), 2);
        assert_eq!(stack.modify_call_at_depth(1).unwrap().get_offset(), 1);
        assert_eq!(stack.modify_call_at_depth(0).unwrap().get_offset(), 0);
        assert!(stack.modify_call_list_at_depth(2).is_err());
    }

    #[test]
    fn pop_and_push_restore_shape() {
        let mut stack = two_levels();
        let top = stack.pop_call().unwrap();
        assert_eq!(stack.subquery_level(), 1);
        assert!(stack.is_relevant());
        stack.push_call(top);
        assert_eq!(stack, two_levels());
        let mut empty = AqlCallStack::default();
        assert!(empty.pop_call().is_err());
        assert!(empty.peek().is_err());
    }

    #[test]
    fn exhausted_soft_limit_invalidates_stack() {
        let mut stack = AqlCallStack::new(AqlCallList::new(AqlCall::new().with_soft_limit(1)));
        assert!(stack.has_all_valid_calls());
        stack.modify_top_call().unwrap().did_produce(1);
        assert!(!stack.has_all_valid_calls());

        let mut stack = AqlCallStack::new(AqlCallList::new(AqlCall::new()));
        stack.pop_call().unwrap();
        stack.push_call(AqlCallList::new(AqlCall::new()));
        stack.modify_call_list_at_depth(0).unwrap().pop_next_call();
        assert!(!stack.has_all_valid_calls());
    }

    #[test]
    fn skipping_levels_are_detected() {
        assert!(two_levels().need_to_skip_subquery());
        let stack = AqlCallStack::new(AqlCallList::new(AqlCall::fast_forward()));
        assert!(stack.need_to_skip_subquery());
        let stack = AqlCallStack::new(AqlCallList::new(AqlCall::new().with_hard_limit(3)));
        assert!(!stack.need_to_skip_subquery());
    }

    #[test]
    fn retry_may_not_widen_the_request() {
        let before = two_levels();
        let mut after = two_levels();
        after.modify_call_at_depth(1).unwrap().did_skip(1);
        assert!(after.request_less_data_than(&before));
        assert!(!before.request_less_data_than(&after));
    }
}
