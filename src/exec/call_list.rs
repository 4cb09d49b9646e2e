//! Calls for one subquery level.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::call::AqlCall;

/// Calls for one subquery nesting level.
///
/// A list holds the calls for the next few subquery runs at its level plus an
/// optional default call. Once the specific calls are used up, every further
/// run is served with a copy of the default.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AqlCallList {
    specific_calls: VecDeque<AqlCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_call: Option<AqlCall>,
}

impl AqlCallList {
    /// List with exactly one call and no default.
    pub fn new(call: AqlCall) -> Self {
        Self {
            specific_calls: VecDeque::from([call]),
            default_call: None,
        }
    }

    /// List starting with `call` and repeating `default_call` afterwards.
    pub fn with_default(call: AqlCall, default_call: AqlCall) -> Self {
        Self {
            specific_calls: VecDeque::from([call]),
            default_call: Some(default_call),
        }
    }

    /// List with no specific call that serves `default_call` forever.
    pub fn repeating(default_call: AqlCall) -> Self {
        Self {
            specific_calls: VecDeque::new(),
            default_call: Some(default_call),
        }
    }

    /// Appends a specific call served after the ones already queued.
    pub fn push_call(&mut self, call: AqlCall) {
        self.specific_calls.push_back(call);
    }

    /// Takes the next call. Returns `None` if the list is exhausted.
    pub fn pop_next_call(&mut self) -> Option<AqlCall> {
        self.specific_calls.pop_front().or(self.default_call)
    }

    /// Returns the next call without consuming it.
    pub fn peek_next_call(&self) -> Option<AqlCall> {
        self.specific_calls.front().copied().or(self.default_call)
    }

    /// Mutable access to the next call.
    ///
    /// If only the default is left, a copy of it becomes the next specific
    /// call, so that the default itself is never modified.
    pub fn modify_next_call(&mut self) -> Option<&mut AqlCall> {
        if self.specific_calls.is_empty() {
            let default_call = self.default_call?;
            self.specific_calls.push_back(default_call);
        }
        self.specific_calls.front_mut()
    }

    /// True if [`AqlCallList::pop_next_call`] would return a call.
    pub fn has_more_calls(&self) -> bool {
        !self.specific_calls.is_empty() || self.default_call.is_some()
    }

    /// True if the list repeats a default call.
    pub fn has_default_calls(&self) -> bool {
        self.default_call.is_some()
    }

    /// The default call, if any.
    pub fn default_call(&self) -> Option<AqlCall> {
        self.default_call
    }
}

impl fmt::Display for AqlCallList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (idx, call) in self.specific_calls.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{call}")?;
        }
        f.write_str("]")?;
        if let Some(default_call) = &self.default_call {
            write!(f, " default {default_call}")?;
        }
        Ok(())
    }
}
