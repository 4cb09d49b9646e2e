//! Rows skipped per subquery level.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ExecError, Result};

/// Rows skipped per subquery level during one `execute` call.
///
/// Levels are stored outermost first. The last entry belongs to the level the
/// block was called for; entries below it report rows skipped on behalf of
/// enclosing subqueries so that each block can charge them to the matching
/// call of its own stack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkipResult {
    skipped: Vec<usize>,
}

impl Default for SkipResult {
    fn default() -> Self {
        Self::new()
    }
}

impl SkipResult {
    /// Result for a single level with nothing skipped.
    pub fn new() -> Self {
        Self::with_depth(1)
    }

    /// Result covering `depth` levels with nothing skipped.
    pub fn with_depth(depth: usize) -> Self {
        Self {
            skipped: vec![0; depth],
        }
    }

    /// Number of levels covered.
    pub fn depth(&self) -> usize {
        self.skipped.len()
    }

    /// Rows skipped on the current level.
    pub fn get_skip_count(&self) -> usize {
        self.skipped.last().copied().unwrap_or(0)
    }

    /// Rows skipped `depth` levels below the current one.
    pub fn get_skip_on_subquery_level(&self, depth: usize) -> usize {
        self.skipped
            .len()
            .checked_sub(depth + 1)
            .map(|idx| self.skipped[idx])
            .unwrap_or(0)
    }

    /// Adds `n` to the current level.
    pub fn did_skip(&mut self, n: usize) {
        match self.skipped.last_mut() {
            Some(top) => *top += n,
            None => self.skipped.push(n),
        }
    }

    /// Adds `n` to the level of shadow-row depth `depth`, where depth 0 is the
    /// level directly enclosing the current one.
    pub fn did_skip_subquery(&mut self, n: usize, depth: usize) -> Result<()> {
        let idx = self
            .skipped
            .len()
            .checked_sub(depth + 2)
            .ok_or_else(|| {
                ExecError::internal(format!(
                    "subquery skip at depth {depth} on a skip result with {} levels",
                    self.skipped.len()
                ))
            })?;
        self.skipped[idx] += n;
        Ok(())
    }

    /// True if no level skipped anything.
    pub fn nothing_skipped(&self) -> bool {
        self.skipped.iter().all(|count| *count == 0)
    }

    /// Opens a new innermost level.
    pub fn increment_subquery(&mut self) {
        self.skipped.push(0);
    }

    /// Drops the innermost level.
    pub fn decrement_subquery(&mut self) {
        self.skipped.pop();
    }

    /// Adds `other` level by level, aligned on the outermost level.
    ///
    /// With `exclude_top_level` the innermost level of `other` is ignored;
    /// blocks use this when `other` answers a call they issued themselves.
    pub fn merge(&mut self, other: &SkipResult, exclude_top_level: bool) {
        while self.skipped.len() < other.skipped.len() {
            self.increment_subquery();
        }
        let take = if exclude_top_level {
            other.skipped.len().saturating_sub(1)
        } else {
            other.skipped.len()
        };
        for (mine, theirs) in self.skipped.iter_mut().zip(&other.skipped).take(take) {
            *mine += theirs;
        }
    }

    /// Zeroes every level and keeps the depth.
    pub fn reset(&mut self) {
        self.skipped.iter_mut().for_each(|count| *count = 0);
    }

    /// Per-level counts, outermost first.
    pub fn levels(&self) -> &[usize] {
        &self.skipped
    }
}

impl fmt::Display for SkipResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.skipped)
    }
}
