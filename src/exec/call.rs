//! Demand descriptor exchanged between pipeline stages.
//!
//! An [`AqlCall`] travels from a consumer to its producer and says how many
//! rows to skip, how many to produce and whether everything after the limit
//! still has to be counted.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Add;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{ExecError, Result};

/// Row budget that is either a finite count or unbounded.
///
/// `Finite` values always order before `Unlimited`, and adding anything to
/// `Unlimited` stays `Unlimited`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Limit {
    /// At most this many rows.
    Finite(usize),
    /// No bound.
    #[default]
    Unlimited,
}

impl Limit {
    /// True for a finite limit.
    pub fn is_finite(&self) -> bool {
        matches!(self, Limit::Finite(_))
    }

    /// The limit as a row count, `usize::MAX` standing in for unbounded.
    pub fn as_count(&self) -> usize {
        match self {
            Limit::Finite(n) => *n,
            Limit::Unlimited => usize::MAX,
        }
    }

    fn decrement(&mut self, n: usize) {
        if let Limit::Finite(value) = self {
            debug_assert!(n <= *value, "produced {n} rows against a limit of {value}");
            *value = value.saturating_sub(n);
        }
    }
}

impl From<usize> for Limit {
    fn from(value: usize) -> Self {
        Limit::Finite(value)
    }
}

impl Add<usize> for Limit {
    type Output = Limit;

    fn add(self, rhs: usize) -> Limit {
        match self {
            Limit::Finite(n) => Limit::Finite(n.saturating_add(rhs)),
            Limit::Unlimited => Limit::Unlimited,
        }
    }
}

impl Add for Limit {
    type Output = Limit;

    fn add(self, rhs: Limit) -> Limit {
        match rhs {
            Limit::Finite(n) => self + n,
            Limit::Unlimited => Limit::Unlimited,
        }
    }
}

impl PartialEq<usize> for Limit {
    fn eq(&self, other: &usize) -> bool {
        matches!(self, Limit::Finite(n) if n == other)
    }
}

impl PartialOrd<usize> for Limit {
    fn partial_cmp(&self, other: &usize) -> Option<Ordering> {
        Some(self.cmp(&Limit::Finite(*other)))
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Finite(n) => write!(f, "{n}"),
            Limit::Unlimited => f.write_str("unlimited"),
        }
    }
}

const UNLIMITED: &str = "unlimited";

impl Serialize for Limit {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Limit::Finite(n) => serializer.serialize_u64(*n as u64),
            Limit::Unlimited => serializer.serialize_str(UNLIMITED),
        }
    }
}

impl<'de> Deserialize<'de> for Limit {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct LimitVisitor;

        impl<'de> Visitor<'de> for LimitVisitor {
            type Value = Limit;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a non-negative integer or the string \"unlimited\"")
            }

            fn visit_u64<E>(self, value: u64) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                usize::try_from(value)
                    .map(Limit::Finite)
                    .map_err(|_| E::custom(format!("limit {value} out of range")))
            }

            fn visit_i64<E>(self, value: i64) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                if value < 0 {
                    return Err(E::custom(format!("limit must not be negative (got {value})")));
                }
                self.visit_u64(value as u64)
            }

            fn visit_str<E>(self, value: &str) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                if value == UNLIMITED {
                    Ok(Limit::Unlimited)
                } else {
                    Err(E::custom(format!("unknown limit keyword '{value}'")))
                }
            }
        }

        deserializer.deserialize_any(LimitVisitor)
    }
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

/// Skip/limit/full-count request for one batch of rows.
///
/// Fields are only changed through [`AqlCall::did_skip`] and
/// [`AqlCall::did_produce`] once the call is in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AqlCall {
    offset: usize,
    soft_limit: Limit,
    hard_limit: Limit,
    full_count: bool,
    #[serde(rename = "skipped", skip_serializing_if = "is_zero")]
    skipped_rows: usize,
}

impl AqlCall {
    /// Unlimited call without offset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Call that asks for nothing and drops the remainder of the input.
    pub fn fast_forward() -> Self {
        Self::new().with_hard_limit(0)
    }

    /// Call that produces nothing but counts every remaining row.
    pub fn full_count_only() -> Self {
        Self::new().with_hard_limit(0).with_full_count(true)
    }

    /// Sets the number of rows to skip before producing.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Sets a soft limit: the consumer may ask again later.
    pub fn with_soft_limit(mut self, limit: usize) -> Self {
        self.soft_limit = Limit::Finite(limit);
        self
    }

    /// Sets a hard limit: nothing past it will ever be requested.
    pub fn with_hard_limit(mut self, limit: usize) -> Self {
        self.hard_limit = Limit::Finite(limit);
        self
    }

    /// Requests counting of the rows that follow the hard limit.
    pub fn with_full_count(mut self, full_count: bool) -> Self {
        self.full_count = full_count;
        self
    }

    /// Remaining rows to skip.
    pub fn get_offset(&self) -> usize {
        self.offset
    }

    /// Soft limit as currently remaining.
    pub fn soft_limit(&self) -> Limit {
        self.soft_limit
    }

    /// Hard limit as currently remaining.
    pub fn hard_limit(&self) -> Limit {
        self.hard_limit
    }

    /// Smaller of the two limits.
    pub fn get_unclamped_limit(&self) -> Limit {
        self.soft_limit.min(self.hard_limit)
    }

    /// Remaining rows that may be produced, `usize::MAX` when unbounded.
    pub fn get_limit(&self) -> usize {
        self.get_unclamped_limit().as_count()
    }

    /// `min(softLimit, hardLimit, batch_capacity)`.
    pub fn effective_limit(&self, batch_capacity: usize) -> usize {
        self.get_limit().min(batch_capacity)
    }

    /// Rows skipped since the last [`AqlCall::reset_skip_count`].
    pub fn get_skip_count(&self) -> usize {
        self.skipped_rows
    }

    /// Clears the per-invocation skip counter.
    pub fn reset_skip_count(&mut self) {
        self.skipped_rows = 0;
    }

    /// True while the hard limit is finite.
    pub fn has_hard_limit(&self) -> bool {
        self.hard_limit.is_finite()
    }

    /// True while the soft limit is finite.
    pub fn has_soft_limit(&self) -> bool {
        self.soft_limit.is_finite()
    }

    /// True if any limit is finite.
    pub fn has_limit(&self) -> bool {
        self.has_hard_limit() || self.has_soft_limit()
    }

    /// True if rows past the hard limit have to be counted.
    pub fn needs_full_count(&self) -> bool {
        self.full_count
    }

    /// True while rows still need to be skipped, either for the offset or to
    /// complete a full count once the limit is used up.
    pub fn need_skip_more(&self) -> bool {
        self.offset > 0 || (self.get_limit() == 0 && self.needs_full_count())
    }

    /// Offset and limit are used up, only the full count remains.
    pub fn should_continue_for_full_count_only(&self) -> bool {
        self.offset == 0 && self.get_limit() == 0 && self.needs_full_count()
    }

    /// Records `n` skipped rows.
    ///
    /// Skipping past the offset is only legal while a full count runs.
    pub fn did_skip(&mut self, n: usize) {
        if n <= self.offset {
            self.offset -= n;
        } else {
            debug_assert!(
                self.needs_full_count(),
                "skipped {n} rows with offset {} and no full count",
                self.offset
            );
            self.offset = 0;
        }
        self.skipped_rows += n;
    }

    /// Records `n` produced rows against both limits.
    ///
    /// Producing past the limit is a caller bug. It only trips a debug
    /// assertion here and saturates otherwise; the driver refuses such rows
    /// with an internal error before they are booked.
    pub fn did_produce(&mut self, n: usize) {
        debug_assert!(
            n <= self.get_limit(),
            "produced {n} rows against a limit of {}",
            self.get_limit()
        );
        self.soft_limit.decrement(n);
        self.hard_limit.decrement(n);
    }

    /// True if this call does not ask for more than `other`.
    ///
    /// A block resuming after a suspension checks that the retried call still
    /// covers the work it already booked on the saved one.
    pub fn request_less_data_than(&self, other: &AqlCall) -> bool {
        self.get_offset() <= other.get_offset()
            && self.get_limit() <= other.get_limit()
            && self.needs_full_count() == other.needs_full_count()
    }

    /// Checks the combinations the driver refuses to work with.
    pub fn validate(&self) -> Result<()> {
        if self.offset == 0 && self.soft_limit == 0 {
            return Err(ExecError::internal(format!(
                "call {self} asks for neither rows nor skips"
            )));
        }
        if self.has_soft_limit() && self.full_count {
            return Err(ExecError::internal(format!(
                "call {self} combines a soft limit with full count"
            )));
        }
        if self.has_soft_limit() && self.has_hard_limit() {
            return Err(ExecError::internal(format!(
                "call {self} has both a soft and a hard limit"
            )));
        }
        Ok(())
    }

    /// Encodes the call in its JSON wire form.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|err| ExecError::Wire(err.to_string()))
    }

    /// Decodes a call from its JSON wire form.
    pub fn from_json(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).map_err(|err| ExecError::Wire(err.to_string()))
    }
}

impl fmt::Display for AqlCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ skip: {}, softLimit: {}, hardLimit: {}, fullCount: {}, skipCount: {} }}",
            self.offset, self.soft_limit, self.hard_limit, self.full_count, self.skipped_rows
        )
    }
}
