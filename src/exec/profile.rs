//! Opt-in driver profiling counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// Snapshot of driver profiling counters.
///
/// Profiling is enabled by setting the `BLOCKFLOW_PROFILE` environment
/// variable before the first block executes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecProfileSnapshot {
    /// Total nanoseconds spent in `produce_rows`.
    pub produce_ns: u64,
    /// Number of `produce_rows` invocations.
    pub produce_count: u64,
    /// Total nanoseconds spent in `skip_rows_range`, fast-forwards included.
    pub skip_ns: u64,
    /// Number of `skip_rows_range` invocations.
    pub skip_count: u64,
    /// Total nanoseconds spent waiting on dependencies.
    pub upstream_ns: u64,
    /// Number of dependency calls.
    pub upstream_count: u64,
    /// Total nanoseconds spent forwarding shadow rows.
    pub shadow_rows_ns: u64,
    /// Number of forwarded shadow rows.
    pub shadow_rows_count: u64,
}

#[derive(Default)]
struct ExecProfileCounters {
    produce_ns: AtomicU64,
    produce_count: AtomicU64,
    skip_ns: AtomicU64,
    skip_count: AtomicU64,
    upstream_ns: AtomicU64,
    upstream_count: AtomicU64,
    shadow_rows_ns: AtomicU64,
    shadow_rows_count: AtomicU64,
}

static PROFILE_ENABLED: OnceLock<bool> = OnceLock::new();
static PROFILE_COUNTERS: OnceLock<ExecProfileCounters> = OnceLock::new();

fn profiling_enabled() -> bool {
    *PROFILE_ENABLED.get_or_init(|| std::env::var_os("BLOCKFLOW_PROFILE").is_some())
}

fn counters() -> Option<&'static ExecProfileCounters> {
    profiling_enabled().then(|| PROFILE_COUNTERS.get_or_init(ExecProfileCounters::default))
}

pub(crate) fn profile_timer() -> Option<Instant> {
    profiling_enabled().then(Instant::now)
}

pub(crate) enum ExecProfileKind {
    Produce,
    Skip,
    Upstream,
    ShadowRows,
}

pub(crate) fn record_profile_timer(kind: ExecProfileKind, start: Option<Instant>) {
    let Some(start) = start else {
        return;
    };
    let Some(counters) = counters() else {
        return;
    };
    let nanos = start.elapsed().as_nanos().min(u64::MAX as u128) as u64;
    let (ns, count) = match kind {
        ExecProfileKind::Produce => (&counters.produce_ns, &counters.produce_count),
        ExecProfileKind::Skip => (&counters.skip_ns, &counters.skip_count),
        ExecProfileKind::Upstream => (&counters.upstream_ns, &counters.upstream_count),
        ExecProfileKind::ShadowRows => (&counters.shadow_rows_ns, &counters.shadow_rows_count),
    };
    ns.fetch_add(nanos, Ordering::Relaxed);
    count.fetch_add(1, Ordering::Relaxed);
}

/// Returns the current counters, or `None` if profiling is disabled.
/// With `reset` the counters are zeroed while being read.
pub fn exec_profile_snapshot(reset: bool) -> Option<ExecProfileSnapshot> {
    let counters = counters()?;
    let load = |counter: &AtomicU64| {
        if reset {
            counter.swap(0, Ordering::Relaxed)
        } else {
            counter.load(Ordering::Relaxed)
        }
    };
    Some(ExecProfileSnapshot {
        produce_ns: load(&counters.produce_ns),
        produce_count: load(&counters.produce_count),
        skip_ns: load(&counters.skip_ns),
        skip_count: load(&counters.skip_count),
        upstream_ns: load(&counters.upstream_ns),
        upstream_count: load(&counters.upstream_count),
        shadow_rows_ns: load(&counters.shadow_rows_ns),
        shadow_rows_count: load(&counters.shadow_rows_count),
    })
}
