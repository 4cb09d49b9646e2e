//! Driver profiling counters, enabled through the environment.

use blockflow::exec::executors::IdExecutor;
use blockflow::exec::{exec_profile_snapshot, RegisterInfos};
use blockflow::testkit::{drain, rows_block, single_stack};
use blockflow::{AqlCall, ConstSource, ExecContext, ExecOptions, ExecutionBlockImpl};

// Single test in this binary: the flag is read once per process.
#[test]
fn counters_accumulate_and_reset() {
    std::env::set_var("BLOCKFLOW_PROFILE", "1");
    let context = ExecContext::new(ExecOptions::new().batch_size(2));
    let source = ConstSource::new(context.clone(), [rows_block(0..5)]);
    let mut block =
        ExecutionBlockImpl::new(IdExecutor, RegisterInfos::passthrough(1), source, context);
    let drained = drain(&mut block, &single_stack(AqlCall::new())).unwrap();
    assert_eq!(drained.data_rows(), 5);

    let snapshot = exec_profile_snapshot(true).expect("profiling enabled");
    assert!(snapshot.produce_count > 0);
    assert!(snapshot.upstream_count > 0);

    let after_reset = exec_profile_snapshot(false).expect("profiling enabled");
    assert_eq!(after_reset.produce_count, 0);
    assert_eq!(after_reset.upstream_count, 0);
    assert_eq!(after_reset.produce_ns, 0);
}
