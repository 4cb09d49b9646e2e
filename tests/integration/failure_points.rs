//! Armed failure points surface as debug query errors.

use blockflow::exec::executors::IdExecutor;
use blockflow::exec::fault::{clear_all_failure_points, clear_failure_point, set_failure_point};
use blockflow::exec::RegisterInfos;
use blockflow::testkit::{drain_with_call, rows_block, single_stack};
use blockflow::{AqlCall, ConstSource, ErrorCode, ExecContext, ExecutionBlock, ExecutionBlockImpl};
use parking_lot::Mutex;

// Failure points are process-wide; tests arming them must not overlap.
static SERIAL: Mutex<()> = Mutex::new(());

fn id_block() -> ExecutionBlockImpl<IdExecutor> {
    let context = ExecContext::default();
    let source = ConstSource::new(context.clone(), [rows_block(0..5)]);
    ExecutionBlockImpl::new(IdExecutor, RegisterInfos::passthrough(1), source, context)
}

fn check_point(name: &str, call: AqlCall) {
    let _guard = SERIAL.lock();
    set_failure_point(name);
    let err = id_block().execute(single_stack(call)).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::Debug), "{name}");
    assert!(!err.is_fatal());
    assert!(err.to_string().contains(name));

    clear_failure_point(name);
    let drained = drain_with_call(&mut id_block(), call).unwrap();
    assert!(drained.data_rows() > 0);
    clear_all_failure_points();
}

#[test]
fn execute_entry() {
    check_point("ExecutionBlock::execute", AqlCall::new());
}

#[test]
fn produce_phase() {
    check_point("ExecutionBlock::produce", AqlCall::new());
}

#[test]
fn skip_phase() {
    check_point("ExecutionBlock::skip", AqlCall::new().with_offset(2));
}

#[test]
fn upstream_fetch() {
    check_point("ExecutionBlock::upstream", AqlCall::new());
}

#[test]
fn unrelated_points_do_not_fire() {
    let _guard = SERIAL.lock();
    set_failure_point("SomethingElse::produce");
    let drained = drain_with_call(&mut id_block(), AqlCall::new()).unwrap();
    assert_eq!(drained.data_rows(), 5);
    clear_all_failure_points();
}
