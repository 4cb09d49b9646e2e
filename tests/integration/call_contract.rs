//! Offset, limit and full-count handling across whole pipelines.

use blockflow::exec::executors::{
    CalculationExecutor, EnumerateCursorExecutor, EnumerateListExecutor, FilterExecutor,
    IdExecutor, LimitExecutor,
};
use blockflow::exec::{InputRow, RegisterInfos, RegisterPlan, SharedItemBlock};
use blockflow::testkit::{
    data_row, drain_with_call, init_tracing, rows_block, shadow_block, single_stack, VecCursor,
};
use blockflow::{
    AqlCall, ConstSource, ExecContext, ExecOptions, ExecutionBlock, ExecutionBlockImpl,
    ExecutionState, Result, Value,
};

fn source(context: &ExecContext, blocks: Vec<SharedItemBlock>) -> ConstSource {
    ConstSource::new(context.clone(), blocks)
}

fn ints(values: Vec<Value>) -> Vec<i64> {
    values.iter().filter_map(Value::as_int).collect()
}

#[test]
fn offset_limit_over_several_upstream_blocks() {
    init_tracing();
    let context = ExecContext::new(ExecOptions::new().batch_size(3));
    let blocks = vec![rows_block(0..4), rows_block(4..8), rows_block(8..12)];
    let mut block = ExecutionBlockImpl::new(
        IdExecutor,
        RegisterInfos::passthrough(1),
        source(&context, blocks),
        context.clone(),
    );
    let drained = drain_with_call(&mut block, AqlCall::new().with_offset(5).with_hard_limit(4)).unwrap();
    assert_eq!(ints(drained.data_values(0)), vec![5, 6, 7, 8]);
    assert_eq!(drained.skipped, vec![5]);
}

#[test]
fn full_count_with_hard_limit_zero_only_counts() {
    let context = ExecContext::default();
    let mut block = ExecutionBlockImpl::new(
        IdExecutor,
        RegisterInfos::passthrough(1),
        source(&context, vec![rows_block(0..7), rows_block(7..9)]),
        context.clone(),
    );
    let (state, skipped, output) = block.execute(single_stack(AqlCall::full_count_only())).unwrap();
    assert_eq!(state, ExecutionState::Done);
    assert_eq!(skipped.get_skip_count(), 9);
    assert!(output.is_none());
}

#[test]
fn filter_counts_only_passing_rows_as_skipped() {
    let context = ExecContext::default();
    let rows = (0..10).map(|idx| data_row([Value::Int(idx), Value::Bool(idx % 2 == 0)]));
    let mut block = ExecutionBlockImpl::new(
        FilterExecutor::new(1),
        RegisterInfos::passthrough(2),
        source(&context, vec![shadow_block(rows)]),
        context.clone(),
    );
    let call = AqlCall::new().with_offset(2).with_hard_limit(2).with_full_count(true);
    let drained = drain_with_call(&mut block, call).unwrap();
    assert_eq!(ints(drained.data_values(0)), vec![4, 6]);
    assert_eq!(drained.skipped, vec![3]);
    assert_eq!(block.stats().filtered, 5);
}

#[test]
fn calculation_uses_the_register_plan() {
    let mut plan = RegisterPlan::new();
    let x = plan.add_variable("x");
    let doubled = plan.add_variable("doubled");
    assert_eq!(plan.register_for("doubled").unwrap(), doubled);

    let context = ExecContext::new(ExecOptions::new().batch_size(2));
    let evaluator = move |row: &InputRow| -> Result<Value> {
        Ok(Value::Int(row.value(x).as_int().unwrap_or_default() * 2))
    };
    let mut block = ExecutionBlockImpl::new(
        CalculationExecutor::new(evaluator, doubled),
        RegisterInfos::new(1, plan.nr_registers(), [doubled]).unwrap(),
        source(&context, vec![rows_block(1..6)]),
        context.clone(),
    );
    let drained = drain_with_call(&mut block, AqlCall::new().with_offset(1)).unwrap();
    assert_eq!(ints(drained.data_values(doubled)), vec![4, 6, 8, 10]);
    assert_eq!(ints(drained.data_values(x)), vec![2, 3, 4, 5]);
}

#[test]
fn enumerate_list_resumes_across_small_batches() {
    let context = ExecContext::new(ExecOptions::new().batch_size(2));
    let lists = shadow_block([
        data_row([Value::from((0..5).map(Value::Int).collect::<Vec<_>>())]),
        data_row([Value::from((5..8).map(Value::Int).collect::<Vec<_>>())]),
    ]);
    let mut block = ExecutionBlockImpl::new(
        EnumerateListExecutor::new(0, 1),
        RegisterInfos::with_registers_to_clear(1, 2, [1], [0]).unwrap(),
        source(&context, vec![lists]),
        context.clone(),
    );
    let drained = drain_with_call(&mut block, AqlCall::new().with_offset(3).with_hard_limit(4)).unwrap();
    assert_eq!(ints(drained.data_values(1)), vec![3, 4, 5, 6]);
    assert_eq!(drained.skipped, vec![3]);
}

#[test]
fn enumerate_list_rejects_scalars() {
    let context = ExecContext::default();
    let mut block = ExecutionBlockImpl::new(
        EnumerateListExecutor::new(0, 1),
        RegisterInfos::new(1, 2, [1]).unwrap(),
        source(&context, vec![rows_block([1])]),
        context.clone(),
    );
    let err = block.execute(single_stack(AqlCall::new())).unwrap_err();
    assert_eq!(err.code(), Some(blockflow::ErrorCode::TypeMismatch));
    assert!(!err.is_fatal());
}

#[test]
fn cursor_skip_goes_through_the_cursor() {
    let context = ExecContext::default();
    let cursor = VecCursor::new((100..104).map(Value::Int));
    let mut block = ExecutionBlockImpl::new(
        EnumerateCursorExecutor::new(cursor, 1),
        RegisterInfos::new(1, 2, [1]).unwrap(),
        source(&context, vec![rows_block([1, 2])]),
        context.clone(),
    );
    let call = AqlCall::new().with_offset(3).with_hard_limit(2).with_full_count(true);
    let drained = drain_with_call(&mut block, call).unwrap();
    assert_eq!(ints(drained.data_values(1)), vec![103, 100]);
    assert_eq!(ints(drained.data_values(0)), vec![1, 2]);
    assert_eq!(drained.skipped, vec![6]);
    assert_eq!(block.stats().scanned, 2);
    assert_eq!(block.executor().cursor().resets(), 2);
}

#[test]
fn limit_stage_stops_pulling_once_satisfied() {
    let context = ExecContext::new(ExecOptions::new().batch_size(2));
    let blocks = vec![rows_block(0..3), rows_block(3..6), rows_block(6..9)];
    let mut block = ExecutionBlockImpl::new(
        LimitExecutor::new(2, 3).with_full_count(true),
        RegisterInfos::passthrough(1),
        source(&context, blocks),
        context.clone(),
    );
    let drained = drain_with_call(&mut block, AqlCall::new()).unwrap();
    assert_eq!(ints(drained.data_values(0)), vec![2, 3, 4]);
    assert_eq!(block.stats().full_count, 9);
}

#[test]
fn soft_limit_returns_partial_results() {
    let context = ExecContext::default();
    let mut block = ExecutionBlockImpl::new(
        IdExecutor,
        RegisterInfos::passthrough(1),
        source(&context, vec![rows_block(0..10)]),
        context.clone(),
    );
    let drained = drain_with_call(&mut block, AqlCall::new().with_soft_limit(4)).unwrap();
    assert_eq!(drained.data_rows(), 4);
    assert_eq!(drained.calls, 1);

    let (state, _, output) = block.execute(single_stack(AqlCall::new())).unwrap();
    assert_eq!(state, ExecutionState::Done);
    assert_eq!(output.unwrap().rows(), 6);
}

#[test]
fn call_survives_the_wire() {
    let call = AqlCall::new().with_offset(3).with_hard_limit(10).with_full_count(true);
    let encoded = call.to_json().unwrap();
    assert!(encoded.contains("\"softLimit\":\"unlimited\""));
    assert!(!encoded.contains("skipped"));
    assert_eq!(AqlCall::from_json(&encoded).unwrap(), call);

    let decoded = AqlCall::from_json(r#"{"offset":1,"softLimit":5}"#).unwrap();
    assert_eq!(decoded, AqlCall::new().with_offset(1).with_soft_limit(5));
}
