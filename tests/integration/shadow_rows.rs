//! Subquery flattening: shadow rows produced, forwarded and consumed.

use blockflow::exec::executors::{
    CalculationExecutor, CountCollectExecutor, EnumerateListExecutor, IdExecutor, LimitExecutor,
    SubqueryEndExecutor, SubqueryStartExecutor,
};
use blockflow::exec::{InputRow, RegisterInfos, SharedItemBlock};
use blockflow::testkit::{
    data_row, drain, drain_with_call, init_tracing, rows_block, shadow_block, shadow_row,
    single_stack, subquery_stack, TestRow,
};
use blockflow::{
    AqlCall, AqlCallList, AqlCallStack, ConstSource, ExecContext, ExecOptions, ExecutionBlock,
    ExecutionBlockImpl, ExecutionState, Result, Value,
};

/// `source -> id -> subquery start`
fn start_pipeline(
    context: &ExecContext,
    blocks: Vec<SharedItemBlock>,
) -> ExecutionBlockImpl<SubqueryStartExecutor> {
    let source = ConstSource::new(context.clone(), blocks);
    let id = ExecutionBlockImpl::new(IdExecutor, RegisterInfos::passthrough(1), source, context.clone());
    ExecutionBlockImpl::new(
        SubqueryStartExecutor::new(),
        RegisterInfos::passthrough(1),
        id,
        context.clone(),
    )
}

fn flattened(values: &[i64]) -> Vec<TestRow> {
    values
        .iter()
        .flat_map(|value| [data_row([Value::Int(*value)]), shadow_row(0, [Value::Int(*value)])])
        .collect()
}

fn list(values: impl IntoIterator<Item = i64>) -> Value {
    Value::from(values.into_iter().map(Value::Int).collect::<Vec<_>>())
}

#[test]
fn single_row_is_opened_and_closed() {
    init_tracing();
    let context = ExecContext::default();
    let mut block = start_pipeline(&context, vec![rows_block([7])]);
    let drained = drain(&mut block, &subquery_stack(AqlCall::new(), AqlCall::new())).unwrap();
    assert_eq!(drained.rows, flattened(&[7]));
    assert_eq!(drained.skipped, vec![0, 0]);
}

#[test]
fn every_row_gets_its_own_run() {
    let context = ExecContext::default();
    let mut block = start_pipeline(&context, vec![rows_block([1, 2, 3])]);
    let (state, skipped, output) = block
        .execute(subquery_stack(AqlCall::new(), AqlCall::new()))
        .unwrap();
    assert_eq!(state, ExecutionState::Done);
    assert!(skipped.nothing_skipped());
    let output = output.unwrap();
    assert_eq!(output.count_shadow_rows(), 3);
    assert_eq!(blockflow::testkit::collect_output(&output), flattened(&[1, 2, 3]));
}

#[test]
fn outer_offset_skips_whole_runs() {
    let context = ExecContext::default();
    let mut block = start_pipeline(&context, vec![rows_block([1, 2])]);
    let (state, skipped, output) = block
        .execute(subquery_stack(AqlCall::new().with_offset(1), AqlCall::new()))
        .unwrap();
    assert_eq!(state, ExecutionState::Done);
    assert_eq!(skipped.levels(), &[1, 0]);
    assert_eq!(blockflow::testkit::collect_output(&output.unwrap()), flattened(&[2]));
}

#[test]
fn outer_full_count_only_counts() {
    let context = ExecContext::default();
    let mut block = start_pipeline(&context, vec![rows_block(0..6)]);
    let (state, skipped, output) = block
        .execute(subquery_stack(AqlCall::full_count_only(), AqlCall::new()))
        .unwrap();
    assert_eq!(state, ExecutionState::Done);
    assert_eq!(skipped.levels(), &[6, 0]);
    assert!(output.is_none());
}

#[test]
fn flattening_does_not_depend_on_the_batch_size() {
    let values: Vec<i64> = (10..17).collect();
    let expected = flattened(&values);
    for batch_size in 1..=8 {
        let context = ExecContext::new(ExecOptions::new().batch_size(batch_size));
        let blocks = vec![rows_block(10..13), rows_block(13..17)];
        let mut block = start_pipeline(&context, blocks);
        let drained = drain(&mut block, &subquery_stack(AqlCall::new(), AqlCall::new())).unwrap();
        assert_eq!(drained.rows, expected, "batch size {batch_size}");
    }
}

#[test]
fn inner_offset_does_not_depend_on_the_batch_size() {
    let runs = shadow_block([
        data_row([Value::Int(1)]),
        data_row([Value::Int(2)]),
        shadow_row(0, [Value::Int(10)]),
        data_row([Value::Int(3)]),
        data_row([Value::Int(4)]),
        shadow_row(0, [Value::Int(20)]),
    ]);
    let expected = vec![
        data_row([Value::Int(2)]),
        shadow_row(0, [Value::Int(10)]),
        data_row([Value::Int(4)]),
        shadow_row(0, [Value::Int(20)]),
    ];
    for batch_size in 1..=4 {
        let context = ExecContext::new(ExecOptions::new().batch_size(batch_size));
        let source = ConstSource::new(context.clone(), [runs.clone()]);
        let mut block =
            ExecutionBlockImpl::new(IdExecutor, RegisterInfos::passthrough(1), source, context);
        let stack = subquery_stack(AqlCall::new(), AqlCall::new().with_offset(1));
        let drained = drain(&mut block, &stack).unwrap();
        assert_eq!(drained.rows, expected, "batch size {batch_size}");
        assert_eq!(drained.skipped, vec![0, 2], "batch size {batch_size}");
    }
}

/// `source -> subquery start`, without a stage applying the outer call.
fn start_on_source(
    context: &ExecContext,
    blocks: Vec<SharedItemBlock>,
) -> ExecutionBlockImpl<SubqueryStartExecutor> {
    let source = ConstSource::new(context.clone(), blocks);
    ExecutionBlockImpl::new(
        SubqueryStartExecutor::new(),
        RegisterInfos::passthrough(1),
        source,
        context.clone(),
    )
}

#[test]
fn source_applies_the_outer_offset() {
    let context = ExecContext::default();
    let mut block = start_on_source(&context, vec![rows_block([0, 1, 2])]);
    let stack = subquery_stack(AqlCall::new().with_offset(1), AqlCall::new());
    let drained = drain(&mut block, &stack).unwrap();
    assert_eq!(drained.rows, flattened(&[1, 2]));
    assert_eq!(drained.skipped, vec![1, 0]);
}

#[test]
fn source_counts_past_the_outer_limit() {
    let context = ExecContext::default();
    let mut block = start_on_source(&context, vec![rows_block(0..5)]);
    let outer = AqlCall::new().with_hard_limit(2).with_full_count(true);
    let drained = drain(&mut block, &subquery_stack(outer, AqlCall::new())).unwrap();
    assert_eq!(drained.rows, flattened(&[0, 1]));
    assert_eq!(drained.skipped, vec![3, 0]);
}

#[test]
fn counted_subquery_directly_on_the_source() {
    let context = ExecContext::default();
    let start = start_on_source(&context, vec![rows_block([0, 1, 2])]);
    let count = ExecutionBlockImpl::new(
        CountCollectExecutor::new(1),
        RegisterInfos::with_registers_to_clear(1, 2, [1], [0]).unwrap(),
        start,
        context.clone(),
    );
    let mut end = ExecutionBlockImpl::new(
        SubqueryEndExecutor::new(Some(1), 2),
        RegisterInfos::with_registers_to_clear(2, 3, [2], [1]).unwrap(),
        count,
        context.clone(),
    );
    let call = AqlCall::new()
        .with_offset(1)
        .with_hard_limit(1)
        .with_full_count(true);
    let drained = drain_with_call(&mut end, call).unwrap();
    assert_eq!(drained.data_rows(), 1);
    assert_eq!(drained.data_values(2), vec![list([1])]);
    assert_eq!(drained.skipped, vec![2]);
}

#[test]
fn subquery_end_collects_each_run() {
    let context = ExecContext::default();
    let source = ConstSource::new(context.clone(), [rows_block([1, 2, 3])]);
    let start = ExecutionBlockImpl::new(
        SubqueryStartExecutor::new(),
        RegisterInfos::passthrough(1),
        source,
        context.clone(),
    );
    let times_ten = |row: &InputRow| -> Result<Value> {
        Ok(Value::Int(row.value(0).as_int().unwrap_or_default() * 10))
    };
    let calculation = ExecutionBlockImpl::new(
        CalculationExecutor::new(times_ten, 1),
        RegisterInfos::new(1, 2, [1]).unwrap(),
        start,
        context.clone(),
    );
    let mut end = ExecutionBlockImpl::new(
        SubqueryEndExecutor::new(Some(1), 2),
        RegisterInfos::with_registers_to_clear(2, 3, [2], [1]).unwrap(),
        calculation,
        context.clone(),
    );

    let drained = drain(&mut end, &single_stack(AqlCall::new())).unwrap();
    let expected: Vec<TestRow> = (1..=3)
        .map(|value| data_row([Value::Int(value), Value::Null, list([value * 10])]))
        .collect();
    assert_eq!(drained.rows, expected);
    assert_eq!(drained.skipped, vec![0]);
}

#[test]
fn limit_inside_a_subquery_applies_per_run() {
    let context = ExecContext::default();
    let lists = shadow_block([data_row([list([1, 2, 3])]), data_row([list([4])])]);
    let source = ConstSource::new(context.clone(), [lists]);
    let start = ExecutionBlockImpl::new(
        SubqueryStartExecutor::new(),
        RegisterInfos::passthrough(1),
        source,
        context.clone(),
    );
    let enumerate = ExecutionBlockImpl::new(
        EnumerateListExecutor::new(0, 1),
        RegisterInfos::new(1, 2, [1]).unwrap(),
        start,
        context.clone(),
    );
    let limit = ExecutionBlockImpl::new(
        LimitExecutor::new(0, 2),
        RegisterInfos::passthrough(2),
        enumerate,
        context.clone(),
    );
    let mut end = ExecutionBlockImpl::new(
        SubqueryEndExecutor::new(Some(1), 2),
        RegisterInfos::with_registers_to_clear(2, 3, [2], [1]).unwrap(),
        limit,
        context.clone(),
    );

    let drained = drain(&mut end, &single_stack(AqlCall::new())).unwrap();
    assert_eq!(
        drained.rows,
        vec![
            data_row([list([1, 2, 3]), Value::Null, list([1, 2])]),
            data_row([list([4]), Value::Null, list([4])]),
        ]
    );
}

#[test]
fn count_collect_restarts_for_every_run() {
    let context = ExecContext::default();
    let lists = shadow_block([
        data_row([list([1, 2, 3])]),
        data_row([list([])]),
        data_row([list([4])]),
    ]);
    let source = ConstSource::new(context.clone(), [lists]);
    let start = ExecutionBlockImpl::new(
        SubqueryStartExecutor::new(),
        RegisterInfos::passthrough(1),
        source,
        context.clone(),
    );
    let enumerate = ExecutionBlockImpl::new(
        EnumerateListExecutor::new(0, 1),
        RegisterInfos::new(1, 2, [1]).unwrap(),
        start,
        context.clone(),
    );
    let count = ExecutionBlockImpl::new(
        CountCollectExecutor::new(2),
        RegisterInfos::with_registers_to_clear(2, 3, [2], [0, 1]).unwrap(),
        enumerate,
        context.clone(),
    );
    let mut end = ExecutionBlockImpl::new(
        SubqueryEndExecutor::new(Some(2), 3),
        RegisterInfos::with_registers_to_clear(3, 4, [3], [1, 2]).unwrap(),
        count,
        context.clone(),
    );

    let drained = drain(&mut end, &single_stack(AqlCall::new())).unwrap();
    let counts: Vec<Value> = drained.data_values(3);
    assert_eq!(counts, vec![list([3]), list([0]), list([1])]);
    assert_eq!(drained.data_values(0), vec![list([1, 2, 3]), list([]), list([4])]);
}

#[test]
fn foreign_shadow_rows_pass_through_untouched() {
    let context = ExecContext::default();
    let block = shadow_block([
        data_row([Value::Int(1)]),
        data_row([Value::Int(2)]),
        shadow_row(0, [Value::Int(10)]),
        shadow_row(1, [Value::Int(100)]),
        shadow_row(0, [Value::Int(20)]),
        shadow_row(1, [Value::Int(200)]),
    ]);
    let source = ConstSource::new(context.clone(), [block]);
    let mut count = ExecutionBlockImpl::new(
        CountCollectExecutor::new(1),
        RegisterInfos::with_registers_to_clear(1, 2, [1], [0]).unwrap(),
        source,
        context.clone(),
    );
    let stack = AqlCallStack::from_lists([
        AqlCallList::new(AqlCall::new()),
        AqlCallList::repeating(AqlCall::new()),
        AqlCallList::repeating(AqlCall::new().with_hard_limit(1)),
    ]);

    let drained = drain(&mut count, &stack).unwrap();
    assert_eq!(
        drained.rows,
        vec![
            data_row([Value::Null, Value::Int(2)]),
            shadow_row(0, [Value::Int(10), Value::Null]),
            shadow_row(1, [Value::Int(100), Value::Null]),
            data_row([Value::Null, Value::Int(0)]),
            shadow_row(0, [Value::Int(20), Value::Null]),
            shadow_row(1, [Value::Int(200), Value::Null]),
        ]
    );
    assert_eq!(drained.skipped, vec![0, 0, 0]);
}

#[test]
fn shadow_row_without_an_enclosing_level_is_fatal() {
    let context = ExecContext::default();
    let block = shadow_block([data_row([Value::Int(1)]), shadow_row(0, [Value::Int(1)])]);
    let source = ConstSource::new(context.clone(), [block]);
    let mut id = ExecutionBlockImpl::new(IdExecutor, RegisterInfos::passthrough(1), source, context.clone());
    let err = id.execute(single_stack(AqlCall::new())).unwrap_err();
    assert!(err.is_fatal());
}
