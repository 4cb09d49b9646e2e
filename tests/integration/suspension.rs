//! Pipelines over dependencies that answer `Suspended` must give the same
//! results as over ready ones.

use blockflow::exec::executors::{
    CalculationExecutor, CountCollectExecutor, EnumerateListExecutor, IdExecutor,
    SubqueryEndExecutor, SubqueryStartExecutor,
};
use blockflow::exec::{InputRow, RegisterInfos};
use blockflow::testkit::{
    data_row, drain, drain_with_call, init_tracing, rows_block, shadow_block, single_stack,
    subquery_stack, Drained, SuspendBehaviour, SuspendingBlock,
};
use blockflow::{
    AqlCall, ConstSource, ExecContext, ExecOptions, ExecutionBlock, ExecutionBlockImpl,
    ExecutionState, Result, Value,
};

const BEHAVIOURS: [SuspendBehaviour; 3] = [
    SuspendBehaviour::Never,
    SuspendBehaviour::Once,
    SuspendBehaviour::Always,
];

fn suspending_source(
    context: &ExecContext,
    behaviour: SuspendBehaviour,
) -> SuspendingBlock<ConstSource> {
    let blocks = [rows_block(0..4), rows_block(4..8), rows_block(8..11)];
    SuspendingBlock::new(ConstSource::new(context.clone(), blocks), behaviour)
}

fn assert_same_results(runs: &[Drained]) {
    for run in &runs[1..] {
        assert_eq!(run.rows, runs[0].rows);
        assert_eq!(run.skipped, runs[0].skipped);
    }
}

#[test]
fn id_over_suspending_source() {
    init_tracing();
    let runs: Vec<Drained> = BEHAVIOURS
        .iter()
        .map(|behaviour| {
            let context = ExecContext::new(ExecOptions::new().batch_size(3));
            let source = suspending_source(&context, *behaviour);
            let mut block =
                ExecutionBlockImpl::new(IdExecutor, RegisterInfos::passthrough(1), source, context.clone());
            let call = AqlCall::new().with_offset(2).with_hard_limit(7).with_full_count(true);
            drain_with_call(&mut block, call).unwrap()
        })
        .collect();
    assert_same_results(&runs);
    assert_eq!(runs[0].suspensions, 0);
    assert!(runs[2].suspensions >= 3);
    assert_eq!(runs[0].data_rows(), 7);
    assert_eq!(runs[0].skipped, vec![4]);
}

#[test]
fn subquery_start_over_suspending_source() {
    let runs: Vec<Drained> = BEHAVIOURS
        .iter()
        .map(|behaviour| {
            let context = ExecContext::new(ExecOptions::new().batch_size(4));
            let source = suspending_source(&context, *behaviour);
            let id = ExecutionBlockImpl::new(IdExecutor, RegisterInfos::passthrough(1), source, context.clone());
            let mut start = ExecutionBlockImpl::new(
                SubqueryStartExecutor::new(),
                RegisterInfos::passthrough(1),
                id,
                context.clone(),
            );
            drain(&mut start, &subquery_stack(AqlCall::new(), AqlCall::new())).unwrap()
        })
        .collect();
    assert_same_results(&runs);
    assert_eq!(runs[0].rows.len(), 22);
    assert!(runs[1].suspensions >= 1);
}

#[test]
fn subquery_end_over_suspending_calculation() {
    let runs: Vec<Drained> = BEHAVIOURS
        .iter()
        .map(|behaviour| {
            let context = ExecContext::new(ExecOptions::new().batch_size(2));
            let source = ConstSource::new(context.clone(), [rows_block([1, 2]), rows_block([3])]);
            let start = ExecutionBlockImpl::new(
                SubqueryStartExecutor::new(),
                RegisterInfos::passthrough(1),
                source,
                context.clone(),
            );
            let negate = |row: &InputRow| -> Result<Value> {
                Ok(Value::Int(-row.value(0).as_int().unwrap_or_default()))
            };
            let calculation = ExecutionBlockImpl::new(
                CalculationExecutor::new(negate, 1),
                RegisterInfos::new(1, 2, [1]).unwrap(),
                start,
                context.clone(),
            );
            let mut end = ExecutionBlockImpl::new(
                SubqueryEndExecutor::new(Some(1), 2),
                RegisterInfos::with_registers_to_clear(2, 3, [2], [1]).unwrap(),
                SuspendingBlock::new(calculation, *behaviour),
                context.clone(),
            );
            drain(&mut end, &single_stack(AqlCall::new())).unwrap()
        })
        .collect();
    assert_same_results(&runs);
    assert_eq!(
        runs[0].data_values(2),
        vec![
            Value::from(vec![Value::Int(-1)]),
            Value::from(vec![Value::Int(-2)]),
            Value::from(vec![Value::Int(-3)]),
        ]
    );
}

#[test]
fn count_collect_over_suspending_enumeration() {
    let runs: Vec<Drained> = BEHAVIOURS
        .iter()
        .map(|behaviour| {
            let context = ExecContext::new(ExecOptions::new().batch_size(3));
            let lists = shadow_block([
                data_row([Value::from((0..4).map(Value::Int).collect::<Vec<_>>())]),
                data_row([Value::from(Vec::<Value>::new())]),
            ]);
            let source = ConstSource::new(context.clone(), [lists]);
            let start = ExecutionBlockImpl::new(
                SubqueryStartExecutor::new(),
                RegisterInfos::passthrough(1),
                SuspendingBlock::new(source, *behaviour),
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
                SuspendingBlock::new(enumerate, *behaviour),
                context.clone(),
            );
            let mut end = ExecutionBlockImpl::new(
                SubqueryEndExecutor::new(Some(2), 3),
                RegisterInfos::with_registers_to_clear(3, 4, [3], [1, 2]).unwrap(),
                count,
                context.clone(),
            );
            drain(&mut end, &single_stack(AqlCall::new())).unwrap()
        })
        .collect();
    assert_same_results(&runs);
    assert_eq!(
        runs[0].data_values(3),
        vec![
            Value::from(vec![Value::Int(4)]),
            Value::from(vec![Value::Int(0)]),
        ]
    );
}

#[test]
fn widening_the_call_after_suspension_keeps_the_saved_one() {
    let context = ExecContext::default();
    let source = SuspendingBlock::new(
        ConstSource::new(context.clone(), [rows_block(0..5)]),
        SuspendBehaviour::Once,
    );
    let mut block = ExecutionBlockImpl::new(IdExecutor, RegisterInfos::passthrough(1), source, context.clone());
    let (state, _, _) = block
        .execute(single_stack(AqlCall::new().with_hard_limit(2)))
        .unwrap();
    assert_eq!(state, ExecutionState::Suspended);

    let (state, _, output) = block.execute(single_stack(AqlCall::new())).unwrap();
    assert_eq!(output.unwrap().rows(), 2);
    assert_eq!(state, ExecutionState::Done);
}

#[test]
fn changing_the_stack_depth_after_suspension_is_fatal() {
    let context = ExecContext::default();
    let source = SuspendingBlock::new(
        ConstSource::new(context.clone(), [rows_block(0..5)]),
        SuspendBehaviour::Once,
    );
    let mut block = ExecutionBlockImpl::new(IdExecutor, RegisterInfos::passthrough(1), source, context.clone());
    let (state, skipped, _) = block.execute(single_stack(AqlCall::new())).unwrap();
    assert_eq!(state, ExecutionState::Suspended);
    assert_eq!(skipped.depth(), 1);

    let err = block
        .execute(subquery_stack(AqlCall::new(), AqlCall::new()))
        .unwrap_err();
    assert!(err.is_fatal());
}
