// tests/scenarios.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use hivesched::engine::{EventContext, EventStatus, FinalState};
use hivesched::exec::{Algorithm, AlgorithmPool};
use hivesched::types::ClonePolicy;
use hivesched_test_utils::algorithms::{
    ConcurrencyProbe, PanickingAlgorithm, RecordingAlgorithm, executed_for, new_log,
};
use hivesched_test_utils::builders::{
    AlgorithmConfigBuilder, ConfigFileBuilder, DecisionConfigBuilder,
};
use hivesched_test_utils::harness::Harness;
use hivesched_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn register(pool: &mut AlgorithmPool, name: &str, policy: ClonePolicy, count: usize, alg: impl Algorithm + Clone + 'static) {
    pool.register(name, policy, count, move || Arc::new(alg.clone()) as Arc<dyn Algorithm>);
}

#[tokio::test]
async fn linear_chain_runs_in_dependency_order() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_algorithm("A", AlgorithmConfigBuilder::new().output("a").build())
        .with_algorithm("B", AlgorithmConfigBuilder::new().input("a").output("b").build())
        .with_algorithm("C", AlgorithmConfigBuilder::new().input("b").build())
        .build();

    let log = new_log();
    let mut pool = AlgorithmPool::new();
    register(&mut pool, "A", ClonePolicy::Clone, 1, RecordingAlgorithm::new("A", &log).output("a"));
    register(&mut pool, "B", ClonePolicy::Clone, 1, RecordingAlgorithm::new("B", &log).output("b"));
    register(&mut pool, "C", ClonePolicy::Clone, 1, RecordingAlgorithm::new("C", &log));

    let harness = Harness::from_config(&cfg, pool);
    harness.scheduler.push_new_event(EventContext::new(1)).await?;
    let event = with_timeout(harness.scheduler.pop_finished_event()).await?;

    assert_eq!(executed_for(&log, 1), vec!["A", "B", "C"]);
    assert_eq!(event.status, EventStatus::Success);
    assert!(!event.failed());
    for name in ["A", "B", "C"] {
        assert_eq!(event.final_state(name), Some(FinalState::Accepted));
    }

    harness.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn independent_algorithms_run_concurrently() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .threads(2)
        .with_algorithm("D", AlgorithmConfigBuilder::new().build())
        .with_algorithm("E", AlgorithmConfigBuilder::new().build())
        .build();

    let probe = ConcurrencyProbe::new(Duration::from_millis(100));
    let mut pool = AlgorithmPool::new();
    register(&mut pool, "D", ClonePolicy::Clone, 1, probe.clone());
    register(&mut pool, "E", ClonePolicy::Clone, 1, probe.clone());

    let harness = Harness::from_config(&cfg, pool);
    let done = with_timeout(harness.run_events(1)).await;

    assert_eq!(done.len(), 1);
    assert_eq!(done[0].status, EventStatus::Success);
    assert_eq!(probe.calls(), 2);
    assert_eq!(probe.peak(), 2, "D and E should overlap");

    harness.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn faulting_algorithm_fails_the_event_but_not_the_scheduler() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_algorithm("F", AlgorithmConfigBuilder::new().output("f").build())
        .with_algorithm("After", AlgorithmConfigBuilder::new().input("f").build())
        .build();

    let log = new_log();
    let mut pool = AlgorithmPool::new();
    register(&mut pool, "F", ClonePolicy::Clone, 1, PanickingAlgorithm::new("boom"));
    register(&mut pool, "After", ClonePolicy::Clone, 1, RecordingAlgorithm::new("After", &log));

    let harness = Harness::from_config(&cfg, pool);
    harness.scheduler.push_new_event(EventContext::new(1)).await?;
    let event = with_timeout(harness.scheduler.pop_finished_event()).await?;

    assert_eq!(event.status, EventStatus::Failed);
    assert_eq!(event.final_state("F"), Some(FinalState::Error));
    assert_eq!(event.final_state("After"), Some(FinalState::Skipped));
    assert!(executed_for(&log, 1).is_empty());
    assert_eq!(harness.pool.in_use("F"), 0, "instance must be back in the pool");

    // The controller is still alive and takes the next event.
    harness.scheduler.push_new_event(EventContext::new(2)).await?;
    let next = with_timeout(harness.scheduler.pop_finished_event()).await?;
    assert_eq!(next.ctx.evt(), 2);
    assert!(harness.scheduler.fatal_error().is_none());

    harness.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn reported_failure_is_an_error_state() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_algorithm("F", AlgorithmConfigBuilder::new().build())
        .build();

    let log = new_log();
    let mut pool = AlgorithmPool::new();
    register(&mut pool, "F", ClonePolicy::Clone, 1, RecordingAlgorithm::new("F", &log).failing_on(2));

    let harness = Harness::from_config(&cfg, pool);
    let done = with_timeout(harness.run_events(3)).await;

    let statuses: Vec<_> = done.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![EventStatus::Success, EventStatus::Failed, EventStatus::Success]
    );
    assert_eq!(done[1].final_state("F"), Some(FinalState::Error));

    harness.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn single_instance_is_never_used_twice_at_once() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .slots(2)
        .threads(2)
        .with_algorithm("G", AlgorithmConfigBuilder::new().instances(1).build())
        .build();

    let probe = ConcurrencyProbe::new(Duration::from_millis(50));
    let mut pool = AlgorithmPool::new();
    register(&mut pool, "G", ClonePolicy::Clone, 1, probe.clone());

    let harness = Harness::from_config(&cfg, pool);
    harness.scheduler.push_new_event(EventContext::new(1)).await?;
    harness.scheduler.push_new_event(EventContext::new(2)).await?;

    let first = with_timeout(harness.scheduler.pop_finished_event()).await?;
    let second = with_timeout(harness.scheduler.pop_finished_event()).await?;

    assert_eq!(first.status, EventStatus::Success);
    assert_eq!(second.status, EventStatus::Success);
    assert_eq!(probe.calls(), 2);
    assert_eq!(probe.peak(), 1, "the second event must wait for the instance");
    assert_eq!(harness.pool.in_use("G"), 0);

    harness.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn shared_instance_serves_both_events() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .slots(2)
        .threads(2)
        .with_algorithm("G", AlgorithmConfigBuilder::new().shared().build())
        .build();

    let probe = ConcurrencyProbe::new(Duration::from_millis(100));
    let mut pool = AlgorithmPool::new();
    register(&mut pool, "G", ClonePolicy::Shared, 1, probe.clone());

    let harness = Harness::from_config(&cfg, pool);
    let done = with_timeout(harness.run_events(2)).await;

    assert!(done.iter().all(|e| e.status == EventStatus::Success));
    assert_eq!(probe.peak(), 2);

    harness.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn rejected_filter_prunes_the_gated_algorithm() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .root("Gate")
        .with_algorithm("Filter", AlgorithmConfigBuilder::new().build())
        .with_algorithm("H", AlgorithmConfigBuilder::new().build())
        .with_decision(
            "Gate",
            DecisionConfigBuilder::and()
                .prompt()
                .sequential()
                .child("Filter")
                .child("H")
                .build(),
        )
        .build();

    let log = new_log();
    let mut pool = AlgorithmPool::new();
    register(&mut pool, "Filter", ClonePolicy::Clone, 1, RecordingAlgorithm::new("Filter", &log).rejecting());
    register(&mut pool, "H", ClonePolicy::Clone, 1, RecordingAlgorithm::new("H", &log));

    let harness = Harness::from_config(&cfg, pool);
    harness.scheduler.push_new_event(EventContext::new(1)).await?;
    let event = with_timeout(harness.scheduler.pop_finished_event()).await?;

    assert_eq!(executed_for(&log, 1), vec!["Filter"]);
    assert_eq!(event.status, EventStatus::Success);
    assert_eq!(event.final_state("Filter"), Some(FinalState::Rejected));
    assert_eq!(event.final_state("H"), Some(FinalState::Skipped));

    harness.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn accepted_filter_lets_the_gated_algorithm_run() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .root("Gate")
        .with_algorithm("Filter", AlgorithmConfigBuilder::new().build())
        .with_algorithm("H", AlgorithmConfigBuilder::new().build())
        .with_decision(
            "Gate",
            DecisionConfigBuilder::and()
                .prompt()
                .sequential()
                .child("Filter")
                .child("H")
                .build(),
        )
        .build();

    let log = new_log();
    let mut pool = AlgorithmPool::new();
    register(&mut pool, "Filter", ClonePolicy::Clone, 1, RecordingAlgorithm::new("Filter", &log));
    register(&mut pool, "H", ClonePolicy::Clone, 1, RecordingAlgorithm::new("H", &log));

    let harness = Harness::from_config(&cfg, pool);
    harness.scheduler.push_new_event(EventContext::new(1)).await?;
    let event = with_timeout(harness.scheduler.pop_finished_event()).await?;

    assert_eq!(executed_for(&log, 1), vec!["Filter", "H"]);
    assert_eq!(event.final_state("H"), Some(FinalState::Accepted));

    harness.shutdown().await;
    Ok(())
}
