// tests/trigger_queue.rs

use assetdag::engine::{
    CoreCommand, CoreRuntime, CoreStep, RuntimeEvent, RuntimeOptions, TaskOutcome, TriggerQueue,
    TriggerReason, TriggerWhileRunningBehaviour,
};
use assetdag::dag::{DagGraph, Scheduler};

#[test]
fn queue_mode_coalesces_into_one_future_run() {
    let mut q = TriggerQueue::new(TriggerWhileRunningBehaviour::Queue, 0);
    assert!(q.is_empty());

    q.record_trigger("styles");
    q.record_trigger("scripts");
    q.record_trigger("styles");

    assert_eq!(q.drain_pending(), vec!["scripts", "styles"]);
    assert!(q.is_empty());
}

#[test]
fn latest_mode_keeps_only_the_last_trigger() {
    let mut q = TriggerQueue::new(TriggerWhileRunningBehaviour::Latest, 1);
    q.record_trigger("styles");
    q.record_trigger("scripts");
    assert_eq!(q.drain_pending(), vec!["scripts"]);
}

fn dispatched(step: &CoreStep) -> Vec<String> {
    step.commands
        .iter()
        .filter_map(|c| match c {
            CoreCommand::DispatchTasks(tasks) => Some(tasks.iter().map(|t| t.name.clone())),
            _ => None,
        })
        .flatten()
        .collect()
}

fn trigger(task: &str) -> RuntimeEvent {
    RuntimeEvent::TaskTriggered {
        task: task.to_string(),
        reason: TriggerReason::FileWatch,
    }
}

fn done(task: &str) -> RuntimeEvent {
    RuntimeEvent::TaskCompleted {
        task: task.to_string(),
        outcome: TaskOutcome::Success,
    }
}

#[test]
fn retrigger_of_a_running_task_starts_another_run_afterwards() {
    let specs: Vec<(String, Vec<String>)> = vec![
        ("styles".into(), vec![]),
        ("scripts".into(), vec![]),
    ];
    let graph = DagGraph::from_specs(specs.iter().map(|(n, d)| (n.as_str(), d.as_slice())));
    let mut core = CoreRuntime::new(
        Scheduler::new(graph),
        TriggerWhileRunningBehaviour::Queue,
        1,
        RuntimeOptions {
            exit_when_idle: false,
        },
    );

    assert_eq!(dispatched(&core.step(trigger("styles"))), vec!["styles"]);
    // Unrelated task joins the active run right away.
    assert_eq!(dispatched(&core.step(trigger("scripts"))), vec!["scripts"]);
    // Running task: queued, nothing dispatched yet.
    assert!(dispatched(&core.step(trigger("styles"))).is_empty());

    assert!(dispatched(&core.step(done("styles"))).is_empty());
    // The run settles here and the queued trigger opens the next one.
    assert_eq!(dispatched(&core.step(done("scripts"))), vec!["styles"]);
    assert!(dispatched(&core.step(done("styles"))).is_empty());

    assert_eq!(core.summary().succeeded, vec!["scripts", "styles"]);
}

#[test]
fn dependency_that_already_ran_is_queued_when_its_dependent_joins() {
    let specs: Vec<(String, Vec<String>)> = vec![
        ("jsLib:build".into(), vec![]),
        ("image:build".into(), vec![]),
        ("js:build".into(), vec!["jsLib:build".into()]),
    ];
    let graph = DagGraph::from_specs(specs.iter().map(|(n, d)| (n.as_str(), d.as_slice())));
    let mut core = CoreRuntime::new(
        Scheduler::new(graph),
        TriggerWhileRunningBehaviour::Queue,
        1,
        RuntimeOptions {
            exit_when_idle: false,
        },
    );

    assert_eq!(dispatched(&core.step(trigger("jsLib:build"))), vec!["jsLib:build"]);
    assert_eq!(dispatched(&core.step(trigger("image:build"))), vec!["image:build"]);
    assert!(dispatched(&core.step(done("jsLib:build"))).is_empty());

    // One watch batch changed both the library and the app sources.
    assert!(dispatched(&core.step(trigger("jsLib:build"))).is_empty());
    assert_eq!(dispatched(&core.step(trigger("js:build"))), vec!["js:build"]);

    assert!(dispatched(&core.step(done("js:build"))).is_empty());
    // The library rebuilds once the current run settles.
    assert_eq!(dispatched(&core.step(done("image:build"))), vec!["jsLib:build"]);
    assert!(dispatched(&core.step(done("jsLib:build"))).is_empty());
}
