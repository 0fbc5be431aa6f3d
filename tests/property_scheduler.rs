// tests/property_scheduler.rs

use std::collections::{HashMap, HashSet, VecDeque};

use proptest::prelude::*;

use assetdag::dag::{DagGraph, Scheduler};
use assetdag::engine::{
    CoreCommand, CoreRuntime, CoreStep, RuntimeEvent, RuntimeOptions, TaskOutcome,
    TriggerWhileRunningBehaviour,
};

// Strategy to generate a valid DAG.
// We ensure acyclicity by only allowing task N to depend on tasks 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<(String, Vec<String>)>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        )
        .prop_map(|raw_deps| {
            raw_deps
                .into_iter()
                .enumerate()
                .map(|(i, potential)| {
                    let mut deps: Vec<String> = potential
                        .into_iter()
                        .filter(|_| i > 0)
                        .map(|d| format!("task_{}", d % i.max(1)))
                        .collect::<HashSet<_>>()
                        .into_iter()
                        .collect();
                    deps.sort();
                    (format!("task_{i}"), deps)
                })
                .collect()
        })
    })
}

fn dispatched(step: &CoreStep, pending: &mut VecDeque<String>) {
    for command in step.commands.iter() {
        if let CoreCommand::DispatchTasks(tasks) = command {
            pending.extend(tasks.iter().map(|t| t.name.clone()));
        }
    }
}

fn closure(target: &str, deps: &HashMap<String, Vec<String>>) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut stack = vec![target.to_string()];
    while let Some(t) = stack.pop() {
        if seen.insert(t.clone()) {
            stack.extend(deps[&t].iter().cloned());
        }
    }
    seen
}

proptest! {
    #[test]
    fn one_shot_run_executes_each_task_once_after_its_dependencies(
        specs in dag_strategy(10),
        target_idx in 0..10usize,
        failing_idx in proptest::collection::vec(0..10usize, 0..3),
    ) {
        let deps: HashMap<String, Vec<String>> = specs.iter().cloned().collect();
        let graph = DagGraph::from_specs(specs.iter().map(|(n, d)| (n.as_str(), d.as_slice())));
        let target = format!("task_{}", target_idx % specs.len());
        let failing: HashSet<String> = failing_idx.iter().map(|i| format!("task_{i}")).collect();

        let mut core = CoreRuntime::new(
            Scheduler::new(graph),
            TriggerWhileRunningBehaviour::Queue,
            1,
            RuntimeOptions { exit_when_idle: true },
        );

        let mut pending = VecDeque::new();
        let mut step = core.start(vec![target.clone()]);
        dispatched(&step, &mut pending);

        let mut succeeded: HashSet<String> = HashSet::new();
        let mut ran: Vec<String> = Vec::new();
        let mut iterations = 0;

        while let Some(task) = pending.pop_front() {
            iterations += 1;
            prop_assert!(iterations <= 100, "scheduler did not converge");

            for dep in deps[&task].iter() {
                prop_assert!(succeeded.contains(dep), "{task} ran before {dep} succeeded");
            }
            prop_assert!(!ran.contains(&task), "{task} ran twice");
            ran.push(task.clone());

            let outcome = if failing.contains(&task) {
                TaskOutcome::Failed
            } else {
                succeeded.insert(task.clone());
                TaskOutcome::Success
            };
            step = core.step(RuntimeEvent::TaskCompleted { task, outcome });
            dispatched(&step, &mut pending);
        }

        prop_assert!(!step.keep_running, "one-shot run must finish");

        let expected = closure(&target, &deps);
        for task in ran.iter() {
            prop_assert!(expected.contains(task), "{task} is not in the closure of {target}");
        }

        let summary = core.summary();
        let accounted: HashSet<&String> = summary
            .succeeded
            .iter()
            .chain(summary.failed.iter())
            .chain(summary.blocked.iter())
            .collect();
        for task in expected.iter() {
            prop_assert!(accounted.contains(task), "{task} missing from the summary");
        }
    }
}
