// tests/scheduler_runs.rs

use assetdag::dag::{DagGraph, RunState, RunStep, Scheduler};
use assetdag::engine::TaskOutcome;

fn scheduler(specs: &[(&str, &[&str])]) -> Scheduler {
    let owned: Vec<(String, Vec<String>)> = specs
        .iter()
        .map(|(n, d)| (n.to_string(), d.iter().map(|s| s.to_string()).collect()))
        .collect();
    Scheduler::new(DagGraph::from_specs(
        owned.iter().map(|(n, d)| (n.as_str(), d.as_slice())),
    ))
}

fn names(step: &RunStep) -> Vec<&str> {
    step.ready.iter().map(|t| t.name.as_str()).collect()
}

#[test]
fn trigger_pulls_dependencies_in_and_starts_leaves_first() {
    let mut s = scheduler(&[("clean", &[]), ("styles", &["clean"]), ("build", &["styles"])]);
    assert!(s.is_idle());

    let step = s.trigger("build");
    assert_eq!(names(&step), vec!["clean"]);
    assert_eq!(s.active_run(), Some(1));
    assert_eq!(s.state_of("build"), Some(RunState::Waiting));
    assert_eq!(s.state_of("clean"), Some(RunState::Running));

    assert_eq!(names(&s.complete("clean", TaskOutcome::Success)), vec!["styles"]);
    assert_eq!(names(&s.complete("styles", TaskOutcome::Success)), vec!["build"]);

    let last = s.complete("build", TaskOutcome::Success);
    assert!(last.finished);
    assert!(s.is_idle());
    assert_eq!(s.state_of("build"), Some(RunState::Succeeded));
}

#[test]
fn failure_blocks_everything_behind_it() {
    let mut s = scheduler(&[
        ("styles", &[]),
        ("scripts", &[]),
        ("html", &["styles"]),
        ("build", &["html", "scripts"]),
    ]);

    s.start_new_run();
    assert_eq!(names(&s.trigger("build")), vec!["styles", "scripts"]);

    let step = s.complete("styles", TaskOutcome::Failed);
    assert_eq!(step.blocked, vec!["html", "build"]);
    assert!(step.ready.is_empty());
    assert!(!step.finished);

    // Unrelated work still completes and closes the run.
    let step = s.complete("scripts", TaskOutcome::Success);
    assert!(step.ready.is_empty());
    assert!(step.finished);
    assert_eq!(s.state_of("html"), Some(RunState::Blocked));
    assert_eq!(s.state_of("styles"), Some(RunState::Failed));
}

#[test]
fn joining_behind_an_earlier_failure_blocks_immediately() {
    let mut s = scheduler(&[("styles", &[]), ("scripts", &[]), ("html", &["styles"])]);

    s.trigger("styles");
    s.trigger("scripts");
    s.complete("styles", TaskOutcome::Failed);

    let step = s.trigger("html");
    assert_eq!(step.blocked, vec!["html"]);
    assert!(step.ready.is_empty());
}

#[test]
fn new_run_forgets_previous_states() {
    let mut s = scheduler(&[("styles", &[]), ("html", &["styles"])]);
    s.trigger("html");
    s.complete("styles", TaskOutcome::Failed);
    assert!(s.is_idle());

    let step = s.trigger("html");
    assert_eq!(s.active_run(), Some(2));
    assert_eq!(names(&step), vec!["styles"]);
    assert_eq!(step.ready[0].run_id, 2);
}

#[test]
fn stray_events_are_ignored() {
    let mut s = scheduler(&[("styles", &[])]);

    assert_eq!(s.trigger("nope"), RunStep::default());
    assert!(s.is_idle());
    assert!(!s.contains("nope"));

    assert_eq!(s.complete("styles", TaskOutcome::Success), RunStep::default());

    s.trigger("styles");
    s.complete("styles", TaskOutcome::Success);
    // Already settled, so a second completion changes nothing.
    assert_eq!(s.complete("styles", TaskOutcome::Success), RunStep::default());
}
