// tests/registry_behaviour.rs

mod common;
use crate::common::{entries, exec_log, failing, init_tracing, recording, with_timeout};

use assetdag::errors::AssetdagError;
use assetdag::registry::TaskRegistry;

fn deps(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn duplicate_registration_fails_and_keeps_first_action() {
    init_tracing();
    let log = exec_log();
    let mut registry = TaskRegistry::new();

    registry.register("style", vec![], recording("first", &log)).unwrap();
    let err = registry
        .register("style", deps(&["other"]), recording("second", &log))
        .unwrap_err();

    assert!(matches!(err, AssetdagError::DuplicateTask(ref name) if name == "style"));
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.dependencies_of("style"), Some(&[][..]));

    let summary = with_timeout(registry.run("style")).await.unwrap();
    assert!(summary.is_success());
    assert_eq!(entries(&log), vec!["first".to_string()]);
}

#[tokio::test]
async fn diamond_runs_shared_dependency_once_and_first() {
    init_tracing();
    let log = exec_log();
    let mut registry = TaskRegistry::new();

    // build -> {style, js} -> clean
    registry.register("build", deps(&["style", "js"]), recording("build", &log)).unwrap();
    registry.register("style", deps(&["clean"]), recording("style", &log)).unwrap();
    registry.register("js", deps(&["clean"]), recording("js", &log)).unwrap();
    registry.register("clean", vec![], recording("clean", &log)).unwrap();

    let summary = with_timeout(registry.run("build")).await.unwrap();
    assert!(summary.is_success());

    let order = entries(&log);
    assert_eq!(order.len(), 4, "each task runs once: {order:?}");
    assert_eq!(order.first().map(String::as_str), Some("clean"));
    assert_eq!(order.last().map(String::as_str), Some("build"));
    assert_eq!(order.iter().filter(|t| *t == "clean").count(), 1);
}

#[tokio::test]
async fn running_a_leaf_does_not_run_its_dependents() {
    let log = exec_log();
    let mut registry = TaskRegistry::new();
    registry.register("clean", vec![], recording("clean", &log)).unwrap();
    registry.register("style", deps(&["clean"]), recording("style", &log)).unwrap();

    with_timeout(registry.run("clean")).await.unwrap();
    assert_eq!(entries(&log), vec!["clean".to_string()]);
}

#[tokio::test]
async fn unknown_target_is_reported() {
    let registry = TaskRegistry::new();
    let err = with_timeout(registry.run("missing")).await.unwrap_err();
    match err {
        AssetdagError::UnknownTask { task, required_by } => {
            assert_eq!(task, "missing");
            assert_eq!(required_by, None);
        }
        other => panic!("expected UnknownTask, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_dependency_names_the_requiring_task() {
    let log = exec_log();
    let mut registry = TaskRegistry::new();
    registry.register("style", deps(&["fonts"]), recording("style", &log)).unwrap();

    let err = with_timeout(registry.run("style")).await.unwrap_err();
    match err {
        AssetdagError::UnknownTask { task, required_by } => {
            assert_eq!(task, "fonts");
            assert_eq!(required_by.as_deref(), Some("style"));
        }
        other => panic!("expected UnknownTask, got {other:?}"),
    }
    assert!(entries(&log).is_empty());
}

#[tokio::test]
async fn cycle_is_rejected_before_anything_runs() {
    let log = exec_log();
    let mut registry = TaskRegistry::new();
    registry.register("a", deps(&["b"]), recording("a", &log)).unwrap();
    registry.register("b", deps(&["a"]), recording("b", &log)).unwrap();

    let err = with_timeout(registry.run("a")).await.unwrap_err();
    assert!(matches!(err, AssetdagError::CyclicDependency(_)), "got {err:?}");
    assert!(entries(&log).is_empty());
}

#[tokio::test]
async fn failed_dependency_blocks_dependents_but_not_siblings() {
    init_tracing();
    let log = exec_log();
    let mut registry = TaskRegistry::new();
    registry.register("build", deps(&["style", "js"]), recording("build", &log)).unwrap();
    registry.register("style", vec![], failing("style", &log)).unwrap();
    registry.register("js", vec![], recording("js", &log)).unwrap();

    let summary = with_timeout(registry.run("build")).await.unwrap();

    assert!(!summary.is_success());
    assert_eq!(summary.failed, vec!["style".to_string()]);
    assert_eq!(summary.blocked, vec!["build".to_string()]);
    assert!(summary.succeeded.contains(&"js".to_string()));

    let ran = entries(&log);
    assert!(ran.contains(&"js".to_string()));
    assert!(!ran.contains(&"build".to_string()));
}

#[tokio::test]
async fn run_many_shares_dependencies() {
    let log = exec_log();
    let mut registry = TaskRegistry::new();
    registry.register("clean", vec![], recording("clean", &log)).unwrap();
    registry.register("style", deps(&["clean"]), recording("style", &log)).unwrap();
    registry.register("js", deps(&["clean"]), recording("js", &log)).unwrap();

    let summary = with_timeout(registry.run_many(&deps(&["style", "js"]))).await.unwrap();
    assert!(summary.is_success());
    let ran = entries(&log);
    assert_eq!(ran.iter().filter(|t| *t == "clean").count(), 1);
    assert_eq!(ran.len(), 3);
}

#[test]
fn plan_lists_dependencies_first() {
    let log = exec_log();
    let mut registry = TaskRegistry::new();
    registry.register_group("build", deps(&["style"])).unwrap();
    registry.register("style", deps(&["clean"]), recording("style", &log)).unwrap();
    registry.register("clean", vec![], recording("clean", &log)).unwrap();

    let plan = registry.plan("build").unwrap();
    assert_eq!(plan, deps(&["clean", "style", "build"]));
}

#[tokio::test]
async fn js_build_runs_its_library_build_first_and_once() {
    let log = exec_log();
    let mut registry = TaskRegistry::new();
    registry.register("jsLib:build", vec![], recording("jsLib:build", &log)).unwrap();
    registry.register("js:build", deps(&["jsLib:build"]), recording("js:build", &log)).unwrap();
    registry.register_group("build", deps(&["js:build", "jsLib:build"])).unwrap();

    with_timeout(registry.run("js:build")).await.unwrap();
    assert_eq!(entries(&log), vec!["jsLib:build".to_string(), "js:build".to_string()]);

    let summary = with_timeout(registry.run("build")).await.unwrap();
    assert!(summary.is_success());
    assert_eq!(entries(&log).len(), 4);
}
