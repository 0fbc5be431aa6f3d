#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use assetdag::registry::TaskAction;

pub use assetdag_test_utils::{init_tracing, with_timeout, write_tree};

/// Shared log of task names in execution order.
pub type ExecLog = Arc<Mutex<Vec<String>>>;

pub fn exec_log() -> ExecLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Action that appends `name` to `log` and succeeds.
pub fn recording(name: &str, log: &ExecLog) -> Arc<dyn TaskAction> {
    let name = name.to_string();
    let log = Arc::clone(log);
    Arc::new(move || -> anyhow::Result<()> {
        log.lock().unwrap().push(name.clone());
        Ok(())
    })
}

/// Action that appends `name` to `log` and fails.
pub fn failing(name: &str, log: &ExecLog) -> Arc<dyn TaskAction> {
    let name = name.to_string();
    let log = Arc::clone(log);
    Arc::new(move || -> anyhow::Result<()> {
        log.lock().unwrap().push(name.clone());
        anyhow::bail!("{name} failed on purpose")
    })
}

pub fn entries(log: &ExecLog) -> Vec<String> {
    log.lock().unwrap().clone()
}
