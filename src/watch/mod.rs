// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Compiling `[[watch]]` glob bindings.
//! - Wiring up a debounced cross-platform filesystem watcher
//!   (`notify` + `notify-debouncer-mini`).
//! - (Optionally) content hashing so unchanged files do not re-trigger.
//!
//! It turns filesystem changes into task-level triggers; running them is the
//! engine's job.

pub mod bindings;
pub mod cache;
pub mod dispatch;
pub mod hash;
pub mod watcher;

pub use bindings::{WatchBinding, compile_bindings};
pub use cache::FileCache;
pub use dispatch::WatchDispatcher;
pub use hash::compute_file_hash;
pub use watcher::{WatcherHandle, spawn_watcher};
