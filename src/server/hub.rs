// src/server/hub.rs

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

/// How connected pages should refresh. Later variants subsume earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadKind {
    /// Nothing happened before the poll timed out.
    None,
    /// Swap stylesheets in place.
    Css,
    /// Reload the page.
    Full,
}

/// One reload notification, as sent to polling clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reload {
    pub seq: u64,
    pub kind: ReloadKind,
    pub paths: Vec<String>,
}

/// Reloads kept for clients that missed some. A client further behind gets
/// a full reload.
const HISTORY: usize = 64;

#[derive(Debug, Default)]
struct HubState {
    seq: u64,
    recent: VecDeque<Reload>,
    closed: bool,
}

impl HubState {
    /// Everything after `since` folded into one reload: the strongest kind
    /// and every path, in order and without repeats.
    fn since(&self, since: u64) -> Reload {
        let covered = self.recent.front().is_some_and(|first| first.seq <= since + 1);
        let mut merged = Reload {
            seq: self.seq,
            kind: if covered { ReloadKind::None } else { ReloadKind::Full },
            paths: Vec::new(),
        };
        for reload in self.recent.iter().filter(|r| r.seq > since) {
            merged.kind = merged.kind.max(reload.kind);
            for path in reload.paths.iter() {
                if !merged.paths.contains(path) {
                    merged.paths.push(path.clone());
                }
            }
        }
        merged
    }
}

/// Sequence of reload notifications that long-poll requests wait on.
#[derive(Debug, Default)]
pub struct ReloadHub {
    state: Mutex<HubState>,
    changed: Condvar,
}

impl ReloadHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sequence number of the latest notification (0 before the first).
    pub fn current_seq(&self) -> u64 {
        self.lock().seq
    }

    /// Record a reload and wake every waiting poll. Returns its sequence
    /// number.
    pub fn notify(&self, kind: ReloadKind, paths: Vec<String>) -> u64 {
        let mut state = self.lock();
        state.seq += 1;
        let seq = state.seq;
        if state.recent.len() == HISTORY {
            state.recent.pop_front();
        }
        state.recent.push_back(Reload { seq, kind, paths });
        self.changed.notify_all();
        seq
    }

    /// Wait until a reload newer than `since` exists, up to `timeout`.
    ///
    /// Returns every reload after `since` merged into one, so a `css`
    /// notification never hides an earlier `full` one. On timeout or
    /// shutdown the result is a `none` entry carrying the current sequence
    /// number.
    pub fn wait_newer(&self, since: u64, timeout: Duration) -> Reload {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();

        loop {
            if state.seq > since {
                return state.since(since);
            }
            let now = Instant::now();
            if state.closed || now >= deadline {
                return Reload {
                    seq: state.seq,
                    kind: ReloadKind::None,
                    paths: Vec::new(),
                };
            }
            state = match self.changed.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Release every waiting poll; later polls return immediately.
    pub fn close(&self) {
        self.lock().closed = true;
        self.changed.notify_all();
    }
}
