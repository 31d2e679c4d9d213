//! In-memory stage state tracker.
//!
//! Stores the current status of every stage of every run, keyed by
//! `(run id, stage)`, plus a timestamped transition log per run. A single
//! mutex guards all maps, so `update`, `get` and `snapshot` are linearizable
//! with respect to each other. Concurrent runs never overwrite each other's
//! entries.
//!
//! Transitions are not validated: `success -> running` is accepted. Ordering
//! is the orchestrator's responsibility.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::{RunId, StageState, StageStatus};
use crate::obs;

/// Default number of runs kept before the oldest finished run is evicted.
pub const DEFAULT_RETENTION: usize = 256;

#[derive(Debug, Default)]
struct RunStates {
    current: BTreeMap<String, StageState>,
    log: Vec<StageState>,
}

impl RunStates {
    /// A failed stage ends the run; otherwise every stage must have succeeded.
    fn finished(&self) -> bool {
        let mut statuses = self.current.values().map(|s| s.status);
        if statuses.clone().any(|s| s == StageStatus::Failed) {
            return true;
        }
        !self.current.is_empty() && statuses.all(|s| s == StageStatus::Success)
    }
}

#[derive(Debug, Default)]
struct TrackerInner {
    runs: HashMap<RunId, RunStates>,
    /// Insertion order of runs, oldest first.
    order: VecDeque<RunId>,
}

impl TrackerInner {
    /// Drop finished runs, oldest first, until at most `retention` remain.
    /// Runs still in progress are never evicted, so the store may exceed
    /// `retention` while more runs than that are executing.
    fn evict_finished(&mut self, retention: usize, keep: &RunId) -> Vec<RunId> {
        let mut evicted = Vec::new();
        if retention == 0 {
            return evicted;
        }
        let mut index = 0;
        while self.order.len() > retention && index < self.order.len() {
            let id = &self.order[index];
            let done = id != keep && self.runs.get(id).map_or(true, RunStates::finished);
            if done {
                if let Some(old) = self.order.remove(index) {
                    self.runs.remove(&old);
                    evicted.push(old);
                }
            } else {
                index += 1;
            }
        }
        evicted
    }
}

/// Concurrency-safe store of per-run stage states.
#[derive(Debug)]
pub struct StateTracker {
    inner: Mutex<TrackerInner>,
    retention: usize,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTracker {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// Keep at most `retention` finished runs; `0` keeps every run.
    pub fn with_retention(retention: usize) -> Self {
        Self {
            inner: Mutex::new(TrackerInner::default()),
            retention,
        }
    }

    // A panic while holding the lock cannot leave the maps half-written:
    // every mutation is a single insert or remove.
    fn lock(&self) -> MutexGuard<'_, TrackerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrite the state of `stage` in `run` with `status` stamped now.
    pub fn update(&self, run: &RunId, stage: &str, status: StageStatus) -> StageState {
        let state = StageState::new(stage, status);
        let evicted = {
            let mut inner = self.lock();
            let is_new = !inner.runs.contains_key(run);

            let entry = inner.runs.entry(run.clone()).or_default();
            entry.current.insert(stage.to_string(), state.clone());
            entry.log.push(state.clone());

            if is_new {
                inner.order.push_back(run.clone());
                inner.evict_finished(self.retention, run)
            } else {
                Vec::new()
            }
        };

        for old in &evicted {
            tracing::debug!(run_id = %old, "evicted run state");
        }
        obs::emit_stage_transition(run.as_str(), stage, status);
        state
    }

    /// Current state of `stage` in `run`.
    pub fn get(&self, run: &RunId, stage: &str) -> Option<StageState> {
        self.lock()
            .runs
            .get(run)
            .and_then(|r| r.current.get(stage))
            .cloned()
    }

    /// Copy of every stage state of `run`. Empty if the run is unknown.
    pub fn snapshot(&self, run: &RunId) -> BTreeMap<String, StageState> {
        self.lock()
            .runs
            .get(run)
            .map(|r| r.current.clone())
            .unwrap_or_default()
    }

    /// Every transition recorded for `run`, oldest first.
    pub fn transitions(&self, run: &RunId) -> Vec<StageState> {
        self.lock()
            .runs
            .get(run)
            .map(|r| r.log.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, run: &RunId) -> bool {
        self.lock().runs.contains_key(run)
    }

    /// Tracked runs, oldest first.
    pub fn runs(&self) -> Vec<RunId> {
        self.lock().order.iter().cloned().collect()
    }

    /// Drop all state of `run`. Returns whether it was tracked.
    pub fn remove(&self, run: &RunId) -> bool {
        let mut inner = self.lock();
        inner.order.retain(|r| r != run);
        inner.runs.remove(run).is_some()
    }
}
