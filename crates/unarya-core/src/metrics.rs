//! Process-wide pipeline counters.
//!
//! Run outcomes plus per-stage attempts, retries and failures for the four
//! standard stages. Stages outside the standard plan share one `other`
//! bucket. [`Metrics::snapshot`] reads everything at once; the daemon serves
//! it on its health endpoint and logs it at shutdown via [`Metrics::flush`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::domain::names;

pub static METRICS: Metrics = Metrics::new();

const STAGES: [&str; 4] = [names::COLLECTOR, names::PARSER, names::AI, names::SECURITY];
const OTHER: &str = "other";

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

struct StageCounters {
    attempts: AtomicU64,
    retries: AtomicU64,
    failures: AtomicU64,
}

impl StageCounters {
    const fn new() -> Self {
        Self {
            attempts: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    fn read(&self) -> StageCounts {
        StageCounts {
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

pub struct Metrics {
    runs_started: AtomicU64,
    runs_succeeded: AtomicU64,
    runs_failed: AtomicU64,
    runs_cancelled: AtomicU64,
    // STAGES order, then OTHER.
    stages: [StageCounters; 5],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub attempts: u64,
    pub retries: u64,
    /// Stages that gave up after their last retry.
    pub failures: u64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub runs_started: u64,
    pub runs_succeeded: u64,
    pub runs_failed: u64,
    pub runs_cancelled: u64,
    pub stages: BTreeMap<String, StageCounts>,
}

impl MetricsSnapshot {
    pub fn total_retries(&self) -> u64 {
        self.stages.values().map(|s| s.retries).sum()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            runs_started: AtomicU64::new(0),
            runs_succeeded: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            runs_cancelled: AtomicU64::new(0),
            stages: [
                StageCounters::new(),
                StageCounters::new(),
                StageCounters::new(),
                StageCounters::new(),
                StageCounters::new(),
            ],
        }
    }

    fn stage(&self, stage: &str) -> &StageCounters {
        let index = STAGES
            .iter()
            .position(|s| *s == stage)
            .unwrap_or(STAGES.len());
        &self.stages[index]
    }

    pub fn record_run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_finished(&self, outcome: RunOutcome) {
        let counter = match outcome {
            RunOutcome::Succeeded => &self.runs_succeeded,
            RunOutcome::Failed => &self.runs_failed,
            RunOutcome::Cancelled => &self.runs_cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// One call of a stage handler, first attempt or retry.
    pub fn record_stage_attempt(&self, stage: &str) {
        self.stage(stage).attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stage_retry(&self, stage: &str) {
        self.stage(stage).retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stage_failure(&self, stage: &str) {
        self.stage(stage).failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let stages = STAGES
            .iter()
            .chain(std::iter::once(&OTHER))
            .zip(&self.stages)
            .map(|(name, counters)| (name.to_string(), counters.read()))
            .collect();
        MetricsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_succeeded: self.runs_succeeded.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            runs_cancelled: self.runs_cancelled.load(Ordering::Relaxed),
            stages,
        }
    }

    /// Log the run counters and every stage that failed at least once.
    pub fn flush(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            runs_started = snapshot.runs_started,
            runs_succeeded = snapshot.runs_succeeded,
            runs_failed = snapshot.runs_failed,
            runs_cancelled = snapshot.runs_cancelled,
            stage_retries = snapshot.total_retries(),
            "pipeline metrics"
        );
        for (stage, counts) in snapshot.stages.iter().filter(|(_, c)| c.failures > 0) {
            tracing::info!(
                stage = %stage,
                attempts = counts.attempts,
                retries = counts.retries,
                failures = counts.failures,
                "stage metrics"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_counters_are_kept_per_stage() {
        let m = Metrics::new();
        for _ in 0..4 {
            m.record_stage_attempt("ai");
        }
        for _ in 0..3 {
            m.record_stage_retry("ai");
        }
        m.record_stage_failure("ai");
        m.record_stage_attempt("parser");

        let snapshot = m.snapshot();
        assert_eq!(
            snapshot.stages["ai"],
            StageCounts {
                attempts: 4,
                retries: 3,
                failures: 1
            }
        );
        assert_eq!(snapshot.stages["parser"].attempts, 1);
        assert_eq!(snapshot.stages["security"], StageCounts::default());
        assert_eq!(snapshot.total_retries(), 3);
    }

    #[test]
    fn unknown_stages_share_a_bucket() {
        let m = Metrics::new();
        m.record_stage_failure("lint");
        m.record_stage_failure("format");

        let snapshot = m.snapshot();
        assert_eq!(snapshot.stages.len(), 5);
        assert_eq!(snapshot.stages["other"].failures, 2);
    }

    #[test]
    fn run_outcomes() {
        let m = Metrics::new();
        m.record_run_started();
        m.record_run_started();
        m.record_run_started();
        m.record_run_finished(RunOutcome::Succeeded);
        m.record_run_finished(RunOutcome::Failed);
        m.record_run_finished(RunOutcome::Cancelled);

        let snapshot = m.snapshot();
        assert_eq!(snapshot.runs_started, 3);
        assert_eq!(snapshot.runs_succeeded, 1);
        assert_eq!(snapshot.runs_failed, 1);
        assert_eq!(snapshot.runs_cancelled, 1);
    }
}
