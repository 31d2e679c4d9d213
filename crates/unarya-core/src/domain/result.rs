//! Aggregated and top-level pipeline results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::request::RunId;
use super::stage::StageStatus;

/// Bucketed composite risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 12.0 {
            RiskLevel::Critical
        } else if score >= 7.0 {
            RiskLevel::High
        } else if score >= 3.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Aggregated outcome of a successful run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalResult {
    pub summary: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub insights: BTreeMap<String, String>,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Terminal (or last reached) status of one stage in a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageSummary {
    pub stage: String,
    pub status: StageStatus,
    /// Number of calls made to the stage adapter (0 if never reached).
    pub attempts: u32,
}

/// Result of one pipeline run.
///
/// Complete on success. When carried by a failure it is partial: statuses
/// reached so far, no final result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineResult {
    pub run_id: RunId,

    /// Digest of the ordered stage names the run executed.
    pub plan_digest: String,

    /// Per-stage statuses in pipeline order.
    pub stages: Vec<StageSummary>,

    pub final_result: Option<FinalResult>,

    /// Wall-clock duration from first stage start to aggregation.
    pub duration_ms: u64,

    pub failed_stage: Option<String>,

    pub error: Option<String>,
}

impl PipelineResult {
    /// Status of the named stage, if the plan contains it.
    pub fn status_of(&self, stage: &str) -> Option<StageStatus> {
        self.stages
            .iter()
            .find(|s| s.stage == stage)
            .map(|s| s.status)
    }

    /// Whether every stage finished successfully.
    pub fn succeeded(&self) -> bool {
        !self.stages.is_empty() && self.stages.iter().all(|s| s.status == StageStatus::Success)
    }

    pub fn passed_count(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| s.status == StageStatus::Success)
            .count()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Stage name to status string, as reported on the RPC surface.
    pub fn status_strings(&self) -> BTreeMap<String, String> {
        self.stages
            .iter()
            .map(|s| (s.stage.clone(), s.status.as_str().to_string()))
            .collect()
    }
}
