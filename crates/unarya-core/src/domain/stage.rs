//! Stage status and state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical stage names of the standard pipeline.
pub mod names {
    pub const COLLECTOR: &str = "collector";
    pub const PARSER: &str = "parser";
    pub const AI: &str = "ai";
    pub const SECURITY: &str = "security";
}

/// Status of a pipeline stage.
///
/// `Pending -> Running -> {Success | Failed}`. Retries happen inside a single
/// `Running` period and are not visible here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Success => "success",
            StageStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Success | StageStatus::Failed)
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last recorded state of a stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageState {
    pub stage: String,
    pub status: StageStatus,
    pub updated_at: DateTime<Utc>,
}

impl StageState {
    pub fn new(stage: impl Into<String>, status: StageStatus) -> Self {
        Self {
            stage: stage.into(),
            status,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!StageStatus::Pending.is_terminal());
        assert!(!StageStatus::Running.is_terminal());
        assert!(StageStatus::Success.is_terminal());
        assert!(StageStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_serde_matches_as_str() {
        for status in [
            StageStatus::Pending,
            StageStatus::Running,
            StageStatus::Success,
            StageStatus::Failed,
        ] {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, serde_json::Value::String(status.as_str().to_string()));
        }
    }
}
