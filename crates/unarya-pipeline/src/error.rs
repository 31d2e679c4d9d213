//! Orchestrator error types.

use thiserror::Error;
use unarya_core::{ConfigError, PipelineResult, RetryExhausted};

/// Why a run did not produce a final result.
///
/// Failures after validation carry the partial [`PipelineResult`] with every
/// stage status observed so far.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Request rejected before any stage was called.
    #[error("invalid pipeline request: {0}")]
    Configuration(#[from] ConfigError),

    #[error("stage {stage} failed after {attempts} attempt(s): {source}")]
    StageFailed {
        stage: String,
        attempts: u32,
        #[source]
        source: RetryExhausted,
        partial: Box<PipelineResult>,
    },

    #[error("run cancelled during stage {stage}")]
    Cancelled {
        stage: String,
        partial: Box<PipelineResult>,
    },

    /// A successful plan left the aggregator without an input.
    #[error("internal orchestrator error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Stage the run stopped at, if it got that far.
    pub fn stage(&self) -> Option<&str> {
        match self {
            OrchestratorError::StageFailed { stage, .. }
            | OrchestratorError::Cancelled { stage, .. } => Some(stage.as_str()),
            _ => None,
        }
    }

    /// Partial result of a run that aborted at a stage.
    pub fn partial(&self) -> Option<&PipelineResult> {
        match self {
            OrchestratorError::StageFailed { partial, .. }
            | OrchestratorError::Cancelled { partial, .. } => Some(partial.as_ref()),
            _ => None,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, OrchestratorError::Configuration(_))
    }
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// A stage plan that cannot run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("pipeline plan has no stages")]
    Empty,

    #[error("duplicate stage name: {0}")]
    DuplicateStage(String),

    #[error("stage {stage} consumes {input} which no earlier stage produces")]
    UnsatisfiedInput { stage: String, input: String },

    #[error("artifact {artifact} is produced by both {first} and {second}")]
    DuplicateOutput {
        artifact: String,
        first: String,
        second: String,
    },

    #[error("no stage produces {0}, required for aggregation")]
    MissingAggregateInput(String),
}
