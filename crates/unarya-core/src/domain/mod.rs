//! Domain models for the Unarya pipeline.
//!
//! Canonical definitions for the core entities:
//! - `PipelineRequest`: Immutable input of a run
//! - `StageStatus` / `StageState`: Per-stage progress
//! - Stage artifacts: `CollectedSource`, `ParsedData`, `AiResult`, `ScanResult`
//! - `FinalResult` / `PipelineResult`: Aggregated output

pub mod artifacts;
pub mod error;
pub mod request;
pub mod result;
pub mod stage;

pub use artifacts::{
    AiResult, CollectedSource, ComplianceResult, ComplianceRule, DependencyIssue, Location,
    ParsedData, ScanResult, SecretFinding, Vulnerability,
};
pub use error::{ConfigError, ConfigResult, ErrorKind, StageError};
pub use request::{PipelineRequest, RunId, SourceType};
pub use result::{FinalResult, PipelineResult, RiskLevel, StageSummary};
pub use stage::{names, StageState, StageStatus};
