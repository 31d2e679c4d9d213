//! Unarya Core Library
//!
//! Domain model, per-run state tracking, retry policy and risk aggregation
//! shared by the pipeline orchestrator and its binaries.

pub mod aggregator;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod obs;
pub mod retry;
pub mod state;
pub mod telemetry;

pub use aggregator::{aggregate, aggregate_at, risk_score};

pub use config::OrchestratorConfig;

pub use domain::{
    names, AiResult, CollectedSource, ComplianceResult, ComplianceRule, ConfigError,
    ConfigResult, DependencyIssue, ErrorKind, FinalResult, Location, ParsedData,
    PipelineRequest, PipelineResult, RiskLevel, RunId, ScanResult, SecretFinding, SourceType,
    StageError, StageState, StageStatus, StageSummary, Vulnerability,
};

pub use retry::{Retried, RetryEntry, RetryExhausted, RetryPolicy};
pub use state::StateTracker;

/// Crate version, reported by the daemon and CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
