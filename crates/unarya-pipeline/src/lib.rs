//! Unarya Pipeline - stage orchestration for code analysis
//!
//! Provides an orchestrator that:
//! - Runs a declared plan of stages (collector, parser, ai, security)
//! - Retries failing stage calls under a bounded policy
//! - Tracks per-run stage progress and aggregates a risk-scored result

pub mod api;
pub mod clients;
pub mod error;
pub mod fakes;
pub mod orchestrator;
pub mod stage;

// Re-export key types
pub use clients::http::stage_clients;
pub use clients::{
    AiClient, CollectRequest, CollectorClient, ParserClient, SecurityScanClient, StageClients,
};
pub use error::{OrchestratorError, PlanError, Result};
pub use orchestrator::Orchestrator;
pub use stage::{
    Artifact, ArtifactKind, PipelinePlan, PipelineStage, StageContext, StageDescriptor,
};
