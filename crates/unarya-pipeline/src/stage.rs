//! Declared stage plan.
//!
//! A run is an ordered list of [`StageDescriptor`]s. Each descriptor names
//! the artifacts it consumes and the one it produces; [`PipelinePlan::new`]
//! checks that every input is produced upstream, so the orchestrator can
//! iterate the plan without knowing what the stages are.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use unarya_core::{
    names, AiResult, CollectedSource, ParsedData, PipelineRequest, ScanResult, SourceType,
    StageError,
};

use crate::clients::{CollectRequest, StageClients};
use crate::error::PlanError;

/// Kinds of data flowing between stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// The validated request. Always available.
    Request,
    Source,
    Parsed,
    Analysis,
    Scan,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Request => "request",
            ArtifactKind::Source => "source",
            ArtifactKind::Parsed => "parsed",
            ArtifactKind::Analysis => "analysis",
            ArtifactKind::Scan => "scan",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Source(CollectedSource),
    Parsed(ParsedData),
    Analysis(AiResult),
    Scan(ScanResult),
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Artifact::Source(_) => ArtifactKind::Source,
            Artifact::Parsed(_) => ArtifactKind::Parsed,
            Artifact::Analysis(_) => ArtifactKind::Analysis,
            Artifact::Scan(_) => ArtifactKind::Scan,
        }
    }
}

/// Request plus the artifacts produced so far in one run.
#[derive(Debug, Clone)]
pub struct StageContext {
    request: PipelineRequest,
    artifacts: BTreeMap<ArtifactKind, Artifact>,
}

fn missing(kind: ArtifactKind) -> StageError {
    StageError::Application(format!("no {kind} artifact available"))
}

impl StageContext {
    pub fn new(request: PipelineRequest) -> Self {
        Self {
            request,
            artifacts: BTreeMap::new(),
        }
    }

    pub fn request(&self) -> &PipelineRequest {
        &self.request
    }

    pub fn insert(&mut self, artifact: Artifact) {
        self.artifacts.insert(artifact.kind(), artifact);
    }

    pub fn has(&self, kind: ArtifactKind) -> bool {
        kind == ArtifactKind::Request || self.artifacts.contains_key(&kind)
    }

    pub fn source(&self) -> Result<&CollectedSource, StageError> {
        match self.artifacts.get(&ArtifactKind::Source) {
            Some(Artifact::Source(source)) => Ok(source),
            _ => Err(missing(ArtifactKind::Source)),
        }
    }

    pub fn parsed(&self) -> Result<&ParsedData, StageError> {
        match self.artifacts.get(&ArtifactKind::Parsed) {
            Some(Artifact::Parsed(parsed)) => Ok(parsed),
            _ => Err(missing(ArtifactKind::Parsed)),
        }
    }

    pub fn analysis(&self) -> Result<&AiResult, StageError> {
        match self.artifacts.get(&ArtifactKind::Analysis) {
            Some(Artifact::Analysis(ai)) => Ok(ai),
            _ => Err(missing(ArtifactKind::Analysis)),
        }
    }

    pub fn scan(&self) -> Result<&ScanResult, StageError> {
        match self.artifacts.get(&ArtifactKind::Scan) {
            Some(Artifact::Scan(scan)) => Ok(scan),
            _ => Err(missing(ArtifactKind::Scan)),
        }
    }
}

/// One attempt of a stage. Called again by the retry policy on failure, so
/// implementations must not mutate the context.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    async fn execute(
        &self,
        ctx: &StageContext,
        clients: &StageClients,
    ) -> Result<Artifact, StageError>;
}

/// Fetches the source through the collector method matching the source type.
#[derive(Debug, Default, Clone, Copy)]
pub struct CollectStage;

#[async_trait]
impl PipelineStage for CollectStage {
    async fn execute(
        &self,
        ctx: &StageContext,
        clients: &StageClients,
    ) -> Result<Artifact, StageError> {
        let request = CollectRequest::from(ctx.request());
        let collected = match ctx.request().source_type {
            SourceType::Git => clients.collector.collect_from_git(&request).await?,
            SourceType::Archive => clients.collector.collect_from_archive(&request).await?,
            SourceType::Url => clients.collector.collect_from_url(&request).await?,
        };
        if collected.path.trim().is_empty() {
            return Err(StageError::Application(
                "collector returned an empty source path".to_string(),
            ));
        }
        Ok(Artifact::Source(collected))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ParseStage;

#[async_trait]
impl PipelineStage for ParseStage {
    async fn execute(
        &self,
        ctx: &StageContext,
        clients: &StageClients,
    ) -> Result<Artifact, StageError> {
        let source = ctx.source()?;
        let parsed = clients.parser.parse_code(&source.path).await?;
        // The AI stage is keyed on the language; a blank one is a parser fault.
        if parsed.language.trim().is_empty() {
            return Err(StageError::Application(
                "parser returned no language".to_string(),
            ));
        }
        Ok(Artifact::Parsed(parsed))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AnalyzeStage;

#[async_trait]
impl PipelineStage for AnalyzeStage {
    async fn execute(
        &self,
        ctx: &StageContext,
        clients: &StageClients,
    ) -> Result<Artifact, StageError> {
        let parsed = ctx.parsed()?;
        let result = clients
            .ai
            .analyze_code(&parsed.language, &parsed.code_structure)
            .await?;
        Ok(Artifact::Analysis(result))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScanStage;

#[async_trait]
impl PipelineStage for ScanStage {
    async fn execute(
        &self,
        ctx: &StageContext,
        clients: &StageClients,
    ) -> Result<Artifact, StageError> {
        let source = ctx.source()?;
        let scan = clients
            .security
            .scan_for_vulnerabilities(&source.path)
            .await?;
        Ok(Artifact::Scan(scan))
    }
}

/// A named stage with its data dependencies.
#[derive(Clone)]
pub struct StageDescriptor {
    pub name: String,
    pub inputs: Vec<ArtifactKind>,
    pub output: ArtifactKind,
    pub handler: Arc<dyn PipelineStage>,
}

impl fmt::Debug for StageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDescriptor")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

impl StageDescriptor {
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<ArtifactKind>,
        output: ArtifactKind,
        handler: Arc<dyn PipelineStage>,
    ) -> Self {
        Self {
            name: name.into(),
            inputs,
            output,
            handler,
        }
    }
}

/// Artifacts the aggregator reads.
pub const AGGREGATE_INPUTS: [ArtifactKind; 3] = [
    ArtifactKind::Parsed,
    ArtifactKind::Analysis,
    ArtifactKind::Scan,
];

/// Validated, ordered list of stages.
#[derive(Debug, Clone)]
pub struct PipelinePlan {
    stages: Vec<StageDescriptor>,
    digest: String,
}

impl PipelinePlan {
    pub fn new(stages: Vec<StageDescriptor>) -> Result<Self, PlanError> {
        if stages.is_empty() {
            return Err(PlanError::Empty);
        }

        let mut produced: BTreeMap<ArtifactKind, &str> = BTreeMap::new();
        let mut seen: Vec<&str> = Vec::with_capacity(stages.len());
        for stage in &stages {
            if seen.contains(&stage.name.as_str()) {
                return Err(PlanError::DuplicateStage(stage.name.clone()));
            }
            seen.push(&stage.name);

            for input in &stage.inputs {
                if *input != ArtifactKind::Request && !produced.contains_key(input) {
                    return Err(PlanError::UnsatisfiedInput {
                        stage: stage.name.clone(),
                        input: input.to_string(),
                    });
                }
            }
            if let Some(first) = produced.insert(stage.output, &stage.name) {
                return Err(PlanError::DuplicateOutput {
                    artifact: stage.output.to_string(),
                    first: first.to_string(),
                    second: stage.name.clone(),
                });
            }
        }
        for required in AGGREGATE_INPUTS {
            if !produced.contains_key(&required) {
                return Err(PlanError::MissingAggregateInput(required.to_string()));
            }
        }

        let names: Vec<String> = stages.iter().map(|s| s.name.clone()).collect();
        let digest = compute_plan_digest(&names);
        Ok(Self { stages, digest })
    }

    /// collector → parser → ai → security.
    pub fn standard() -> Self {
        Self {
            digest: compute_plan_digest(&[
                names::COLLECTOR.to_string(),
                names::PARSER.to_string(),
                names::AI.to_string(),
                names::SECURITY.to_string(),
            ]),
            stages: standard_stages(),
        }
    }

    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// SHA-256 of the ordered stage names.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl Default for PipelinePlan {
    fn default() -> Self {
        Self::standard()
    }
}

fn standard_stages() -> Vec<StageDescriptor> {
    vec![
        StageDescriptor::new(
            names::COLLECTOR,
            vec![ArtifactKind::Request],
            ArtifactKind::Source,
            Arc::new(CollectStage),
        ),
        StageDescriptor::new(
            names::PARSER,
            vec![ArtifactKind::Source],
            ArtifactKind::Parsed,
            Arc::new(ParseStage),
        ),
        StageDescriptor::new(
            names::AI,
            vec![ArtifactKind::Parsed],
            ArtifactKind::Analysis,
            Arc::new(AnalyzeStage),
        ),
        StageDescriptor::new(
            names::SECURITY,
            vec![ArtifactKind::Source],
            ArtifactKind::Scan,
            Arc::new(ScanStage),
        ),
    ]
}

/// Deterministic digest of ordered stage names.
fn compute_plan_digest(stages: &[String]) -> String {
    let mut hasher = Sha256::new();
    for stage in stages {
        hasher.update(stage.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, inputs: Vec<ArtifactKind>, output: ArtifactKind) -> StageDescriptor {
        StageDescriptor::new(name, inputs, output, Arc::new(ScanStage))
    }

    #[test]
    fn test_standard_plan_order() {
        let plan = PipelinePlan::standard();
        assert_eq!(plan.stage_names(), vec!["collector", "parser", "ai", "security"]);
    }

    #[test]
    fn test_standard_plan_passes_validation() {
        let validated = PipelinePlan::new(standard_stages()).expect("standard plan is valid");
        assert_eq!(validated.digest(), PipelinePlan::standard().digest());
    }

    #[test]
    fn test_digest_order_sensitive() {
        let a = compute_plan_digest(&["parser".to_string(), "ai".to_string()]);
        let b = compute_plan_digest(&["ai".to_string(), "parser".to_string()]);
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_unsatisfied_input_rejected() {
        let err = PipelinePlan::new(vec![
            descriptor("ai", vec![ArtifactKind::Parsed], ArtifactKind::Analysis),
            descriptor("parser", vec![ArtifactKind::Request], ArtifactKind::Parsed),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            PlanError::UnsatisfiedInput {
                stage: "ai".to_string(),
                input: "parsed".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let err = PipelinePlan::new(vec![
            descriptor("collector", vec![], ArtifactKind::Source),
            descriptor("collector", vec![], ArtifactKind::Parsed),
        ])
        .unwrap_err();
        assert_eq!(err, PlanError::DuplicateStage("collector".to_string()));
    }

    #[test]
    fn test_duplicate_output_rejected() {
        let err = PipelinePlan::new(vec![
            descriptor("a", vec![], ArtifactKind::Source),
            descriptor("b", vec![], ArtifactKind::Source),
        ])
        .unwrap_err();
        assert!(matches!(err, PlanError::DuplicateOutput { .. }));
    }

    #[test]
    fn test_missing_aggregate_input_rejected() {
        let err = PipelinePlan::new(vec![
            descriptor("collector", vec![], ArtifactKind::Source),
            descriptor("parser", vec![ArtifactKind::Source], ArtifactKind::Parsed),
            descriptor("security", vec![ArtifactKind::Source], ArtifactKind::Scan),
        ])
        .unwrap_err();
        assert_eq!(err, PlanError::MissingAggregateInput("analysis".to_string()));
    }

    #[test]
    fn test_empty_plan_rejected() {
        assert_eq!(PipelinePlan::new(vec![]).unwrap_err(), PlanError::Empty);
    }

    #[test]
    fn test_context_accessors() {
        let request = PipelineRequest::new("https://github.com/unarya/demo", SourceType::Git);
        let mut ctx = StageContext::new(request);
        assert!(ctx.has(ArtifactKind::Request));
        assert!(ctx.parsed().is_err());

        ctx.insert(Artifact::Parsed(ParsedData {
            language: "Rust".to_string(),
            ..ParsedData::default()
        }));
        assert!(ctx.has(ArtifactKind::Parsed));
        assert_eq!(ctx.parsed().unwrap().language, "Rust");
    }
}
