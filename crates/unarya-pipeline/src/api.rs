//! Orchestrator service contract, shared by the daemon and its clients.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use unarya_core::{
    ConfigResult, PipelineRequest, PipelineResult, RunId, StageError, StageState,
};

use crate::clients::wire::RpcMethod;
use crate::error::OrchestratorError;

pub const START_PIPELINE: RpcMethod =
    RpcMethod::new("orchestrator", "OrchestratorService", "StartPipeline");

/// Route for background runs (`POST`) and run snapshots (`GET /pipelines/{id}`).
pub const PIPELINES_PATH: &str = "/pipelines";

pub const HEALTH_PATH: &str = "/healthz";

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_FAILED: &str = "failed";

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartPipelineRequest {
    pub repository_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_source_type")]
    pub source_type: String,
}

fn default_source_type() -> String {
    "git".to_string()
}

impl std::fmt::Debug for StartPipelineRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartPipelineRequest")
            .field("repository_url", &self.repository_url)
            .field("branch", &self.branch)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("source_type", &self.source_type)
            .finish()
    }
}

impl StartPipelineRequest {
    /// Validate into a typed request.
    pub fn into_request(self) -> ConfigResult<PipelineRequest> {
        PipelineRequest::parse(self.repository_url, self.branch, self.token, &self.source_type)
    }
}

/// Coarse outcome of a run: `status` is `success` or `failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartPipelineResponse {
    pub status: String,
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl StartPipelineResponse {
    pub fn succeeded(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    pub fn from_result(result: &PipelineResult) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            details: success_details(result),
            run_id: Some(result.run_id.to_string()),
        }
    }

    pub fn from_error(error: &OrchestratorError) -> Self {
        let details = match error {
            OrchestratorError::StageFailed { stage, source, .. } => {
                format!("Stage '{stage}' failed: {}", source.error)
            }
            OrchestratorError::Cancelled { stage, .. } => {
                format!("Stage '{stage}' failed: {}", StageError::Cancelled)
            }
            _ => error.to_string(),
        };
        Self {
            status: STATUS_FAILED.to_string(),
            details,
            run_id: error.partial().map(|p| p.run_id.to_string()),
        }
    }
}

/// Human-readable summary of a successful run.
pub fn success_details(result: &PipelineResult) -> String {
    let Some(final_result) = &result.final_result else {
        return format!("run {} produced no final result", result.run_id);
    };
    let insight = |key: &str| {
        final_result
            .insights
            .get(key)
            .map(String::as_str)
            .unwrap_or_default()
    };
    format!(
        "AI insights: {} (confidence: {})\nSecurity findings: {} issues\nReport summary: {}",
        insight("analysis"),
        insight("confidence"),
        insight("security.total_findings"),
        final_result.summary,
    )
}

/// Reply to a background start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedRun {
    pub run_id: String,
}

/// Progress of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: String,
    /// Still executing in the background.
    pub active: bool,
    pub stages: BTreeMap<String, StageState>,
    pub transitions: Vec<StageState>,
}

impl RunSnapshot {
    pub fn new(
        run_id: &RunId,
        active: bool,
        stages: BTreeMap<String, StageState>,
        transitions: Vec<StageState>,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            active,
            stages,
            transitions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unarya_core::{ConfigError, RetryExhausted};

    #[test]
    fn test_start_request_defaults_to_git() {
        let req: StartPipelineRequest =
            serde_json::from_str(r#"{"repository_url":"https://github.com/unarya/demo"}"#)
                .unwrap();
        assert_eq!(req.source_type, "git");
        let request = req.into_request().unwrap();
        assert_eq!(request.source_type, unarya_core::SourceType::Git);
    }

    #[test]
    fn test_start_request_rejects_bad_type() {
        let req = StartPipelineRequest {
            repository_url: "https://example.com/x".to_string(),
            source_type: "svn".to_string(),
            ..StartPipelineRequest::default()
        };
        assert!(matches!(
            req.into_request(),
            Err(ConfigError::UnsupportedSourceType(_))
        ));
    }

    #[test]
    fn test_start_request_debug_redacts_token() {
        let req = StartPipelineRequest {
            repository_url: "https://example.com/x".to_string(),
            token: Some("ghp_abc".to_string()),
            ..StartPipelineRequest::default()
        };
        assert!(!format!("{req:?}").contains("ghp_abc"));
    }

    #[test]
    fn test_configuration_failure_response() {
        let err = OrchestratorError::Configuration(ConfigError::EmptyUrl);
        let resp = StartPipelineResponse::from_error(&err);
        assert!(!resp.succeeded());
        assert!(resp.run_id.is_none());
        assert_eq!(resp.details, "invalid pipeline request: source URL must not be empty");
    }

    fn partial(stage: &str) -> Box<PipelineResult> {
        Box::new(PipelineResult {
            run_id: RunId::from("run-7"),
            plan_digest: String::new(),
            stages: Vec::new(),
            final_result: None,
            duration_ms: 0,
            failed_stage: Some(stage.to_string()),
            error: None,
        })
    }

    #[test]
    fn test_stage_failure_details_name_the_stage_once() {
        let err = OrchestratorError::StageFailed {
            stage: "ai".to_string(),
            attempts: 4,
            source: RetryExhausted {
                stage: "ai".to_string(),
                retries: 3,
                attempts: 4,
                retry_log: Vec::new(),
                error: StageError::Transport("connection refused".to_string()),
            },
            partial: partial("ai"),
        };

        let resp = StartPipelineResponse::from_error(&err);
        assert_eq!(
            resp.details,
            "Stage 'ai' failed: transport error: connection refused"
        );
        assert_eq!(resp.run_id.as_deref(), Some("run-7"));
    }

    #[test]
    fn test_cancelled_details() {
        let err = OrchestratorError::Cancelled {
            stage: "parser".to_string(),
            partial: partial("parser"),
        };
        let resp = StartPipelineResponse::from_error(&err);
        assert_eq!(resp.details, "Stage 'parser' failed: call cancelled");
    }

    #[test]
    fn test_start_pipeline_path() {
        assert_eq!(
            START_PIPELINE.path(),
            "/orchestrator.OrchestratorService/StartPipeline"
        );
    }
}
