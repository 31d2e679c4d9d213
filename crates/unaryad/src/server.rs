//! HTTP surface of the orchestrator daemon.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use unarya_core::metrics::METRICS;
use unarya_core::{RunId, VERSION};
use unarya_pipeline::api::{
    self, RunSnapshot, StartPipelineRequest, StartPipelineResponse, StartedRun,
};
use unarya_pipeline::{Orchestrator, OrchestratorError};

#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    /// Parent of every synchronous run's token; cancelled on shutdown.
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, shutdown: CancellationToken) -> Self {
        Self {
            orchestrator,
            shutdown,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(&api::START_PIPELINE.path(), post(start_pipeline))
        .route(api::PIPELINES_PATH, post(start_background))
        .route(&format!("{}/:run_id", api::PIPELINES_PATH), get(run_snapshot))
        .route(api::HEALTH_PATH, get(health))
        .with_state(state)
}

fn error_status(error: &OrchestratorError) -> StatusCode {
    match error {
        OrchestratorError::Configuration(_) => StatusCode::BAD_REQUEST,
        OrchestratorError::StageFailed { .. } => StatusCode::BAD_GATEWAY,
        OrchestratorError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
        OrchestratorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Run a pipeline to completion and report the coarse outcome.
async fn start_pipeline(
    State(state): State<AppState>,
    Json(body): Json<StartPipelineRequest>,
) -> Response {
    info!(repository_url = %body.repository_url, source_type = %body.source_type, "received pipeline request");

    let request = match body.into_request() {
        Ok(request) => request,
        Err(e) => {
            let error = OrchestratorError::from(e);
            warn!(error = %error, "rejected pipeline request");
            return (
                StatusCode::BAD_REQUEST,
                Json(StartPipelineResponse::from_error(&error)),
            )
                .into_response();
        }
    };

    match state
        .orchestrator
        .run(request, state.shutdown.child_token())
        .await
    {
        Ok(result) => Json(StartPipelineResponse::from_result(&result)).into_response(),
        Err(error) => {
            warn!(error = %error, "pipeline failed");
            (
                error_status(&error),
                Json(StartPipelineResponse::from_error(&error)),
            )
                .into_response()
        }
    }
}

/// Start a pipeline in the background and return its id.
async fn start_background(
    State(state): State<AppState>,
    Json(body): Json<StartPipelineRequest>,
) -> Response {
    let started = body
        .into_request()
        .map_err(OrchestratorError::from)
        .and_then(|request| state.orchestrator.start(request));

    match started {
        Ok(run_id) => (
            StatusCode::ACCEPTED,
            Json(StartedRun {
                run_id: run_id.to_string(),
            }),
        )
            .into_response(),
        Err(error) => (
            error_status(&error),
            Json(StartPipelineResponse::from_error(&error)),
        )
            .into_response(),
    }
}

async fn run_snapshot(State(state): State<AppState>, Path(run_id): Path<String>) -> Response {
    let run_id = RunId::from(run_id.as_str());
    let tracker = state.orchestrator.tracker();
    if !tracker.contains(&run_id) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown run {run_id}") })),
        )
            .into_response();
    }

    Json(RunSnapshot::new(
        &run_id,
        state.orchestrator.is_active(&run_id),
        tracker.snapshot(&run_id),
        tracker.transitions(&run_id),
    ))
    .into_response()
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": VERSION, "metrics": METRICS.snapshot() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use unarya_core::{RetryPolicy, StageError, StageStatus};
    use unarya_pipeline::fakes::FakeStageServices;

    async fn spawn_daemon(fakes: &FakeStageServices) -> (String, Arc<Orchestrator>) {
        let orchestrator = Arc::new(
            Orchestrator::new(fakes.clients()).with_retry(RetryPolicy::new(1, Duration::ZERO)),
        );
        let app = router(AppState::new(orchestrator.clone(), CancellationToken::new()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{addr}"), orchestrator)
    }

    fn start_url(base: &str) -> String {
        format!("{base}{}", api::START_PIPELINE.path())
    }

    #[tokio::test]
    async fn start_pipeline_success() {
        let fakes = FakeStageServices::healthy();
        let (base, _) = spawn_daemon(&fakes).await;

        let resp = reqwest::Client::new()
            .post(start_url(&base))
            .json(&json!({
                "repository_url": "https://github.com/unarya/demo.git",
                "source_type": "git"
            }))
            .send()
            .await
            .expect("send");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        let body: StartPipelineResponse = resp.json().await.expect("json");
        assert!(body.succeeded());
        assert!(body.details.starts_with("AI insights: code structure looks maintainable"));
        assert!(body.details.contains("Security findings: 0 issues"));
        assert!(body.run_id.is_some());
    }

    #[tokio::test]
    async fn start_pipeline_rejects_empty_url() {
        let fakes = FakeStageServices::healthy();
        let (base, _) = spawn_daemon(&fakes).await;

        let resp = reqwest::Client::new()
            .post(start_url(&base))
            .json(&json!({ "repository_url": "", "source_type": "git" }))
            .send()
            .await
            .expect("send");
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

        let body: StartPipelineResponse = resp.json().await.expect("json");
        assert_eq!(body.status, "failed");
        assert_eq!(fakes.collector.script.calls(), 0);
    }

    #[tokio::test]
    async fn start_pipeline_reports_failed_stage() {
        let fakes = FakeStageServices::healthy();
        fakes
            .security
            .script
            .set_fallback(Err(StageError::Transport("connection refused".to_string())));
        let (base, _) = spawn_daemon(&fakes).await;

        let resp = reqwest::Client::new()
            .post(start_url(&base))
            .json(&json!({ "repository_url": "https://github.com/unarya/demo.git" }))
            .send()
            .await
            .expect("send");
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_GATEWAY);

        let body: StartPipelineResponse = resp.json().await.expect("json");
        assert_eq!(body.status, "failed");
        assert_eq!(
            body.details,
            "Stage 'security' failed: transport error: connection refused"
        );
        assert_eq!(fakes.security.script.calls(), 2);
    }

    #[tokio::test]
    async fn background_run_snapshot() {
        let fakes = FakeStageServices::healthy();
        let (base, orchestrator) = spawn_daemon(&fakes).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}{}", api::PIPELINES_PATH))
            .json(&json!({ "repository_url": "https://example.com/src.zip", "source_type": "archive" }))
            .send()
            .await
            .expect("send");
        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);
        let started: StartedRun = resp.json().await.expect("json");

        let run_id = RunId::from(started.run_id.as_str());
        tokio::time::timeout(Duration::from_secs(5), async {
            while orchestrator.is_active(&run_id) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("background run finished");

        let snapshot: RunSnapshot = client
            .get(format!("{base}{}/{}", api::PIPELINES_PATH, started.run_id))
            .send()
            .await
            .expect("send")
            .json()
            .await
            .expect("json");
        assert!(!snapshot.active);
        assert_eq!(snapshot.stages.len(), 4);
        assert!(snapshot
            .stages
            .values()
            .all(|s| s.status == StageStatus::Success));
        assert_eq!(snapshot.transitions.len(), 12);
    }

    #[tokio::test]
    async fn unknown_run_is_not_found() {
        let fakes = FakeStageServices::healthy();
        let (base, _) = spawn_daemon(&fakes).await;

        let resp = reqwest::get(format!("{base}/pipelines/no-such-run"))
            .await
            .expect("send");
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_reports_version() {
        let fakes = FakeStageServices::healthy();
        let (base, _) = spawn_daemon(&fakes).await;

        let body: serde_json::Value = reqwest::get(format!("{base}/healthz"))
            .await
            .expect("send")
            .json()
            .await
            .expect("json");
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], VERSION);
        assert!(body["metrics"]["stages"]["ai"]["attempts"].is_u64());
    }
}
