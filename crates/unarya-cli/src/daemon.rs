//! Client for a running `unaryad`.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use unarya_pipeline::api::{
    self, RunSnapshot, StartPipelineRequest, StartPipelineResponse, StartedRun,
};

pub struct DaemonClient {
    base_url: String,
    client: reqwest::Client,
}

impl DaemonClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Run synchronously. Failed runs are still a response, not an error.
    pub async fn start_pipeline(
        &self,
        request: &StartPipelineRequest,
    ) -> Result<StartPipelineResponse> {
        let url = format!("{}{}", self.base_url, api::START_PIPELINE.path());
        let resp = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("failed to reach daemon at {}", self.base_url))?;
        resp.json::<StartPipelineResponse>()
            .await
            .context("unexpected StartPipeline response")
    }

    pub async fn start_background(&self, request: &StartPipelineRequest) -> Result<StartedRun> {
        let url = format!("{}{}", self.base_url, api::PIPELINES_PATH);
        let resp = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("failed to reach daemon at {}", self.base_url))?;
        if !resp.status().is_success() {
            let failed: StartPipelineResponse = resp
                .json()
                .await
                .context("unexpected error response from daemon")?;
            anyhow::bail!("{}", failed.details);
        }
        resp.json().await.context("unexpected start response")
    }

    pub async fn status(&self, run_id: &str) -> Result<RunSnapshot> {
        let url = format!("{}{}/{}", self.base_url, api::PIPELINES_PATH, run_id);
        self.get_json(&url)
            .await
            .with_context(|| format!("failed to fetch run {run_id}"))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("daemon returned {status}: {}", body.trim());
        }
        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    fn request() -> StartPipelineRequest {
        StartPipelineRequest {
            repository_url: "https://github.com/unarya/demo.git".to_string(),
            source_type: "git".to_string(),
            ..StartPipelineRequest::default()
        }
    }

    #[tokio::test]
    async fn failed_run_is_a_response() {
        let app = Router::new().route(
            "/orchestrator.OrchestratorService/StartPipeline",
            post(|| async {
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "status": "failed", "details": "Stage 'ai' failed: boom" })),
                )
            }),
        );
        let client = DaemonClient::new(serve(app).await);

        let resp = client.start_pipeline(&request()).await.expect("response");
        assert!(!resp.succeeded());
        assert_eq!(resp.details, "Stage 'ai' failed: boom");
    }

    #[tokio::test]
    async fn background_rejection_is_an_error() {
        let app = Router::new().route(
            "/pipelines",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "status": "failed", "details": "invalid pipeline request" })),
                )
            }),
        );
        let client = DaemonClient::new(serve(app).await);

        let err = client.start_background(&request()).await.unwrap_err();
        assert!(err.to_string().contains("invalid pipeline request"));
    }

    #[tokio::test]
    async fn status_of_unknown_run_fails() {
        let app = Router::new().route(
            "/pipelines/:run_id",
            get(|| async { (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown run" }))) }),
        );
        let client = DaemonClient::new(serve(app).await);

        let err = client.status("missing").await.unwrap_err();
        assert!(format!("{err:#}").contains("404"));
    }
}
