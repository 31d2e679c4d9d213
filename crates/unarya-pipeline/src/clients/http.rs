//! HTTP/JSON clients for the stage services.
//!
//! Every call is a `POST {base}/{package}.{Service}/{Method}` with a JSON
//! body. Connection failures, request timeouts and overload statuses map to
//! transport errors; any other non-success status is an application error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use unarya_core::{
    AiResult, CollectedSource, OrchestratorConfig, ParsedData, ScanResult, StageError,
};

use super::wire::{
    self, AnalyzeRequest, AnalyzeResponse, CollectRequest, ParseResponse, RpcMethod,
    ScanResponse, SourcePathRequest,
};
use super::{AiClient, CollectorClient, ParserClient, SecurityScanClient, StageClients};

/// JSON-over-HTTP client bound to one service base URL.
#[derive(Debug, Clone)]
pub struct RpcClient {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl RpcClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::from_builder(base_url, reqwest::Client::builder(), timeout)
    }

    /// Build the HTTP client from `builder` with `timeout` as its request
    /// timeout. A builder that cannot produce a client is an error.
    pub fn from_builder(
        base_url: impl Into<String>,
        builder: reqwest::ClientBuilder,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = builder.timeout(timeout).build()?;
        Ok(Self::with_client(base_url, client, timeout))
    }

    /// Reuse an existing client. `timeout` is reported on timed-out calls and
    /// should match the client's own request timeout.
    pub fn with_client(
        base_url: impl Into<String>,
        client: reqwest::Client,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn method_url(&self, method: RpcMethod) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), method.path())
    }

    /// Issue one call. No retries here; the orchestrator owns them.
    pub async fn call<Req, Resp>(&self, method: RpcMethod, request: &Req) -> Result<Resp, StageError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        tracing::debug!(method = %method, base_url = %self.base_url, "rpc call");

        let response = self
            .client
            .post(self.method_url(method))
            .json(request)
            .send()
            .await
            .map_err(|e| self.send_error(method, e))?;

        let status = response.status();
        if status.is_success() {
            let body = response
                .bytes()
                .await
                .map_err(|e| self.send_error(method, e))?;
            return serde_json::from_slice::<Resp>(&body)
                .map_err(|e| StageError::Decode(format!("{method}: {e}")));
        }

        let body = response.bytes().await.unwrap_or_default();
        let message = error_message(&body);
        Err(status_error(method, status, message))
    }

    fn send_error(&self, method: RpcMethod, error: reqwest::Error) -> StageError {
        if error.is_timeout() {
            StageError::Timeout(self.timeout)
        } else {
            StageError::Transport(format!("{method}: {error}"))
        }
    }
}

/// Extract `message` or `error` from a JSON error body, else the raw text.
fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "error"].iter().find_map(|key| {
                value
                    .get(*key)
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
        })
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string())
}

fn status_error(method: RpcMethod, status: StatusCode, message: String) -> StageError {
    match status {
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => {
            StageError::Transport(format!("{method} returned {status}: {message}"))
        }
        _ if message.is_empty() => StageError::Application(format!("{method} returned {status}")),
        _ => StageError::Application(message),
    }
}

#[derive(Debug, Clone)]
pub struct HttpCollectorClient {
    rpc: RpcClient,
}

impl HttpCollectorClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self::from_rpc(RpcClient::new(base_url, timeout)?))
    }

    pub fn from_rpc(rpc: RpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl CollectorClient for HttpCollectorClient {
    async fn collect_from_git(
        &self,
        request: &CollectRequest,
    ) -> Result<CollectedSource, StageError> {
        self.rpc.call(wire::COLLECT_FROM_GIT, request).await
    }

    async fn collect_from_archive(
        &self,
        request: &CollectRequest,
    ) -> Result<CollectedSource, StageError> {
        self.rpc.call(wire::COLLECT_FROM_ARCHIVE, request).await
    }

    async fn collect_from_url(
        &self,
        request: &CollectRequest,
    ) -> Result<CollectedSource, StageError> {
        self.rpc.call(wire::COLLECT_FROM_URL, request).await
    }
}

#[derive(Debug, Clone)]
pub struct HttpParserClient {
    rpc: RpcClient,
}

impl HttpParserClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self::from_rpc(RpcClient::new(base_url, timeout)?))
    }

    pub fn from_rpc(rpc: RpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl ParserClient for HttpParserClient {
    async fn parse_code(&self, source_path: &str) -> Result<ParsedData, StageError> {
        let request = SourcePathRequest {
            source_path: source_path.to_string(),
        };
        let response: ParseResponse = self.rpc.call(wire::PARSE_CODE, &request).await?;
        Ok(response.into())
    }
}

#[derive(Debug, Clone)]
pub struct HttpAiClient {
    rpc: RpcClient,
}

impl HttpAiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self::from_rpc(RpcClient::new(base_url, timeout)?))
    }

    pub fn from_rpc(rpc: RpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl AiClient for HttpAiClient {
    async fn analyze_code(
        &self,
        language: &str,
        code_structure: &str,
    ) -> Result<AiResult, StageError> {
        let request = AnalyzeRequest {
            language: language.to_string(),
            code_structure: code_structure.to_string(),
        };
        let response: AnalyzeResponse = self.rpc.call(wire::ANALYZE_CODE, &request).await?;
        Ok(response.into())
    }
}

#[derive(Debug, Clone)]
pub struct HttpSecurityScanClient {
    rpc: RpcClient,
}

impl HttpSecurityScanClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self::from_rpc(RpcClient::new(base_url, timeout)?))
    }

    pub fn from_rpc(rpc: RpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl SecurityScanClient for HttpSecurityScanClient {
    async fn scan_for_vulnerabilities(&self, source_path: &str) -> Result<ScanResult, StageError> {
        let request = SourcePathRequest {
            source_path: source_path.to_string(),
        };
        let response: ScanResponse = self
            .rpc
            .call(wire::SCAN_FOR_VULNERABILITIES, &request)
            .await?;
        ScanResult::try_from(response)
    }
}

/// Network clients for every stage, pointed at the configured endpoints.
///
/// The four adapters share one connection pool.
pub fn stage_clients(config: &OrchestratorConfig) -> Result<StageClients, reqwest::Error> {
    let timeout = config.stage_timeout;
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let rpc = |base: &str| RpcClient::with_client(base, client.clone(), timeout);

    Ok(StageClients::new(
        Arc::new(HttpCollectorClient::from_rpc(rpc(&config.collector_url))),
        Arc::new(HttpParserClient::from_rpc(rpc(&config.parser_url))),
        Arc::new(HttpAiClient::from_rpc(rpc(&config.ai_url))),
        Arc::new(HttpSecurityScanClient::from_rpc(rpc(&config.security_url))),
    ))
}
