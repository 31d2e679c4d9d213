//! In-memory fakes for the stage client traits (testing only)
//!
//! Each fake replays scripted responses, then falls back to a fixed one, and
//! records every call it receives. The default AI fake returns canned
//! insights without any network access.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use unarya_core::{
    AiResult, CollectedSource, ParsedData, PipelineRequest, ScanResult, SourceType, StageError,
};

use crate::clients::{
    AiClient, CollectRequest, CollectorClient, ParserClient, SecurityScanClient, StageClients,
};

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

/// Scripted responses for one fake.
pub struct Script<T> {
    queued: Mutex<VecDeque<Result<T, StageError>>>,
    fallback: Mutex<Result<T, StageError>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
    entered: Notify,
}

impl<T: Clone> Script<T> {
    pub fn new(fallback: Result<T, StageError>) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
            entered: Notify::new(),
        }
    }

    /// Queue a response for the next unscripted call.
    pub fn push(&self, response: Result<T, StageError>) {
        self.queued.lock().unwrap().push_back(response);
    }

    /// Response once the queue is drained.
    pub fn set_fallback(&self, response: Result<T, StageError>) {
        *self.fallback.lock().unwrap() = response;
    }

    /// Sleep this long inside every call.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Resolves once a call has started.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    async fn next(&self) -> Result<T, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self
            .queued
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().unwrap().clone());
        let delay = *self.delay.lock().unwrap();
        self.entered.notify_one();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        response
    }
}

// ---------------------------------------------------------------------------
// FakeCollector
// ---------------------------------------------------------------------------

pub struct FakeCollector {
    pub script: Script<CollectedSource>,
    requests: Mutex<Vec<(SourceType, CollectRequest)>>,
}

impl FakeCollector {
    pub fn new(path: &str) -> Self {
        Self {
            script: Script::new(Ok(CollectedSource {
                path: path.to_string(),
                message: "repository cloned".to_string(),
            })),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request received, tagged with the collector method used.
    pub fn requests(&self) -> Vec<(SourceType, CollectRequest)> {
        self.requests.lock().unwrap().clone()
    }

    async fn collect(
        &self,
        kind: SourceType,
        request: &CollectRequest,
    ) -> Result<CollectedSource, StageError> {
        self.requests.lock().unwrap().push((kind, request.clone()));
        self.script.next().await
    }
}

#[async_trait]
impl CollectorClient for FakeCollector {
    async fn collect_from_git(
        &self,
        request: &CollectRequest,
    ) -> Result<CollectedSource, StageError> {
        self.collect(SourceType::Git, request).await
    }

    async fn collect_from_archive(
        &self,
        request: &CollectRequest,
    ) -> Result<CollectedSource, StageError> {
        self.collect(SourceType::Archive, request).await
    }

    async fn collect_from_url(
        &self,
        request: &CollectRequest,
    ) -> Result<CollectedSource, StageError> {
        self.collect(SourceType::Url, request).await
    }
}

// ---------------------------------------------------------------------------
// FakeParser
// ---------------------------------------------------------------------------

pub struct FakeParser {
    pub script: Script<ParsedData>,
    paths: Mutex<Vec<String>>,
}

impl FakeParser {
    pub fn new(language: &str) -> Self {
        let mut metrics = BTreeMap::new();
        metrics.insert("files".to_string(), 12.0);
        metrics.insert("complexity".to_string(), 3.5);
        Self {
            script: Script::new(Ok(ParsedData {
                language: language.to_string(),
                dependencies: vec!["serde".to_string(), "tokio".to_string()],
                metrics,
                code_structure: r#"{"modules":["main","handlers"]}"#.to_string(),
                representation: "json".to_string(),
            })),
            paths: Mutex::new(Vec::new()),
        }
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

#[async_trait]
impl ParserClient for FakeParser {
    async fn parse_code(&self, source_path: &str) -> Result<ParsedData, StageError> {
        self.paths.lock().unwrap().push(source_path.to_string());
        self.script.next().await
    }
}

// ---------------------------------------------------------------------------
// FakeAi
// ---------------------------------------------------------------------------

/// Model name reported by the canned AI response.
pub const CANNED_MODEL: &str = "ai-model-v2";

pub struct FakeAi {
    pub script: Script<AiResult>,
    inputs: Mutex<Vec<(String, String)>>,
}

impl FakeAi {
    pub fn new() -> Self {
        Self {
            script: Script::new(Ok(canned_analysis())),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// `(language, code_structure)` of every call.
    pub fn inputs(&self) -> Vec<(String, String)> {
        self.inputs.lock().unwrap().clone()
    }
}

impl Default for FakeAi {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed analysis returned when no network model is involved.
pub fn canned_analysis() -> AiResult {
    let mut predictions = BTreeMap::new();
    predictions.insert("quality_score".to_string(), 0.85);
    predictions.insert("confidence".to_string(), 0.9);
    let mut insights = BTreeMap::new();
    insights.insert(
        "analysis".to_string(),
        "code structure looks maintainable".to_string(),
    );
    insights.insert("confidence".to_string(), "0.9".to_string());
    AiResult {
        predictions,
        insights,
        model_used: CANNED_MODEL.to_string(),
    }
}

#[async_trait]
impl AiClient for FakeAi {
    async fn analyze_code(
        &self,
        language: &str,
        code_structure: &str,
    ) -> Result<AiResult, StageError> {
        self.inputs
            .lock()
            .unwrap()
            .push((language.to_string(), code_structure.to_string()));
        self.script.next().await
    }
}

// ---------------------------------------------------------------------------
// FakeSecurityScanner
// ---------------------------------------------------------------------------

pub struct FakeSecurityScanner {
    pub script: Script<ScanResult>,
    paths: Mutex<Vec<String>>,
}

impl FakeSecurityScanner {
    pub fn new(scan: ScanResult) -> Self {
        Self {
            script: Script::new(Ok(scan)),
            paths: Mutex::new(Vec::new()),
        }
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecurityScanClient for FakeSecurityScanner {
    async fn scan_for_vulnerabilities(&self, source_path: &str) -> Result<ScanResult, StageError> {
        self.paths.lock().unwrap().push(source_path.to_string());
        self.script.next().await
    }
}

// ---------------------------------------------------------------------------
// FakeStageServices
// ---------------------------------------------------------------------------

/// Source path the healthy collector reports.
pub const FAKE_SOURCE_PATH: &str = "/tmp/unarya/src/demo";

/// One fake per stage, all healthy by default.
#[derive(Clone)]
pub struct FakeStageServices {
    pub collector: Arc<FakeCollector>,
    pub parser: Arc<FakeParser>,
    pub ai: Arc<FakeAi>,
    pub security: Arc<FakeSecurityScanner>,
}

impl FakeStageServices {
    pub fn healthy() -> Self {
        Self {
            collector: Arc::new(FakeCollector::new(FAKE_SOURCE_PATH)),
            parser: Arc::new(FakeParser::new("Go")),
            ai: Arc::new(FakeAi::new()),
            security: Arc::new(FakeSecurityScanner::new(ScanResult::default())),
        }
    }

    pub fn clients(&self) -> StageClients {
        StageClients::new(
            self.collector.clone(),
            self.parser.clone(),
            self.ai.clone(),
            self.security.clone(),
        )
    }

    /// A valid git request.
    pub fn request(&self) -> PipelineRequest {
        PipelineRequest::new("https://github.com/unarya/demo.git", SourceType::Git)
    }
}
