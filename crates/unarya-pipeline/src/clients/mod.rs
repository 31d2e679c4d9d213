//! Stage client adapters.
//!
//! One trait per downstream service. The orchestrator only sees these traits;
//! [`http`] provides the network implementations and [`crate::fakes`] the
//! in-memory ones. Adapters never touch run state.

pub mod http;
pub mod wire;

use std::sync::Arc;

use async_trait::async_trait;
use unarya_core::{AiResult, CollectedSource, ParsedData, ScanResult, StageError};

pub use wire::CollectRequest;

/// Materializes a source tree.
#[async_trait]
pub trait CollectorClient: Send + Sync {
    async fn collect_from_git(&self, request: &CollectRequest)
        -> Result<CollectedSource, StageError>;

    async fn collect_from_archive(
        &self,
        request: &CollectRequest,
    ) -> Result<CollectedSource, StageError>;

    async fn collect_from_url(&self, request: &CollectRequest)
        -> Result<CollectedSource, StageError>;
}

#[async_trait]
pub trait ParserClient: Send + Sync {
    async fn parse_code(&self, source_path: &str) -> Result<ParsedData, StageError>;
}

#[async_trait]
pub trait AiClient: Send + Sync {
    async fn analyze_code(
        &self,
        language: &str,
        code_structure: &str,
    ) -> Result<AiResult, StageError>;
}

#[async_trait]
pub trait SecurityScanClient: Send + Sync {
    async fn scan_for_vulnerabilities(&self, source_path: &str)
        -> Result<ScanResult, StageError>;
}

/// The four adapters a run needs.
#[derive(Clone)]
pub struct StageClients {
    pub collector: Arc<dyn CollectorClient>,
    pub parser: Arc<dyn ParserClient>,
    pub ai: Arc<dyn AiClient>,
    pub security: Arc<dyn SecurityScanClient>,
}

impl StageClients {
    pub fn new(
        collector: Arc<dyn CollectorClient>,
        parser: Arc<dyn ParserClient>,
        ai: Arc<dyn AiClient>,
        security: Arc<dyn SecurityScanClient>,
    ) -> Self {
        Self {
            collector,
            parser,
            ai,
            security,
        }
    }
}
