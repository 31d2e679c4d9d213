//! JSON bodies exchanged with the stage services.
//!
//! Field names follow the services' snake_case RPC messages. Responses are
//! decoded leniently (missing fields default) and converted into the core
//! artifact types.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use unarya_core::{AiResult, ParsedData, PipelineRequest, ScanResult, StageError};

/// A service method addressed as `{package}.{Service}/{Method}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcMethod {
    pub package: &'static str,
    pub service: &'static str,
    pub method: &'static str,
}

impl RpcMethod {
    pub const fn new(package: &'static str, service: &'static str, method: &'static str) -> Self {
        Self {
            package,
            service,
            method,
        }
    }

    /// Path below the service base URL.
    pub fn path(&self) -> String {
        format!("/{}.{}/{}", self.package, self.service, self.method)
    }
}

impl fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}/{}", self.package, self.service, self.method)
    }
}

pub const COLLECT_FROM_GIT: RpcMethod =
    RpcMethod::new("collector", "CollectorService", "CollectFromGit");
pub const COLLECT_FROM_ARCHIVE: RpcMethod =
    RpcMethod::new("collector", "CollectorService", "CollectFromArchive");
pub const COLLECT_FROM_URL: RpcMethod =
    RpcMethod::new("collector", "CollectorService", "CollectFromURL");
pub const PARSE_CODE: RpcMethod = RpcMethod::new("parser", "ParserService", "ParseCode");
pub const ANALYZE_CODE: RpcMethod = RpcMethod::new("ai", "AIService", "AnalyzeCode");
pub const SCAN_FOR_VULNERABILITIES: RpcMethod =
    RpcMethod::new("security_scan", "SecurityScanService", "ScanForVulnerabilities");

/// Collector request, shared by all three source kinds.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectRequest {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl fmt::Debug for CollectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectRequest")
            .field("url", &self.url)
            .field("branch", &self.branch)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl From<&PipelineRequest> for CollectRequest {
    fn from(request: &PipelineRequest) -> Self {
        Self {
            url: request.source_url.clone(),
            branch: request.branch.clone(),
            token: request.token.clone(),
        }
    }
}

/// Request carrying a materialized source path (parser and scanner).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePathRequest {
    pub source_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseResponse {
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub dependencies: Option<Vec<String>>,
    #[serde(default)]
    pub code_structure: String,
    #[serde(default)]
    pub representation: String,
    #[serde(default)]
    pub metrics: Option<BTreeMap<String, f64>>,
}

impl From<ParseResponse> for ParsedData {
    fn from(resp: ParseResponse) -> Self {
        Self {
            language: resp.language,
            dependencies: resp.dependencies.unwrap_or_default(),
            metrics: resp.metrics.unwrap_or_default(),
            code_structure: resp.code_structure,
            representation: resp.representation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub language: String,
    pub code_structure: String,
}

/// AI service response. `confidence` arrives as a string or a number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub insights: String,
    #[serde(default)]
    pub confidence: serde_json::Value,
    #[serde(default)]
    pub model: Option<String>,
}

pub const UNSPECIFIED_MODEL: &str = "unspecified";

impl From<AnalyzeResponse> for AiResult {
    fn from(resp: AnalyzeResponse) -> Self {
        let confidence_text = match &resp.confidence {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        let mut predictions = BTreeMap::new();
        if let Ok(value) = confidence_text.trim().parse::<f64>() {
            predictions.insert("confidence".to_string(), value);
        }

        let mut insights = BTreeMap::new();
        insights.insert("analysis".to_string(), resp.insights);
        insights.insert("confidence".to_string(), confidence_text);

        Self {
            predictions,
            insights,
            model_used: resp
                .model
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| UNSPECIFIED_MODEL.to_string()),
        }
    }
}

/// Scanner response. `report` is itself a JSON document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResponse {
    #[serde(default)]
    pub report: String,
    #[serde(default, alias = "total_finds")]
    pub total_findings: u32,
}

impl TryFrom<ScanResponse> for ScanResult {
    type Error = StageError;

    fn try_from(resp: ScanResponse) -> Result<Self, Self::Error> {
        let mut scan = if resp.report.trim().is_empty() {
            ScanResult::default()
        } else {
            serde_json::from_str::<ScanResult>(&resp.report)
                .map_err(|e| StageError::Decode(format!("security report: {e}")))?
        };
        if resp.total_findings > 0 {
            scan.total_findings = resp.total_findings;
        }
        Ok(scan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_paths() {
        assert_eq!(
            COLLECT_FROM_GIT.path(),
            "/collector.CollectorService/CollectFromGit"
        );
        assert_eq!(
            SCAN_FOR_VULNERABILITIES.to_string(),
            "security_scan.SecurityScanService/ScanForVulnerabilities"
        );
    }

    #[test]
    fn test_collect_request_redacts_token() {
        let req = CollectRequest {
            url: "https://github.com/unarya/demo".to_string(),
            branch: None,
            token: Some("ghp_secret".to_string()),
        };
        let debug = format!("{req:?}");
        assert!(!debug.contains("ghp_secret"));
        assert!(debug.contains("<redacted>"));

        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(body["token"], "ghp_secret");
        assert!(body.get("branch").is_none());
    }

    #[test]
    fn test_parse_response_with_nulls() {
        let resp: ParseResponse = serde_json::from_value(json!({
            "language": "Go",
            "dependencies": null,
            "code_structure": "{}"
        }))
        .unwrap();
        let parsed = ParsedData::from(resp);
        assert_eq!(parsed.language, "Go");
        assert!(parsed.dependencies.is_empty());
        assert!(parsed.metrics.is_empty());
    }

    #[test]
    fn test_analyze_response_string_confidence() {
        let resp: AnalyzeResponse = serde_json::from_value(json!({
            "insights": "consider splitting handlers",
            "confidence": "0.82"
        }))
        .unwrap();
        let ai = AiResult::from(resp);
        assert_eq!(ai.insights["analysis"], "consider splitting handlers");
        assert_eq!(ai.insights["confidence"], "0.82");
        assert_eq!(ai.predictions["confidence"], 0.82);
        assert_eq!(ai.model_used, UNSPECIFIED_MODEL);
    }

    #[test]
    fn test_analyze_response_numeric_confidence_and_model() {
        let resp: AnalyzeResponse = serde_json::from_value(json!({
            "insights": "ok",
            "confidence": 0.5,
            "model": "ai-model-v2"
        }))
        .unwrap();
        let ai = AiResult::from(resp);
        assert_eq!(ai.predictions["confidence"], 0.5);
        assert_eq!(ai.model_used, "ai-model-v2");
    }

    #[test]
    fn test_analyze_response_unparseable_confidence() {
        let resp: AnalyzeResponse =
            serde_json::from_value(json!({ "insights": "ok", "confidence": "high" })).unwrap();
        let ai = AiResult::from(resp);
        assert!(ai.predictions.is_empty());
        assert_eq!(ai.insights["confidence"], "high");
    }

    #[test]
    fn test_scan_response_decodes_report() {
        let report = json!({
            "secrets": ["api_key=abcdefgh12345"],
            "vulnerabilities": [{ "type": "xss", "severity": "medium" }]
        })
        .to_string();
        let scan = ScanResult::try_from(ScanResponse {
            report,
            total_findings: 2,
        })
        .unwrap();
        assert_eq!(scan.secrets.len(), 1);
        assert_eq!(scan.vulnerabilities[0].severity, "medium");
        assert_eq!(scan.total_findings, 2);
    }

    #[test]
    fn test_scan_response_empty_report() {
        let scan = ScanResult::try_from(ScanResponse::default()).unwrap();
        assert_eq!(scan, ScanResult::default());
    }

    #[test]
    fn test_scan_response_malformed_report() {
        let err = ScanResult::try_from(ScanResponse {
            report: "not json".to_string(),
            total_findings: 0,
        })
        .unwrap_err();
        assert!(matches!(err, StageError::Decode(_)));
    }

    #[test]
    fn test_scan_response_legacy_field_name() {
        let resp: ScanResponse =
            serde_json::from_value(json!({ "report": "", "total_finds": 7 })).unwrap();
        assert_eq!(resp.total_findings, 7);
    }
}
