//! Typed outputs of the four pipeline stages.
//!
//! Each artifact is produced once per run by its stage adapter and consumed
//! by later stages or by the aggregator.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Source tree materialized by the collector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectedSource {
    /// Path of the materialized source tree, shared by parser and scanner.
    pub path: String,
    #[serde(default)]
    pub message: String,
}

/// Parser output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParsedData {
    pub language: String,
    pub dependencies: Vec<String>,
    /// Structural and complexity metrics (`files`, `complexity`, ...).
    pub metrics: BTreeMap<String, f64>,
    /// Opaque serialized structure handed to the AI stage.
    pub code_structure: String,
    /// Encoding of `code_structure` (e.g. `json`).
    pub representation: String,
}

/// AI inference output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AiResult {
    pub predictions: BTreeMap<String, f64>,
    pub insights: BTreeMap<String, String>,
    pub model_used: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FindingRepr<T> {
    Detailed(T),
    Bare(String),
}

/// Scanners emit either structured findings or bare description strings,
/// and `null` for empty lists.
fn findings<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + From<String>,
{
    let items = Option::<Vec<FindingRepr<T>>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(items
        .into_iter()
        .map(|item| match item {
            FindingRepr::Detailed(finding) => finding,
            FindingRepr::Bare(text) => T::from(text),
        })
        .collect())
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    #[serde(default, alias = "File")]
    pub file: String,
    #[serde(default, alias = "Line")]
    pub line: u32,
    #[serde(default, alias = "Col")]
    pub col: u32,
}

/// A code-level vulnerability.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vulnerability {
    #[serde(default, alias = "Type", alias = "type")]
    pub kind: String,
    /// `critical`, `high`, `medium` or `low`.
    #[serde(default, alias = "Severity")]
    pub severity: String,
    #[serde(default, alias = "Location")]
    pub location: Option<Location>,
    #[serde(default, alias = "Description")]
    pub description: String,
    #[serde(default, alias = "Remediation")]
    pub remediation: String,
}

impl Vulnerability {
    pub fn with_severity(severity: impl Into<String>) -> Self {
        Self {
            severity: severity.into(),
            ..Self::default()
        }
    }
}

// Bare-string vulnerabilities come from pattern matches, which the scanner
// ranks as high severity.
impl From<String> for Vulnerability {
    fn from(description: String) -> Self {
        Self {
            kind: "pattern".to_string(),
            severity: "high".to_string(),
            description,
            ..Self::default()
        }
    }
}

/// A hardcoded secret.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SecretFinding {
    #[serde(default, alias = "Type", alias = "type")]
    pub kind: String,
    #[serde(default, alias = "Severity")]
    pub severity: String,
    #[serde(default, alias = "FilePath")]
    pub file_path: String,
    #[serde(default, alias = "Line")]
    pub line: u32,
    #[serde(default, alias = "Entropy")]
    pub entropy: f64,
    #[serde(default, alias = "Description")]
    pub description: String,
}

impl From<String> for SecretFinding {
    fn from(description: String) -> Self {
        Self {
            description,
            ..Self::default()
        }
    }
}

/// A vulnerable or outdated dependency.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DependencyIssue {
    #[serde(default, alias = "PackageName")]
    pub package_name: String,
    #[serde(default, alias = "Version")]
    pub version: String,
    #[serde(default, alias = "CVE")]
    pub cve: String,
    #[serde(default, alias = "Severity")]
    pub severity: String,
    #[serde(default, alias = "Description")]
    pub description: String,
    #[serde(default, alias = "FixedIn")]
    pub fixed_in: String,
}

impl From<String> for DependencyIssue {
    fn from(description: String) -> Self {
        Self {
            description,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComplianceRule {
    #[serde(default, alias = "ID")]
    pub id: String,
    #[serde(default, alias = "Description")]
    pub description: String,
    #[serde(default, alias = "Severity")]
    pub severity: String,
    #[serde(default, alias = "Recommendation")]
    pub recommendation: String,
}

impl From<String> for ComplianceRule {
    fn from(id: String) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComplianceResult {
    #[serde(default, alias = "PassedRules", deserialize_with = "null_as_default")]
    pub passed_rules: Vec<String>,
    #[serde(default, alias = "FailedRules", deserialize_with = "findings")]
    pub failed_rules: Vec<ComplianceRule>,
    #[serde(default, alias = "Warnings", deserialize_with = "null_as_default")]
    pub warnings: Vec<String>,
    #[serde(default, alias = "PolicyVersion")]
    pub policy_version: String,
}

/// Security scanner output, decoded from the scanner's JSON report.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScanResult {
    #[serde(default, alias = "Vulnerabilities", deserialize_with = "findings")]
    pub vulnerabilities: Vec<Vulnerability>,

    #[serde(default, alias = "Secrets", deserialize_with = "findings")]
    pub secrets: Vec<SecretFinding>,

    #[serde(
        default,
        alias = "Dependencies",
        alias = "dependencies",
        deserialize_with = "findings"
    )]
    pub dependency_issues: Vec<DependencyIssue>,

    #[serde(default, alias = "Compliance", deserialize_with = "null_as_default")]
    pub compliance: ComplianceResult,

    /// Risk figure computed by the scanner itself. Informational only; the
    /// aggregator derives its own score.
    #[serde(default, alias = "RiskScore", alias = "risk_score")]
    pub reported_risk: f64,

    #[serde(default)]
    pub total_findings: u32,
}
