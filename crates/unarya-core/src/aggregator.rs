//! Merges stage outputs into one risk-scored [`FinalResult`].
//!
//! Pure functions: no I/O and no shared state. The completion time is the
//! only input that is not derived from the stage outputs, so
//! [`aggregate_at`] takes it explicitly.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::domain::{AiResult, FinalResult, ParsedData, RiskLevel, ScanResult};

/// Weight of one vulnerability by severity. Matching is exact: `"HIGH"`,
/// `low` and unknown severities count zero.
pub fn severity_weight(severity: &str) -> f64 {
    match severity {
        "critical" => 3.0,
        "high" => 2.0,
        "medium" => 1.0,
        _ => 0.0,
    }
}

/// Composite risk score of a scan.
///
/// `Σ severity weights + 2·secrets + dependency issues
///  − 0.5·passed compliance rules + failed compliance rules`
pub fn risk_score(scan: &ScanResult) -> f64 {
    let mut score: f64 = scan
        .vulnerabilities
        .iter()
        .map(|v| severity_weight(&v.severity))
        .sum();
    score += scan.secrets.len() as f64 * 2.0;
    score += scan.dependency_issues.len() as f64;
    score -= scan.compliance.passed_rules.len() as f64 * 0.5;
    score += scan.compliance.failed_rules.len() as f64;
    score
}

/// Aggregate with the current time as completion time.
pub fn aggregate(parsed: &ParsedData, ai: &AiResult, scan: &ScanResult) -> FinalResult {
    aggregate_at(parsed, ai, scan, Utc::now())
}

/// Aggregate with an explicit completion time. Identical inputs give
/// identical results.
pub fn aggregate_at(
    parsed: &ParsedData,
    ai: &AiResult,
    scan: &ScanResult,
    completed_at: DateTime<Utc>,
) -> FinalResult {
    let score = risk_score(scan);
    let level = RiskLevel::from_score(score);

    let mut insights: BTreeMap<String, String> = ai.insights.clone();
    insights.insert("language".to_string(), parsed.language.clone());
    insights.insert("model".to_string(), ai.model_used.clone());
    insights.insert(
        "dependencies".to_string(),
        parsed.dependencies.len().to_string(),
    );
    for (name, value) in &ai.predictions {
        insights.insert(format!("prediction.{name}"), format!("{value:.2}"));
    }
    insights.insert(
        "security.vulnerabilities".to_string(),
        scan.vulnerabilities.len().to_string(),
    );
    insights.insert("security.secrets".to_string(), scan.secrets.len().to_string());
    insights.insert(
        "security.dependency_issues".to_string(),
        scan.dependency_issues.len().to_string(),
    );
    insights.insert(
        "security.failed_rules".to_string(),
        scan.compliance.failed_rules.len().to_string(),
    );
    insights.insert(
        "security.total_findings".to_string(),
        scan.total_findings.to_string(),
    );

    let summary = format!(
        "{} project analyzed with {}: {} vulnerabilities, {} secrets, {} dependency issues, \
         {} failed compliance rules; risk {} ({:.1})",
        display_or(&parsed.language, "unknown-language"),
        display_or(&ai.model_used, "unknown model"),
        scan.vulnerabilities.len(),
        scan.secrets.len(),
        scan.dependency_issues.len(),
        scan.compliance.failed_rules.len(),
        level,
        score,
    );

    FinalResult {
        summary,
        risk_score: score,
        risk_level: level,
        insights,
        errors: Vec::new(),
        completed_at,
    }
}

fn display_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}
