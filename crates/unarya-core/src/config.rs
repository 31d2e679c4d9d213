//! Orchestrator configuration from the process environment.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{ConfigError, ConfigResult};
use crate::retry::RetryPolicy;
use crate::state::DEFAULT_RETENTION;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_COLLECTOR_PORT: u16 = 50052;
pub const DEFAULT_PARSER_PORT: u16 = 50053;
pub const DEFAULT_AI_PORT: u16 = 6000;
pub const DEFAULT_SECURITY_SCAN_PORT: u16 = 50054;
pub const DEFAULT_ORCHESTRATOR_PORT: u16 = 50051;
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Endpoints and policies for one orchestrator instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub collector_url: String,
    pub parser_url: String,
    pub ai_url: String,
    pub security_url: String,
    /// Port the daemon listens on.
    pub listen_port: u16,
    pub retry: RetryPolicy,
    /// Upper bound on a single stage call.
    pub stage_timeout: Duration,
    /// Runs kept by the state tracker. `0` keeps all.
    pub state_retention: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            collector_url: service_url(DEFAULT_HOST, DEFAULT_COLLECTOR_PORT),
            parser_url: service_url(DEFAULT_HOST, DEFAULT_PARSER_PORT),
            ai_url: service_url(DEFAULT_HOST, DEFAULT_AI_PORT),
            security_url: service_url(DEFAULT_HOST, DEFAULT_SECURITY_SCAN_PORT),
            listen_port: DEFAULT_ORCHESTRATOR_PORT,
            retry: RetryPolicy::default(),
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            state_retention: DEFAULT_RETENTION,
        }
    }
}

fn service_url(host: &str, port: u16) -> String {
    format!("http://{host}:{port}")
}

impl OrchestratorConfig {
    /// Load `.env` if present, then read the process environment.
    ///
    /// Reads:
    /// - SERVICE_HOST (default: "127.0.0.1")
    /// - COLLECTOR_PORT, PARSER_PORT, AI_PORT, SECURITY_SCAN_PORT
    /// - COLLECTOR_URL, PARSER_URL, AI_URL, SECURITY_SCAN_URL (override host and port)
    /// - ORCHESTRATOR_PORT (default: 50051)
    /// - PIPELINE_MAX_RETRIES (default: 3)
    /// - PIPELINE_RETRY_DELAY_MS (default: 1000)
    /// - PIPELINE_STAGE_TIMEOUT_SECS (default: 60)
    /// - PIPELINE_RETRY_APPLICATION_ERRORS (default: false)
    /// - PIPELINE_STATE_RETENTION (default: 256)
    pub fn from_env() -> ConfigResult<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let host = get("SERVICE_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let endpoint = |url_key: &str, port_key: &str, default_port: u16| -> ConfigResult<String> {
            if let Some(url) = get(url_key) {
                return Ok(url.trim_end_matches('/').to_string());
            }
            let port = parse_or(port_key, get(port_key), default_port)?;
            Ok(service_url(&host, port))
        };

        let defaults = RetryPolicy::default();
        let max_retries = parse_or(
            "PIPELINE_MAX_RETRIES",
            get("PIPELINE_MAX_RETRIES"),
            defaults.max_retries,
        )?;
        let delay_ms = parse_or(
            "PIPELINE_RETRY_DELAY_MS",
            get("PIPELINE_RETRY_DELAY_MS"),
            defaults.delay.as_millis() as u64,
        )?;
        let retry_application_errors = parse_bool(
            "PIPELINE_RETRY_APPLICATION_ERRORS",
            get("PIPELINE_RETRY_APPLICATION_ERRORS"),
        )?;
        let timeout_secs = parse_or(
            "PIPELINE_STAGE_TIMEOUT_SECS",
            get("PIPELINE_STAGE_TIMEOUT_SECS"),
            DEFAULT_STAGE_TIMEOUT.as_secs(),
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "PIPELINE_STAGE_TIMEOUT_SECS".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(Self {
            collector_url: endpoint("COLLECTOR_URL", "COLLECTOR_PORT", DEFAULT_COLLECTOR_PORT)?,
            parser_url: endpoint("PARSER_URL", "PARSER_PORT", DEFAULT_PARSER_PORT)?,
            ai_url: endpoint("AI_URL", "AI_PORT", DEFAULT_AI_PORT)?,
            security_url: endpoint(
                "SECURITY_SCAN_URL",
                "SECURITY_SCAN_PORT",
                DEFAULT_SECURITY_SCAN_PORT,
            )?,
            listen_port: parse_or(
                "ORCHESTRATOR_PORT",
                get("ORCHESTRATOR_PORT"),
                DEFAULT_ORCHESTRATOR_PORT,
            )?,
            retry: RetryPolicy::new(max_retries, Duration::from_millis(delay_ms))
                .retry_application_errors(retry_application_errors),
            stage_timeout: Duration::from_secs(timeout_secs),
            state_retention: parse_or(
                "PIPELINE_STATE_RETENTION",
                get("PIPELINE_STATE_RETENTION"),
                DEFAULT_RETENTION,
            )?,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> ConfigResult<T> {
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
    }
}

fn parse_bool(key: &str, raw: Option<String>) -> ConfigResult<bool> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(_) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.unwrap_or_default(),
        }),
    }
}
