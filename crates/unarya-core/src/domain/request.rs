//! Pipeline input and run identity.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::error::{ConfigError, ConfigResult};

/// Where the source tree comes from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Git,
    Archive,
    Url,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Git => "git",
            SourceType::Archive => "archive",
            SourceType::Url => "url",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "git" => Ok(SourceType::Git),
            "archive" => Ok(SourceType::Archive),
            "url" => Ok(SourceType::Url),
            other => Err(ConfigError::UnsupportedSourceType(other.to_string())),
        }
    }
}

const ARCHIVE_SUFFIXES: [&str; 3] = [".zip", ".tar.gz", ".tgz"];

/// A full orchestration request. Immutable once built.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineRequest {
    /// Repository, archive or file URL.
    pub source_url: String,

    /// Branch to check out (git sources only).
    #[serde(default)]
    pub branch: Option<String>,

    /// Access token forwarded to the collector.
    #[serde(default)]
    pub token: Option<String>,

    pub source_type: SourceType,
}

impl std::fmt::Debug for PipelineRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRequest")
            .field("source_url", &self.source_url)
            .field("branch", &self.branch)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("source_type", &self.source_type)
            .finish()
    }
}

impl PipelineRequest {
    /// Create a request with no branch and no token.
    pub fn new(source_url: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            source_url: source_url.into(),
            branch: None,
            token: None,
            source_type,
        }
    }

    /// Build a request from loosely typed input (e.g. the RPC surface).
    pub fn parse(
        source_url: impl Into<String>,
        branch: Option<String>,
        token: Option<String>,
        source_type: &str,
    ) -> ConfigResult<Self> {
        let request = Self {
            source_url: source_url.into(),
            branch: branch.filter(|b| !b.trim().is_empty()),
            token: token.filter(|t| !t.is_empty()),
            source_type: source_type.parse()?,
        };
        request.validate()?;
        Ok(request)
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Check the request before any stage is contacted.
    pub fn validate(&self) -> ConfigResult<()> {
        let url = self.source_url.trim();
        if url.is_empty() {
            return Err(ConfigError::EmptyUrl);
        }

        let invalid = |reason: &str| ConfigError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        if url.contains("..") {
            return Err(invalid("path traversal detected"));
        }

        let is_http = url.starts_with("http://") || url.starts_with("https://");
        match self.source_type {
            SourceType::Git => {
                if !(is_http || url.starts_with("git@") || url.starts_with("ssh://")) {
                    return Err(invalid("invalid URL scheme"));
                }
            }
            SourceType::Archive => {
                if !is_http {
                    return Err(invalid("invalid URL scheme"));
                }
                if !ARCHIVE_SUFFIXES.iter().any(|s| url.ends_with(s)) {
                    return Err(invalid("invalid archive format"));
                }
            }
            SourceType::Url => {
                if !is_http {
                    return Err(invalid("invalid http source"));
                }
            }
        }

        Ok(())
    }
}

/// Identifier of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new random RunId
    pub fn new() -> Self {
        RunId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        RunId(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_parse() {
        assert_eq!("git".parse::<SourceType>().unwrap(), SourceType::Git);
        assert_eq!(" Archive ".parse::<SourceType>().unwrap(), SourceType::Archive);
        assert_eq!("url".parse::<SourceType>().unwrap(), SourceType::Url);
        assert_eq!(
            "svn".parse::<SourceType>(),
            Err(ConfigError::UnsupportedSourceType("svn".into()))
        );
    }

    #[test]
    fn test_empty_url_rejected() {
        let req = PipelineRequest::new("   ", SourceType::Git);
        assert_eq!(req.validate(), Err(ConfigError::EmptyUrl));
    }

    #[test]
    fn test_git_schemes() {
        for url in [
            "https://github.com/unarya/unarya.git",
            "http://gitlab.local/a/b",
            "git@github.com:unarya/unarya.git",
            "ssh://git@host/repo.git",
        ] {
            assert!(PipelineRequest::new(url, SourceType::Git).validate().is_ok(), "{url}");
        }
        assert!(PipelineRequest::new("ftp://host/repo", SourceType::Git)
            .validate()
            .is_err());
    }

    #[test]
    fn test_path_traversal_rejected() {
        let req = PipelineRequest::new("https://host/../etc/passwd", SourceType::Url);
        let err = req.validate().unwrap_err();
        assert!(err.to_string().contains("path traversal"));
    }

    #[test]
    fn test_archive_suffix_required() {
        assert!(PipelineRequest::new("https://host/src.tar.gz", SourceType::Archive)
            .validate()
            .is_ok());
        assert!(PipelineRequest::new("https://host/src.tgz", SourceType::Archive)
            .validate()
            .is_ok());
        let err = PipelineRequest::new("https://host/src.rar", SourceType::Archive)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("invalid archive format"));
    }

    #[test]
    fn test_parse_drops_blank_branch_and_token() {
        let req = PipelineRequest::parse(
            "https://github.com/a/b",
            Some("  ".into()),
            Some(String::new()),
            "git",
        )
        .unwrap();
        assert!(req.branch.is_none());
        assert!(req.token.is_none());
    }

    #[test]
    fn test_debug_redacts_token() {
        let req = PipelineRequest::new("https://github.com/a/b", SourceType::Git)
            .with_token("ghp_supersecret");
        let rendered = format!("{req:?}");
        assert!(!rendered.contains("ghp_supersecret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }
}
