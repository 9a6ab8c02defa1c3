//! Error Handling
//!
//! Error type definitions used in milisman

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error types for milisman
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration validation error: {0}")]
    ConfigValidation(String),

    #[error("Failed to read config file {}: {source}", .path.display())]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to fetch config file {url}: {source}")]
    FetchConfig {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to fetch config file {url}: server responded with {status}")]
    FetchStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to decode config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse config file: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Failed to get github context: {0}")]
    MissingContext(String),

    #[error("Invalid repository format: {0} (expected 'owner/repo')")]
    InvalidRepositoryFormat(String),

    #[error("GITHUB_TOKEN is not set")]
    MissingToken,

    #[error("Failed to create GitHub client: {0}")]
    ClientSetup(String),

    #[error("GitHub API error: {0}")]
    GitHubApi(#[from] octocrab::Error),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new configuration validation error
    pub fn config_validation<S: Into<String>>(message: S) -> Self {
        Error::ConfigValidation(message.into())
    }

    /// Create a new missing context error
    pub fn missing_context<S: Into<String>>(message: S) -> Self {
        Error::MissingContext(message.into())
    }

    /// Whether the error was raised before any remote mutation could happen
    pub fn is_preflight(&self) -> bool {
        !matches!(self, Error::GitHubApi(_) | Error::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation_message() {
        let err = Error::config_validation("missing configfile");
        assert_eq!(
            err.to_string(),
            "Configuration validation error: missing configfile"
        );
    }

    #[test]
    fn test_read_config_message_names_path() {
        let err = Error::ReadConfig {
            path: PathBuf::from("/etc/milisman.yaml"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/etc/milisman.yaml"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_timeout_message() {
        let err = Error::Timeout {
            operation: "create milestone v1.0".to_string(),
            timeout: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "create milestone v1.0 timed out after 250ms");
    }

    #[test]
    fn test_preflight_classification() {
        assert!(Error::MissingToken.is_preflight());
        assert!(Error::missing_context("no repository").is_preflight());
        assert!(Error::ClientSetup("invalid base uri".to_string()).is_preflight());
        assert!(!Error::Timeout {
            operation: "create label bug".to_string(),
            timeout: Duration::from_secs(5),
        }
        .is_preflight());
    }
}
