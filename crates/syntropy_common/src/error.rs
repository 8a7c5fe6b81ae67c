//! Error types shared across Syntropy crates.

use crate::setup::SetupStep;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChecksumError {
    #[error("YAML serialization failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// A probe could not fulfil its contract at all. Findings are never errors.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("{probe} probe failed: {message}")]
    Failed { probe: String, message: String },

    #[error("{probe} probe panicked or was aborted: {message}")]
    Aborted { probe: String, message: String },
}

impl ProbeError {
    pub fn failed(probe: impl Into<String>, message: impl ToString) -> Self {
        ProbeError::Failed {
            probe: probe.into(),
            message: message.to_string(),
        }
    }

    pub fn probe(&self) -> &str {
        match self {
            ProbeError::Failed { probe, .. } | ProbeError::Aborted { probe, .. } => probe,
        }
    }
}

/// Errors raised by the setup orchestrator outside of step execution
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("a setup already exists at {path}; pass force=true to overwrite it")]
    SetupExists { path: String },

    #[error("step '{step}' failed: {message}")]
    StepFailed { step: SetupStep, message: String },

    #[error("could not archive the existing setup: {0}")]
    Backup(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SetupError {
    /// Stable machine code surfaced at the HTTP edge
    pub fn code(&self) -> &'static str {
        match self {
            SetupError::SetupExists { .. } => "SETUP_EXISTS",
            SetupError::StepFailed { .. } => "SETUP_STEP_FAILED",
            SetupError::Backup(_) => "BACKUP_FAILED",
            SetupError::Io(_) => "IO_ERROR",
        }
    }
}

/// Backup persistence errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("backup '{0}' not found")]
    NotFound(String),

    #[error("backup '{0}' already exists")]
    Duplicate(String),

    #[error("backup '{id}' is corrupt: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("cannot restore to {path}: {reason}")]
    InvalidTarget { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<ChecksumError> for StoreError {
    fn from(err: ChecksumError) -> Self {
        match err {
            ChecksumError::Yaml(e) => StoreError::Yaml(e),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template '{0}' not found")]
    NotFound(String),

    #[error("missing required parameter '{0}'")]
    MissingParameter(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_exists_code() {
        let err = SetupError::SetupExists {
            path: "/tmp/x".to_string(),
        };
        assert_eq!(err.code(), "SETUP_EXISTS");
        assert!(err.to_string().contains("/tmp/x"));
    }

    #[test]
    fn test_probe_error_names_probe() {
        let err = ProbeError::failed("security", "no RNG");
        assert_eq!(err.probe(), "security");
        assert_eq!(err.to_string(), "security probe failed: no RNG");
    }
}
