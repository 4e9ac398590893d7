use bridge_traits::error::BridgeError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Rejected before any I/O
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The remote refused the configured token
    #[error("Authorization failed: {0}")]
    Unauthorized(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Crawl cancelled")]
    Cancelled,

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No invalid-entry report for configuration {config_id}")]
    ReportNotFound { config_id: String },

    #[error("Background task failed: {0}")]
    Task(String),
}

impl SyncError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Fatal errors abort the run and surface as a non-zero exit status.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Unauthorized(_))
    }
}

impl From<BridgeError> for SyncError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Unauthorized(msg) => Self::Unauthorized(msg),
            other => Self::Provider(other.to_string()),
        }
    }
}

impl From<core_runtime::Error> for SyncError {
    fn from(error: core_runtime::Error) -> Self {
        match error {
            core_runtime::Error::Config(msg) => Self::Config(msg),
            core_runtime::Error::ConfigNotFound(id) => {
                Self::Config(format!("Configuration {} not found", id))
            }
            core_runtime::Error::Settings(e) => e.into(),
            core_runtime::Error::Serialization(e) => Self::Serialization(e),
            core_runtime::Error::Internal(msg) => Self::Provider(msg),
        }
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::Task(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classes() {
        assert!(SyncError::Config("x".into()).is_fatal());
        assert!(SyncError::from(BridgeError::Unauthorized("bad token".into())).is_fatal());
        assert!(!SyncError::from(BridgeError::OperationFailed("timeout".into())).is_fatal());
        assert!(!SyncError::Cancelled.is_fatal());
    }

    #[test]
    fn test_missing_configuration_is_config_error() {
        let err: SyncError = core_runtime::Error::ConfigNotFound("7".into()).into();
        assert!(matches!(err, SyncError::Config(_)));
    }
}
