use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    /// A job line that cannot be parsed. Listing skips it with a warning.
    #[error("Cannot decode job line {line:?}: {reason}")]
    Decode { line: String, reason: String },

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Job list backend failed: {0}")]
    JobList(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task store error: {0}")]
    Store(#[from] BridgeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SchedulerError {
    pub fn decode(line: &str, reason: impl Into<String>) -> Self {
        Self::Decode {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
