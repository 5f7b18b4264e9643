//! Error types shared across crates.

use serde::{Deserialize, Serialize};

/// Classification of a single task failure, recorded on the result slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskErrorKind {
    /// Missing credential or unknown model/endpoint mapping.
    Configuration,
    /// Submit rejected or malformed response.
    Protocol,
    /// Poll budget exhausted or the per-task timer fired first.
    Timeout,
    /// The provider reported a terminal failure.
    Generation,
    /// The artifact could not be stored.
    Persistence,
    /// The task itself panicked or was lost.
    Internal,
}

/// Failure of one task. Never escapes the task boundary in the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Configuration, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Protocol, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Timeout, message)
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Generation, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(TaskErrorKind::Internal, message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job store error: {0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("persist error: {0}")]
    Other(String),
    #[error("download failed: {0}")]
    Download(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PersistError> for TaskError {
    fn from(e: PersistError) -> Self {
        TaskError::new(TaskErrorKind::Persistence, e.to_string())
    }
}
