//! Error types for the task engine.

use crate::supervisor::SupervisorError;
use gxp_protocol::task_models::FailureKind;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a task or by the work it runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// `start` was called on a task that is no longer in the Created state.
    #[error("Task has already been started")]
    AlreadyStarted,

    /// Cancellation was requested and observed by the work.
    #[error("Task was cancelled")]
    Cancelled,

    /// An external tool, or a file it needs, is missing.
    #[error("Tool not found: {}", tool.display())]
    ToolNotFound { tool: PathBuf },

    /// A step's tool exited with a non-zero code.
    #[error("Step '{step}' exited with code {code}")]
    ToolExit { step: String, code: i32 },

    /// Anything else that went wrong inside the work.
    #[error("{0}")]
    Unexpected(String),
}

impl TaskError {
    /// The tool exit code carried by this error, if any.
    pub fn result_code(&self) -> Option<i32> {
        match self {
            TaskError::ToolExit { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// How a client should classify the failure this error causes.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            TaskError::ToolNotFound { .. } => FailureKind::ToolNotFound,
            TaskError::ToolExit { .. } => FailureKind::ToolExit,
            _ => FailureKind::Unexpected,
        }
    }
}

impl From<SupervisorError> for TaskError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::ToolNotFound { tool } => TaskError::ToolNotFound { tool },
            other => TaskError::Unexpected(other.to_string()),
        }
    }
}

/// Type alias for Result with TaskError.
pub type TaskResult<T> = Result<T, TaskError>;
