//! Task state transitions.
//!
//! Pure functions mapping the end of a task's work to its terminal state.
//! The engine applies them; keeping them here makes the result-code
//! contract testable without running anything.

use crate::task::error::TaskError;
use gxp_protocol::task_models::{FailureKind, TaskStatus};
use tokio::task::JoinError;

/// Observable state of a task apart from progress and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskState {
    pub status: TaskStatus,

    /// `Some(0)` when Succeeded; the tool exit code when a tool failed.
    pub result_code: Option<i32>,

    /// Human-readable reason for a Failed or Cancelled task.
    pub detail: Option<String>,

    /// Set exactly when the task is Failed.
    pub failure: Option<FailureKind>,
}

impl TaskState {
    /// State of a freshly created task.
    pub fn created() -> Self {
        Self {
            status: TaskStatus::Created,
            result_code: None,
            detail: None,
            failure: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn succeeded() -> Self {
        Self {
            status: TaskStatus::Succeeded,
            result_code: Some(0),
            detail: None,
            failure: None,
        }
    }

    fn failed(kind: FailureKind, result_code: Option<i32>, detail: String) -> Self {
        Self {
            status: TaskStatus::Failed,
            result_code,
            detail: Some(detail),
            failure: Some(kind),
        }
    }

    fn cancelled() -> Self {
        Self {
            status: TaskStatus::Cancelled,
            result_code: None,
            detail: Some(TaskError::Cancelled.to_string()),
            failure: None,
        }
    }
}

/// Map the value returned by a task's work to its terminal state.
///
/// # Arguments
///
/// * `outcome` - What the work returned: `Ok(0)` means success, any other
///   code is a failure carrying that code.
pub fn finish_state(outcome: Result<i32, TaskError>) -> TaskState {
    match outcome {
        Ok(0) => TaskState::succeeded(),
        Ok(code) => TaskState::failed(
            FailureKind::ToolExit,
            Some(code),
            format!("Exited with code {code}"),
        ),
        Err(TaskError::Cancelled) => TaskState::cancelled(),
        Err(err) => TaskState::failed(err.failure_kind(), err.result_code(), err.to_string()),
    }
}

/// Terminal state of a task whose worker did not return normally.
///
/// A panic becomes Failed; an aborted worker counts as cancelled.
pub fn abnormal_state(err: JoinError) -> TaskState {
    if err.is_panic() {
        TaskState::failed(
            FailureKind::Unexpected,
            None,
            "Task worker panicked".to_string(),
        )
    } else {
        TaskState::cancelled()
    }
}
