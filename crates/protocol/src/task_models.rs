//! Runtime task state models.
//!
//! This module defines the structures for tracking the state of a running
//! stage task as seen by a UI client.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Represents the lifecycle status of a task.
///
/// The status progresses through these states:
/// Created -> Running -> Succeeded | Failed | Cancelled
///
/// The three last states are terminal: once reached, the task never changes
/// status again.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Task has been created but not started yet.
    Created,

    /// Task is executing on its worker.
    Running,

    /// Every step finished with exit code 0.
    Succeeded,

    /// A step exited non-zero, a tool was missing, or an unexpected error
    /// occurred.
    Failed,

    /// The user requested cancellation.
    Cancelled,
}

impl TaskStatus {
    /// Whether this status is final.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Why a task ended Failed, so clients need not parse the error text.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// A tool executable or jar is not installed where settings point.
    ToolNotFound,

    /// A tool ran and exited non-zero; the result code holds its exit code.
    ToolExit,

    /// Every tool succeeded but the completion marker could not be saved.
    CompletionNotRecorded,

    /// Anything else, including a panicking worker.
    Unexpected,
}

/// Point-in-time view of a task, suitable for rendering a progress bar.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct TaskSnapshot {
    /// Unique identifier of the task.
    #[ts(type = "string")]
    pub id: Uuid,

    /// Project the task belongs to (the project directory).
    pub project: String,

    /// Stage code, e.g. `align`.
    pub stage: String,

    /// Current status.
    pub status: TaskStatus,

    /// Fraction done in `0.0..=1.0`, or `None` when indeterminate.
    pub progress: Option<f64>,

    /// Latest human-readable status message.
    pub message: String,

    /// Result code: `0` on success, the failing step's exit code on a tool
    /// failure. Absent for every other status.
    pub result_code: Option<i32>,
}
