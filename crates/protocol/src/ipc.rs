//! Messages exchanged between a front end and the stage service.
//!
//! Front ends send [`Op`]s and receive [`Event`]s. Progress and message
//! events may be coalesced, so a client can miss intermediate values. The
//! terminal event of every started task is always delivered.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use ts_rs::TS;
use uuid::Uuid;

use crate::task_models::{FailureKind, TaskSnapshot};

/// Requests from a front end. On the wire:
/// ```json
/// {
///   "type": "startStage",
///   "payload": {
///     "project": "/data/projects/sample1",
///     "stage": "align",
///     "params": { "threads": "8" }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Op {
    /// Start a stage for a project.
    ///
    /// `params` overrides values resolved from settings and the project
    /// configuration.
    StartStage {
        project: PathBuf,
        stage: String,
        #[serde(default)]
        params: BTreeMap<String, String>,
    },

    /// Request cancellation of a running task.
    CancelTask {
        #[ts(type = "string")]
        task_id: Uuid,
    },

    /// Request the current snapshot of a task.
    GetTaskSnapshot {
        #[ts(type = "string")]
        task_id: Uuid,
    },

    /// Request snapshots of all active tasks.
    ListActiveTasks,

    /// Cancel every running task and stop serving operations.
    Shutdown,
}

/// Notifications from the stage service.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Event {
    /// A stage task has started running.
    TaskStarted {
        #[ts(type = "string")]
        task_id: Uuid,
        project: String,
        stage: String,
    },

    /// Progress changed. `None` means indeterminate.
    TaskProgress {
        #[ts(type = "string")]
        task_id: Uuid,
        progress: Option<f64>,
    },

    /// Status message changed.
    TaskMessage {
        #[ts(type = "string")]
        task_id: Uuid,
        message: String,
    },

    /// Raw tool output. The UI should append this to its console view.
    TaskOutput {
        #[ts(type = "string")]
        task_id: Uuid,
        content: String,
    },

    /// The task finished successfully and its completion marker was written.
    TaskSucceeded {
        #[ts(type = "string")]
        task_id: Uuid,
        completed_at: String,
    },

    /// The task failed. `result_code` holds the tool exit code when `kind`
    /// is `TOOL_EXIT`.
    TaskFailed {
        #[ts(type = "string")]
        task_id: Uuid,
        kind: FailureKind,
        result_code: Option<i32>,
        error: String,
    },

    /// The task was cancelled by the user.
    TaskCancelled {
        #[ts(type = "string")]
        task_id: Uuid,
    },

    /// A stage could not start because parameters were missing or invalid.
    ValidationFailed {
        project: String,
        stage: String,
        missing: Vec<String>,
    },

    /// A stage could not start for any other reason.
    StageRejected {
        project: String,
        stage: String,
        reason: String,
    },

    /// Reply to `Op::GetTaskSnapshot`.
    TaskSnapshot { snapshot: Option<TaskSnapshot> },

    /// Reply to `Op::ListActiveTasks`.
    ActiveTasks { tasks: Vec<TaskSnapshot> },
}

impl Event {
    /// The task this event refers to, if any.
    pub fn task_id(&self) -> Option<Uuid> {
        match self {
            Event::TaskStarted { task_id, .. }
            | Event::TaskProgress { task_id, .. }
            | Event::TaskMessage { task_id, .. }
            | Event::TaskOutput { task_id, .. }
            | Event::TaskSucceeded { task_id, .. }
            | Event::TaskFailed { task_id, .. }
            | Event::TaskCancelled { task_id } => Some(*task_id),
            Event::TaskSnapshot { snapshot } => snapshot.as_ref().map(|s| s.id),
            Event::ValidationFailed { .. }
            | Event::StageRejected { .. }
            | Event::ActiveTasks { .. } => None,
        }
    }

    /// Whether this event reports the end of a task.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Event::TaskSucceeded { .. } | Event::TaskFailed { .. } | Event::TaskCancelled { .. }
        )
    }
}
