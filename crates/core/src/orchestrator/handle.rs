//! Caller-side view of a running stage.

use crate::task::{Task, TaskState};
use gxp_protocol::stage_models::StageCode;
use gxp_protocol::task_models::{FailureKind, TaskSnapshot, TaskStatus};
use tokio::sync::watch;
use uuid::Uuid;

/// Final result of a stage run, published once the completion marker has
/// been written or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub status: TaskStatus,
    pub result_code: Option<i32>,
    pub detail: Option<String>,
    pub failure: Option<FailureKind>,
    /// Timestamp written to the completion marker on success.
    pub completed_at: Option<String>,
}

impl StageOutcome {
    pub(crate) fn from_state(state: &TaskState, completed_at: Option<String>) -> Self {
        Self {
            status: state.status,
            result_code: state.result_code,
            detail: state.detail.clone(),
            failure: state.failure,
            completed_at,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }
}

/// Handle to one stage run.
///
/// Cheap to clone; every clone observes the same run.
#[derive(Debug, Clone)]
pub struct StageHandle {
    task: Task,
    project: String,
    stage: StageCode,
    outcome: watch::Receiver<Option<StageOutcome>>,
}

impl StageHandle {
    pub(crate) fn new(
        task: Task,
        project: String,
        stage: StageCode,
        outcome: watch::Receiver<Option<StageOutcome>>,
    ) -> Self {
        Self {
            task,
            project,
            stage,
            outcome,
        }
    }

    pub fn task_id(&self) -> Uuid {
        self.task.id()
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn stage(&self) -> &StageCode {
        &self.stage
    }

    pub(crate) fn task(&self) -> &Task {
        &self.task
    }

    /// Ask the run to stop. A running tool is killed immediately.
    pub fn request_cancel(&self) {
        self.task.request_cancel();
    }

    pub fn status(&self) -> TaskStatus {
        self.task.status()
    }

    pub fn progress(&self) -> Option<f64> {
        self.task.progress()
    }

    pub fn message(&self) -> String {
        self.task.message()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let state = self.task.state();
        TaskSnapshot {
            id: self.task.id(),
            project: self.project.clone(),
            stage: self.stage.to_string(),
            status: state.status,
            progress: self.task.progress(),
            message: self.task.message(),
            result_code: state.result_code,
        }
    }

    /// The published outcome, if the run has been finalised.
    pub fn outcome(&self) -> Option<StageOutcome> {
        self.outcome.borrow().clone()
    }

    /// Wait for the run to end and its completion marker to be settled.
    pub async fn wait(&self) -> StageOutcome {
        let mut rx = self.outcome.clone();
        let published = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        match published {
            Some(outcome) => outcome,
            None => StageOutcome::from_state(&self.task.wait().await, None),
        }
    }
}
