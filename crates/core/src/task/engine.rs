//! Cancellable background task with observable progress.
//!
//! A [`Task`] wraps one unit of long-running work. The work receives a
//! [`TaskContext`] through which it reports progress and a status message
//! and observes cancellation. Everything the work reports is published
//! through `tokio::sync::watch` channels, so any number of observers can
//! read the latest values without blocking the work.

use crate::task::error::{TaskError, TaskResult};
use crate::task::state::{abnormal_state, finish_state, TaskState};
use gxp_protocol::task_models::TaskStatus;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug)]
struct Shared {
    id: Uuid,
    label: String,
    state: watch::Sender<TaskState>,
    progress: watch::Sender<Option<f64>>,
    message: watch::Sender<String>,
    cancel: CancellationToken,
}

/// A unit of cancellable background work.
///
/// Lifecycle: Created -> Running -> Succeeded | Failed | Cancelled.
/// Cloning a `Task` yields another handle to the same task.
#[derive(Debug, Clone)]
pub struct Task {
    shared: Arc<Shared>,
}

impl Task {
    /// Create a task in the Created state.
    ///
    /// Nothing runs until [`start`](Self::start) is called; a task that is
    /// never started can be dropped without any side effect.
    pub fn new(label: impl Into<String>) -> Self {
        let (state, _) = watch::channel(TaskState::created());
        let (progress, _) = watch::channel(Some(0.0));
        let (message, _) = watch::channel(String::new());

        Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                label: label.into(),
                state,
                progress,
                message,
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Start running `work` on its own tokio task.
    ///
    /// A panic inside `work` is contained and turns the task Failed. The
    /// value `work` returns decides the terminal state: `Ok(0)` succeeds,
    /// any other code fails with that code, `Err(TaskError::Cancelled)`
    /// cancels, and other errors fail.
    ///
    /// # Errors
    ///
    /// Returns `TaskError::AlreadyStarted` unless the task is in the Created
    /// state.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use gxp_core::task::{Task, TaskError};
    ///
    /// # async fn demo() -> Result<(), TaskError> {
    /// let task = Task::new("count");
    /// task.start(|ctx| async move {
    ///     for i in 0..10 {
    ///         ctx.checkpoint()?;
    ///         ctx.set_progress(f64::from(i) / 10.0);
    ///     }
    ///     Ok(0)
    /// })?;
    /// task.wait().await;
    /// # Ok(())
    /// # }
    /// ```
    pub fn start<F, Fut>(&self, work: F) -> TaskResult<()>
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult<i32>> + Send + 'static,
    {
        let started = self.shared.state.send_if_modified(|state| {
            if state.status == TaskStatus::Created {
                state.status = TaskStatus::Running;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(TaskError::AlreadyStarted);
        }

        tracing::debug!(task_id = %self.id(), label = %self.label(), "task started");

        let ctx = TaskContext {
            shared: Arc::clone(&self.shared),
        };
        let shared = Arc::clone(&self.shared);

        tokio::spawn(async move {
            let terminal = match tokio::spawn(work(ctx)).await {
                Ok(outcome) => finish_state(outcome),
                Err(join_err) => abnormal_state(join_err),
            };
            tracing::debug!(
                task_id = %shared.id,
                status = ?terminal.status,
                result_code = ?terminal.result_code,
                "task finished"
            );
            shared.state.send_replace(terminal);
        });

        Ok(())
    }

    /// Ask the work to stop.
    ///
    /// Callable from any thread at any time. Calling it again, or on a task
    /// that already finished, does nothing.
    pub fn request_cancel(&self) {
        if self.shared.cancel.is_cancelled() || self.state().is_terminal() {
            return;
        }
        tracing::debug!(task_id = %self.id(), "cancellation requested");
        self.shared.cancel.cancel();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    pub fn state(&self) -> TaskState {
        self.shared.state.borrow().clone()
    }

    pub fn status(&self) -> TaskStatus {
        self.shared.state.borrow().status
    }

    /// Latest progress: `None` when indeterminate, otherwise in `0.0..=1.0`.
    pub fn progress(&self) -> Option<f64> {
        *self.shared.progress.borrow()
    }

    pub fn message(&self) -> String {
        self.shared.message.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<TaskState> {
        self.shared.state.subscribe()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<Option<f64>> {
        self.shared.progress.subscribe()
    }

    pub fn subscribe_message(&self) -> watch::Receiver<String> {
        self.shared.message.subscribe()
    }

    /// Wait until the task reaches a terminal state and return it.
    ///
    /// Never resolves for a task that is never started.
    pub async fn wait(&self) -> TaskState {
        let mut rx = self.shared.state.subscribe();
        let state = match rx.wait_for(TaskState::is_terminal).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        state
    }
}

/// Handle given to a task's work.
///
/// The only writer of the task's progress and message.
#[derive(Debug, Clone)]
pub struct TaskContext {
    shared: Arc<Shared>,
}

impl TaskContext {
    pub fn task_id(&self) -> Uuid {
        self.shared.id
    }

    /// Report progress as a fraction. Values are clamped to `0.0..=1.0`; NaN
    /// is reported as indeterminate.
    pub fn set_progress(&self, fraction: f64) {
        let value = if fraction.is_nan() {
            None
        } else {
            Some(fraction.clamp(0.0, 1.0))
        };
        self.shared.progress.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Report that progress cannot currently be estimated.
    pub fn set_indeterminate(&self) {
        self.shared.progress.send_if_modified(|current| current.take().is_some());
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.shared.message.send_replace(message.into());
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Cancellation point.
    ///
    /// # Errors
    ///
    /// Returns `TaskError::Cancelled` once cancellation was requested.
    pub fn checkpoint(&self) -> TaskResult<()> {
        if self.is_cancelled() {
            tracing::debug!(task_id = %self.shared.id, "cancellation observed at checkpoint");
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Token cancelled when cancellation is requested, for handing to a
    /// [`ProcessSupervisor`](crate::supervisor::ProcessSupervisor).
    pub fn cancellation(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }
}
