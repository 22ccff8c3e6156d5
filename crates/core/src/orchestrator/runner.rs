//! Worker side of a stage run.
//!
//! Runs the planned steps strictly in order through a [`ProcessSupervisor`]
//! and reports progress. The worker never touches the project
//! configuration; the manager settles the completion marker afterwards.

use crate::stages::PlannedStep;
use crate::supervisor::{OutputSink, ProcessExit, ProcessSupervisor};
use crate::task::{Task, TaskContext, TaskError, TaskResult};
use gxp_protocol::ipc::Event;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;

/// Execute `steps` in order.
///
/// Cancellation is checked before and after every step and kills a running
/// tool at once. The first step that does not exit with 0 aborts the run.
///
/// # Errors
///
/// - `TaskError::Cancelled` when cancellation was requested
/// - `TaskError::ToolExit` when a step exits non-zero
/// - `TaskError::ToolNotFound` when a tool or jar is missing
pub(crate) async fn run_steps(
    ctx: TaskContext,
    steps: Vec<PlannedStep>,
    sink: Arc<dyn OutputSink>,
) -> TaskResult<i32> {
    let supervisor = ProcessSupervisor::new(ctx.cancellation());
    let total = steps.len();

    for (index, step) in steps.into_iter().enumerate() {
        ctx.checkpoint()?;
        ctx.set_message(format!("Step {}/{}: {}", index + 1, total, step.title));
        ctx.set_progress(step.start);

        let invocation = step.invocation.clone().with_sink(Arc::clone(&sink));
        tracing::info!(
            task_id = %ctx.task_id(),
            step = %step.title,
            command = %invocation.command_line(),
            "running step"
        );

        match supervisor.execute(&invocation).await? {
            ProcessExit::Exited(0) => {}
            ProcessExit::Exited(code) => {
                tracing::warn!(task_id = %ctx.task_id(), step = %step.title, code, "step failed");
                return Err(TaskError::ToolExit {
                    step: step.title,
                    code,
                });
            }
            ProcessExit::Killed => return Err(TaskError::Cancelled),
        }

        ctx.set_progress(step.end());
        ctx.checkpoint()?;
    }

    ctx.set_progress(1.0);
    ctx.set_message("Finished");
    Ok(0)
}

/// Relay progress and message changes of `task` as events until the task
/// reaches a terminal state.
///
/// Subscribes immediately, so no change made after this call is missed.
/// Intermediate values may be skipped; the last value before the end is
/// always sent.
pub(crate) fn forward_updates(
    task: &Task,
    events_tx: Sender<Event>,
) -> impl Future<Output = ()> + Send + 'static {
    let task_id = task.id();
    let mut state = task.subscribe_state();
    let mut progress = task.subscribe_progress();
    let mut message = task.subscribe_message();

    async move {
        while !state.borrow().is_terminal() {
            tokio::select! {
                changed = progress.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let value = *progress.borrow_and_update();
                    let _ = events_tx.send(Event::TaskProgress { task_id, progress: value }).await;
                }
                changed = message.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let value = message.borrow_and_update().clone();
                    let _ = events_tx.send(Event::TaskMessage { task_id, message: value }).await;
                }
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    state.borrow_and_update();
                }
            }
        }

        if progress.has_changed().unwrap_or(false) {
            let value = *progress.borrow_and_update();
            let _ = events_tx
                .send(Event::TaskProgress {
                    task_id,
                    progress: value,
                })
                .await;
        }
        if message.has_changed().unwrap_or(false) {
            let value = message.borrow_and_update().clone();
            let _ = events_tx
                .send(Event::TaskMessage {
                    task_id,
                    message: value,
                })
                .await;
        }
    }
}
