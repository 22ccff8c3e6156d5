//! Op/Event service loop.
//!
//! Serves [`Op`]s from a UI and answers with [`Event`]s. Stage events
//! (progress, output, terminal state) reach the UI through the manager's own
//! events channel; replies to queries use the channel passed here.

use crate::orchestrator::error::StageError;
use crate::orchestrator::manager::StageManager;
use crate::project::ProjectRegistry;
use crate::stages::StageParams;
use anyhow::{Context, Result};
use gxp_protocol::ipc::{Event, Op};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Serve operations until `Op::Shutdown` or until the ops channel closes.
///
/// `Op::Shutdown` cancels every active run and waits for them to be
/// finalised before returning.
///
/// # Errors
///
/// Returns an error if the events channel is closed, since nobody is
/// listening any more.
pub async fn run_service(
    manager: Arc<StageManager>,
    registry: Arc<ProjectRegistry>,
    mut ops_rx: mpsc::Receiver<Op>,
    events_tx: mpsc::Sender<Event>,
) -> Result<()> {
    while let Some(op) = ops_rx.recv().await {
        match op {
            Op::StartStage {
                project,
                stage,
                params,
            } => {
                let handle = match registry.open(&project).await {
                    Ok(handle) => handle,
                    Err(e) => {
                        events_tx
                            .send(Event::StageRejected {
                                project: project.display().to_string(),
                                stage,
                                reason: e.to_string(),
                            })
                            .await
                            .context("events channel closed")?;
                        continue;
                    }
                };

                let mut resolved = StageParams::resolve(manager.settings(), &handle.snapshot().await);
                resolved.extend(params);

                let reply = match manager.start_stage(&handle, &stage, resolved).await {
                    Ok(_) => None,
                    Err(StageError::Validation { missing }) => Some(Event::ValidationFailed {
                        project: handle.name(),
                        stage,
                        missing,
                    }),
                    Err(e) => Some(Event::StageRejected {
                        project: handle.name(),
                        stage,
                        reason: e.to_string(),
                    }),
                };
                if let Some(event) = reply {
                    events_tx.send(event).await.context("events channel closed")?;
                }
            }
            Op::CancelTask { task_id } => {
                if !manager.cancel(task_id).await {
                    tracing::debug!(%task_id, "cancel requested for unknown task");
                }
            }
            Op::GetTaskSnapshot { task_id } => {
                let snapshot = manager.snapshot(task_id).await;
                events_tx
                    .send(Event::TaskSnapshot { snapshot })
                    .await
                    .context("events channel closed")?;
            }
            Op::ListActiveTasks => {
                let tasks = manager.active_tasks().await;
                events_tx
                    .send(Event::ActiveTasks { tasks })
                    .await
                    .context("events channel closed")?;
            }
            Op::Shutdown => {
                tracing::info!("shutting down stage service");
                manager.shutdown().await;
                break;
            }
        }
    }

    Ok(())
}
