//! Stage manager coordinating stage runs across projects.
//!
//! The StageManager is the central orchestrator for all stage executions.
//! It validates and plans stages, keeps a registry of active runs keyed by
//! (project, stage), and settles each run's completion marker in the
//! project configuration once the run has ended.

use crate::orchestrator::error::{StageError, StageResult};
use crate::orchestrator::handle::{StageHandle, StageOutcome};
use crate::orchestrator::runner::{forward_updates, run_steps};
use crate::project::ProjectHandle;
use crate::stages::{
    default_policy, GenomeIndexPolicy, StageCatalog, StageParams, StagePlan, StepContext,
};
use crate::supervisor::{EventSink, FileSink, OutputSink, TeeSink};
use crate::task::{Task, TaskState};
use gxp_protocol::ipc::Event;
use gxp_protocol::settings_models::Settings;
use gxp_protocol::stage_models::StageCode;
use gxp_protocol::task_models::{FailureKind, TaskSnapshot, TaskStatus};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Format of the timestamp stored in completion markers.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

type ActiveKey = (PathBuf, StageCode);
type ActiveRuns = Arc<Mutex<HashMap<ActiveKey, StageHandle>>>;

/// Manages all active stage runs.
///
/// The StageManager provides a centralized interface for:
/// - Validating and starting stages
/// - Cancelling runs
/// - Querying run state
pub struct StageManager {
    catalog: Arc<StageCatalog>,
    settings: Arc<Settings>,
    index_policy: Arc<dyn GenomeIndexPolicy>,

    /// Registry of runs that have not been finalised yet.
    active: ActiveRuns,

    /// Channel for sending events to the UI.
    events_tx: mpsc::Sender<Event>,
}

impl StageManager {
    /// Create a StageManager with the standard stages and the default
    /// genome index policy.
    ///
    /// # Arguments
    ///
    /// * `settings` - Tool locations and shared references
    /// * `events_tx` - Channel for sending events to the UI
    pub fn new(settings: Settings, events_tx: mpsc::Sender<Event>) -> Self {
        Self {
            catalog: Arc::new(StageCatalog::standard()),
            settings: Arc::new(settings),
            index_policy: default_policy(),
            active: Arc::new(Mutex::new(HashMap::new())),
            events_tx,
        }
    }

    /// Replace the set of runnable stages.
    pub fn with_catalog(mut self, catalog: StageCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    /// Replace the policy deciding whether alignment must index the genome.
    pub fn with_index_policy(mut self, policy: Arc<dyn GenomeIndexPolicy>) -> Self {
        self.index_policy = policy;
        self
    }

    pub fn catalog(&self) -> &StageCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Validate `params` and build the plan of a stage without running it.
    ///
    /// Dropping the returned [`PreparedStage`] has no side effect.
    ///
    /// # Errors
    ///
    /// - `UnknownStage` if `code` is not in the catalog
    /// - `Validation` listing every missing or invalid parameter
    pub fn prepare_stage(
        &self,
        project: &ProjectHandle,
        code: &str,
        params: StageParams,
    ) -> StageResult<PreparedStage> {
        let descriptor = self
            .catalog
            .get(code)
            .ok_or_else(|| StageError::UnknownStage(code.to_string()))?;

        descriptor
            .validate(&params)
            .map_err(|missing| StageError::Validation { missing })?;

        let ctx = StepContext {
            params: &params,
            settings: &self.settings,
            index_policy: self.index_policy.as_ref(),
        };
        let plan = descriptor
            .plan(&ctx)
            .map_err(|missing| StageError::Validation { missing })?;

        Ok(PreparedStage {
            project: project.clone(),
            stage: descriptor.code(),
            plan,
            active: Arc::clone(&self.active),
            events_tx: self.events_tx.clone(),
        })
    }

    /// Validate, plan and start a stage in the background.
    ///
    /// Returns as soon as the run is registered; progress, output and the
    /// terminal state are reported through the events channel and the
    /// returned handle.
    ///
    /// # Errors
    ///
    /// - `UnknownStage` / `Validation` as for [`prepare_stage`](Self::prepare_stage);
    ///   no task is created in that case
    /// - `AlreadyRunning` if the stage is running for this project
    pub async fn start_stage(
        &self,
        project: &ProjectHandle,
        code: &str,
        params: StageParams,
    ) -> StageResult<StageHandle> {
        match self.prepare_stage(project, code, params) {
            Ok(prepared) => prepared.start().await,
            Err(e) => {
                tracing::warn!(project = %project.name(), stage = code, error = %e, "stage rejected");
                Err(e)
            }
        }
    }

    /// Get a handle to an active run.
    pub async fn get(&self, task_id: Uuid) -> Option<StageHandle> {
        let active = self.active.lock().await;
        active.values().find(|h| h.task_id() == task_id).cloned()
    }

    /// Snapshot of an active run.
    pub async fn snapshot(&self, task_id: Uuid) -> Option<TaskSnapshot> {
        self.get(task_id).await.map(|handle| handle.snapshot())
    }

    /// Snapshots of all active runs.
    pub async fn active_tasks(&self) -> Vec<TaskSnapshot> {
        let active = self.active.lock().await;
        active.values().map(StageHandle::snapshot).collect()
    }

    /// Whether `stage` is running for the project in `dir`.
    pub async fn is_running(&self, dir: &Path, stage: &str) -> bool {
        let key = (dir.to_path_buf(), StageCode::new(stage));
        self.active.lock().await.contains_key(&key)
    }

    /// Request cancellation of a run.
    ///
    /// Returns false when no active run has this id.
    pub async fn cancel(&self, task_id: Uuid) -> bool {
        match self.get(task_id).await {
            Some(handle) => {
                handle.request_cancel();
                true
            }
            None => false,
        }
    }

    /// Request cancellation of every active run.
    pub async fn cancel_all(&self) {
        let active = self.active.lock().await;
        for handle in active.values() {
            handle.request_cancel();
        }
    }

    /// Cancel every active run and wait until all of them are finalised.
    pub async fn shutdown(&self) {
        let handles: Vec<StageHandle> = {
            let active = self.active.lock().await;
            active.values().cloned().collect()
        };
        for handle in &handles {
            handle.request_cancel();
        }
        for handle in handles {
            handle.wait().await;
        }
    }
}

/// A validated, planned stage run that has not started yet.
#[derive(Debug)]
pub struct PreparedStage {
    project: ProjectHandle,
    stage: StageCode,
    plan: StagePlan,
    active: ActiveRuns,
    events_tx: mpsc::Sender<Event>,
}

impl PreparedStage {
    pub fn stage(&self) -> &StageCode {
        &self.stage
    }

    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    /// Start the run.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRunning` if the same stage is active for the project.
    pub async fn start(self) -> StageResult<StageHandle> {
        let project_name = self.project.name();
        let key: ActiveKey = (self.project.dir().to_path_buf(), self.stage.clone());

        let task = Task::new(format!("{} @ {}", self.stage, project_name));
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let handle = StageHandle::new(
            task.clone(),
            project_name.clone(),
            self.stage.clone(),
            outcome_rx,
        );

        {
            let mut active = self.active.lock().await;
            if active.contains_key(&key) {
                return Err(StageError::AlreadyRunning {
                    project: project_name,
                    stage: self.stage.to_string(),
                });
            }
            active.insert(key.clone(), handle.clone());
        }

        let sink = self.output_sink(task.id()).await;

        tracing::info!(
            task_id = %task.id(),
            project = %project_name,
            stage = %self.stage,
            steps = self.plan.len(),
            "starting stage"
        );
        let _ = self
            .events_tx
            .send(Event::TaskStarted {
                task_id: task.id(),
                project: project_name,
                stage: self.stage.to_string(),
            })
            .await;

        let forwarder = tokio::spawn(forward_updates(&task, self.events_tx.clone()));

        let steps = self.plan.into_steps();
        if let Err(e) = task.start(move |ctx| run_steps(ctx, steps, sink)) {
            forwarder.abort();
            self.active.lock().await.remove(&key);
            return Err(e.into());
        }

        tokio::spawn(finalize(Finalizer {
            task,
            project: self.project,
            stage: self.stage,
            key,
            active: self.active,
            events_tx: self.events_tx,
            outcome_tx,
            forwarder,
        }));

        Ok(handle)
    }

    /// Tool output goes to the UI and to `<project>/<stage>.log`.
    async fn output_sink(&self, task_id: Uuid) -> Arc<dyn OutputSink> {
        let events: Arc<dyn OutputSink> = Arc::new(EventSink::new(task_id, self.events_tx.clone()));
        let log_path = self.project.dir().join(format!("{}.log", self.stage));

        match FileSink::open(&log_path).await {
            Ok(file) => Arc::new(TeeSink::new(vec![events, Arc::new(file)])),
            Err(e) => {
                tracing::warn!(path = %log_path.display(), error = %e, "cannot open stage log");
                events
            }
        }
    }
}

struct Finalizer {
    task: Task,
    project: ProjectHandle,
    stage: StageCode,
    key: ActiveKey,
    active: ActiveRuns,
    events_tx: mpsc::Sender<Event>,
    outcome_tx: watch::Sender<Option<StageOutcome>>,
    forwarder: JoinHandle<()>,
}

/// Settle the completion marker of a finished run, then report the end.
///
/// Success writes `<code>_date`; any other ending removes it. The write
/// happens under the project lock, before the terminal event is sent.
async fn finalize(f: Finalizer) {
    let state = f.task.wait().await;
    if let Err(e) = f.forwarder.await {
        tracing::warn!(error = %e, "update forwarder failed");
    }

    let outcome = settle_marker(&f.project, &f.stage, &state).await;

    f.active.lock().await.remove(&f.key);

    let task_id = f.task.id();
    match outcome.status {
        TaskStatus::Succeeded => {
            tracing::info!(%task_id, stage = %f.stage, "stage succeeded");
        }
        status => {
            tracing::warn!(
                %task_id,
                stage = %f.stage,
                ?status,
                result_code = ?outcome.result_code,
                detail = outcome.detail.as_deref().unwrap_or_default(),
                "stage did not succeed"
            );
        }
    }

    let terminal = match (&outcome.status, &outcome.completed_at) {
        (TaskStatus::Succeeded, Some(completed_at)) => Event::TaskSucceeded {
            task_id,
            completed_at: completed_at.clone(),
        },
        (TaskStatus::Cancelled, _) => Event::TaskCancelled { task_id },
        _ => Event::TaskFailed {
            task_id,
            kind: outcome.failure.unwrap_or(FailureKind::Unexpected),
            result_code: outcome.result_code,
            error: outcome.detail.clone().unwrap_or_default(),
        },
    };
    let _ = f.events_tx.send(terminal).await;

    f.outcome_tx.send_replace(Some(outcome));
}

async fn settle_marker(project: &ProjectHandle, stage: &StageCode, state: &TaskState) -> StageOutcome {
    let mut config = project.lock().await;

    if state.status == TaskStatus::Succeeded {
        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        return match config.mark_completed(stage, &timestamp) {
            Ok(()) => StageOutcome::from_state(state, Some(timestamp)),
            Err(e) => {
                tracing::error!(stage = %stage, error = %e, "failed to record stage completion");
                StageOutcome {
                    status: TaskStatus::Failed,
                    result_code: None,
                    detail: Some(format!("Failed to record completion: {e}")),
                    failure: Some(FailureKind::CompletionNotRecorded),
                    completed_at: None,
                }
            }
        };
    }

    if let Err(e) = config.revoke_completion(stage) {
        tracing::error!(stage = %stage, error = %e, "failed to remove completion marker");
    }
    StageOutcome::from_state(state, None)
}
