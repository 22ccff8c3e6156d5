//! Error types for the stage orchestrator.

use crate::project::ProjectConfigError;
use crate::task::TaskError;
use thiserror::Error;

/// Reasons a stage could not be started.
///
/// Failures of a running stage are not errors at this level; they end up in
/// the stage's [`StageOutcome`](super::StageOutcome).
#[derive(Error, Debug)]
pub enum StageError {
    /// No stage with this code exists.
    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    /// Parameters are missing or invalid. Lists every offending name.
    #[error("Missing or invalid parameters: {}", missing.join(", "))]
    Validation { missing: Vec<String> },

    /// The same stage is already running for this project.
    #[error("Stage '{stage}' is already running for project {project}")]
    AlreadyRunning { project: String, stage: String },

    #[error(transparent)]
    Project(#[from] ProjectConfigError),

    #[error("Failed to start task: {0}")]
    Task(#[from] TaskError),
}

/// Type alias for Result with StageError.
pub type StageResult<T> = Result<T, StageError>;
