//! Errors of the project configuration store.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectConfigError {
    #[error("Project directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("Cannot read project file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Writing the temp file or renaming it over the project file failed.
    #[error("Cannot save project file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot scan {path} for projects: {source}")]
    DirectoryWalk {
        path: PathBuf,
        source: walkdir::Error,
    },
}

pub type ProjectResult<T> = Result<T, ProjectConfigError>;
