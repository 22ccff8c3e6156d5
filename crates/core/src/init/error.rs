//! Error types for `gxp init`.

use std::path::PathBuf;
use thiserror::Error;

pub type InitResult<T> = Result<T, InitError>;

/// Why the settings or project template could not be written.
#[derive(Debug, Error)]
pub enum InitError {
    /// Refusing to replace an existing settings or project file.
    #[error("{} already exists. Use --force to overwrite.", .0.display())]
    FileExists(PathBuf),

    /// The named template is not embedded in the binary.
    #[error("No embedded template named '{0}'")]
    TemplateNotFound(String),

    #[error("Cannot create {}: {source}", path.display())]
    DirectoryCreate {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot write {}: {source}", path.display())]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },
}
