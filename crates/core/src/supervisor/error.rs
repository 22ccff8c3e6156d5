//! Error types for process supervision.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised before or while supervising a subprocess.
///
/// A tool that ran and exited non-zero is not an error at this level: it is
/// reported as [`ProcessExit::Exited`](super::ProcessExit::Exited).
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// The executable, or a file it needs such as a jar, does not exist.
    #[error("Tool not found: {}", tool.display())]
    ToolNotFound { tool: PathBuf },

    /// The operating system refused to start the process.
    #[error("Failed to spawn '{}': {source}", program.display())]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error while preparing redirections or waiting for the process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
