//! Registry handing out one shared handle per project.
//!
//! All writers of a project configuration go through the same
//! `tokio::sync::Mutex`, which serialises file writes per project.

use crate::project::error::{ProjectConfigError, ProjectResult};
use crate::project::store::{ProjectConfig, PROJECT_FILE};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use walkdir::WalkDir;

/// Shared, lockable access to one project's configuration.
#[derive(Debug, Clone)]
pub struct ProjectHandle {
    dir: PathBuf,
    config: Arc<Mutex<ProjectConfig>>,
}

impl ProjectHandle {
    /// Canonical project directory. Also the project's identity.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Display name used in events and logs.
    pub fn name(&self) -> String {
        self.dir.display().to_string()
    }

    /// Lock the configuration for reading or writing.
    pub async fn lock(&self) -> MutexGuard<'_, ProjectConfig> {
        self.config.lock().await
    }

    /// Clone of the current configuration contents.
    pub async fn snapshot(&self) -> ProjectConfig {
        self.config.lock().await.clone()
    }
}

/// Keeps one [`ProjectHandle`] per project directory.
#[derive(Debug, Default)]
pub struct ProjectRegistry {
    projects: Mutex<HashMap<PathBuf, ProjectHandle>>,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a project, loading its configuration on first access.
    ///
    /// Opening the same directory twice (through any path spelling) returns
    /// handles sharing one lock.
    pub async fn open(&self, dir: &Path) -> ProjectResult<ProjectHandle> {
        let canonical = dir
            .canonicalize()
            .map_err(|_| ProjectConfigError::MissingDirectory(dir.to_path_buf()))?;

        let mut projects = self.projects.lock().await;
        if let Some(handle) = projects.get(&canonical) {
            return Ok(handle.clone());
        }

        let config = ProjectConfig::open(&canonical)?;
        let handle = ProjectHandle {
            dir: canonical.clone(),
            config: Arc::new(Mutex::new(config)),
        };
        projects.insert(canonical, handle.clone());
        tracing::debug!(project = %handle.name(), "opened project");
        Ok(handle)
    }

    /// Number of projects opened so far.
    pub async fn len(&self) -> usize {
        self.projects.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.projects.lock().await.is_empty()
    }
}

/// Find project directories below `root`.
///
/// A project directory is any directory containing a project configuration
/// file. Results are sorted.
pub fn discover_projects(root: &Path) -> ProjectResult<Vec<PathBuf>> {
    let mut found = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|source| ProjectConfigError::DirectoryWalk {
            path: root.to_path_buf(),
            source,
        })?;

        if entry.file_type().is_file() && entry.file_name() == PROJECT_FILE {
            if let Some(parent) = entry.path().parent() {
                found.push(parent.to_path_buf());
            }
        }
    }

    found.sort();
    Ok(found)
}
