//! Generator writing the initial gxp files.

use crate::config::loader::{settings_path, SETTINGS_DIR};
use crate::init::error::{InitError, InitResult};
use crate::init::templates::{get_template, PROJECT_TEMPLATE, SETTINGS_TEMPLATE};
use crate::project::store::PROJECT_FILE;
use std::fs;
use std::path::{Path, PathBuf};

/// Options for the initialization process.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Directory to initialize.
    pub target_dir: PathBuf,

    /// Overwrite files that already exist.
    pub force: bool,

    /// Also write a `project.properties`, making the directory a project.
    pub project: bool,
}

impl InitOptions {
    /// Settings only, refusing to overwrite.
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
            force: false,
            project: false,
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_project(mut self, project: bool) -> Self {
        self.project = project;
        self
    }
}

/// Generate the gxp files in the target directory.
///
/// Creates the following structure:
/// ```text
/// target_dir/
/// ├── .gxp/
/// │   └── settings.toml
/// └── project.properties (with `project`)
/// ```
///
/// Returns the written paths. Without `force`, an existing target fails
/// the whole call with [`InitError::FileExists`] before anything is written.
pub async fn generate_structure(options: InitOptions) -> InitResult<Vec<PathBuf>> {
    let mut targets = vec![(SETTINGS_TEMPLATE, settings_path(&options.target_dir))];
    if options.project {
        targets.push((PROJECT_TEMPLATE, options.target_dir.join(PROJECT_FILE)));
    }

    if !options.force {
        if let Some((_, existing)) = targets.iter().find(|(_, path)| path.exists()) {
            return Err(InitError::FileExists(existing.clone()));
        }
    }

    let gxp_dir = options.target_dir.join(SETTINGS_DIR);
    fs::create_dir_all(&gxp_dir).map_err(|source| InitError::DirectoryCreate {
        path: gxp_dir.clone(),
        source,
    })?;

    let mut written = Vec::with_capacity(targets.len());
    for (template, path) in targets {
        write_template_file(template, &path)?;
        tracing::debug!(path = %path.display(), "wrote template");
        written.push(path);
    }

    Ok(written)
}

fn write_template_file(template: &str, target_path: &Path) -> InitResult<()> {
    let Some(content) = get_template(template) else {
        return Err(InitError::TemplateNotFound(template.to_string()));
    };

    fs::write(target_path, content).map_err(|source| InitError::FileWrite {
        path: target_path.to_path_buf(),
        source,
    })
}
