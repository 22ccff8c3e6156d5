//! The project configuration store.

use crate::project::error::{ProjectConfigError, ProjectResult};
use crate::project::properties;
use gxp_protocol::stage_models::{CompletionStatus, StageCode};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Name of the configuration file inside a project directory.
pub const PROJECT_FILE: &str = "project.properties";

/// Keys written by form submission for the project inputs.
pub mod keys {
    pub const FORWARD: &str = "forward";
    pub const REVERSE: &str = "reverse";
    pub const GENOME: &str = "genome";
    pub const BAM: &str = "bam";
    pub const VCF: &str = "vcf";
    pub const MIST: &str = "mist";
    pub const RECAL_BAM: &str = "recal_bam";

    /// Keys copied from the project configuration into stage parameters.
    pub const INPUT_KEYS: &[&str] = &[FORWARD, REVERSE, GENOME, BAM, VCF, MIST, RECAL_BAM];
}

/// String-to-string configuration of one project, persisted on every change.
///
/// Writes replace the whole file atomically (temporary file + rename), so a
/// reader never observes a half-written file. There is no transaction log:
/// the last writer wins.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl ProjectConfig {
    /// Open the configuration of the project rooted at `dir`.
    ///
    /// A project without a configuration file starts empty; the file is
    /// created on the first change.
    pub fn open(dir: &Path) -> ProjectResult<Self> {
        if !dir.is_dir() {
            return Err(ProjectConfigError::MissingDirectory(dir.to_path_buf()));
        }
        Self::load(&dir.join(PROJECT_FILE))
    }

    /// Load a configuration file, or start empty if it does not exist.
    pub fn load(path: &Path) -> ProjectResult<Self> {
        let values = match std::fs::read_to_string(path) {
            Ok(content) => properties::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(ProjectConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            values,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Set a value and persist the file.
    ///
    /// On error the configuration is left as it was.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> ProjectResult<()> {
        let mut values = self.values.clone();
        values.insert(key.into(), value.into());
        self.commit(values)
    }

    /// Set several values and persist once, as a form submission does.
    pub fn set_all<I, K, V>(&mut self, entries: I) -> ProjectResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut values = self.values.clone();
        values.extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        self.commit(values)
    }

    /// Remove a value. The file is only rewritten when the key existed.
    pub fn remove(&mut self, key: &str) -> ProjectResult<Option<String>> {
        let mut values = self.values.clone();
        let previous = values.remove(key);
        if previous.is_some() {
            self.commit(values)?;
        }
        Ok(previous)
    }

    /// Completion status of a stage, derived from its marker key.
    pub fn completion(&self, stage: &StageCode) -> CompletionStatus {
        match self.get(&stage.marker_key()) {
            Some(date) => CompletionStatus::Completed(date.to_string()),
            None => CompletionStatus::Pending,
        }
    }

    /// Record a successful run of `stage`.
    pub fn mark_completed(&mut self, stage: &StageCode, timestamp: &str) -> ProjectResult<()> {
        self.set(stage.marker_key(), timestamp)
    }

    /// Remove any completion marker of `stage`. Returns whether one existed.
    pub fn revoke_completion(&mut self, stage: &StageCode) -> ProjectResult<bool> {
        Ok(self.remove(&stage.marker_key())?.is_some())
    }

    /// Rewrite the backing file with the current contents.
    pub fn save(&self) -> ProjectResult<()> {
        self.write_file(&self.values)
    }

    /// Persist `values`, then make them current. Memory and file never
    /// disagree after a failed write.
    fn commit(&mut self, values: BTreeMap<String, String>) -> ProjectResult<()> {
        self.write_file(&values)?;
        self.values = values;
        Ok(())
    }

    fn write_file(&self, values: &BTreeMap<String, String>) -> ProjectResult<()> {
        let write_err = |source| ProjectConfigError::Write {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(properties::render(values).as_bytes())
            .map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}
