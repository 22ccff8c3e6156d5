//! Stage parameters and their validation.

use crate::project::store::keys;
use crate::project::ProjectConfig;
use gxp_protocol::settings_models::Settings;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Parameter names, including the project input keys.
pub mod names {
    pub use crate::project::store::keys::*;

    pub const THREADS: &str = "threads";
    pub const DBSNP: &str = "dbsnp";
    pub const MILLS: &str = "mills";
    pub const PHASE1: &str = "phase1";
    pub const ENSEMBL: &str = "ensembl";
    pub const READ_GROUP: &str = "read_group";
    pub const RECALIBRATE: &str = "recalibrate";
    pub const THRESHOLD: &str = "threshold";
    pub const LENGTH: &str = "length";
}

/// Resolved, ordered name-to-value parameter set handed to a stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageParams {
    values: BTreeMap<String, String>,
}

impl StageParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the parameters of a stage run.
    ///
    /// Reference resources and the thread count come from `settings`; the
    /// project's input keys are applied on top, so a project-specific genome
    /// wins over the shared one. Relative paths in the project configuration
    /// are taken relative to the project directory. Callers override
    /// individual values with [`set`](Self::set).
    pub fn resolve(settings: &Settings, project: &ProjectConfig) -> Self {
        let mut params = Self::new();
        params.set(names::THREADS, settings.threads.to_string());

        let references = &settings.references;
        for (name, path) in [
            (names::GENOME, &references.genome),
            (names::DBSNP, &references.dbsnp),
            (names::MILLS, &references.mills),
            (names::PHASE1, &references.phase1),
            (names::ENSEMBL, &references.ensembl),
        ] {
            if let Some(path) = path {
                params.set(name, path.to_string_lossy());
            }
        }

        let project_dir = project.path().parent();
        for key in keys::INPUT_KEYS {
            if let Some(value) = project.get(key) {
                params.set(*key, relative_to(project_dir, value));
            }
        }

        params
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.values.remove(name)
    }

    /// Raw value, possibly empty.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Value with surrounding whitespace removed; blank values count as
    /// absent.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn path(&self, name: &str) -> Option<PathBuf> {
        self.value(name).map(PathBuf::from)
    }

    /// Boolean value, `default` when absent or unparseable.
    pub fn flag(&self, name: &str, default: bool) -> bool {
        self.value(name).and_then(parse_flag).unwrap_or(default)
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
}

impl<K, V> Extend<(K, V)> for StageParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.set(k, v);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for StageParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        params.extend(iter);
        params
    }
}

fn relative_to(base: Option<&Path>, value: &str) -> String {
    let trimmed = value.trim();
    match base {
        Some(base) if !trimmed.is_empty() && Path::new(trimmed).is_relative() => {
            base.join(trimmed).to_string_lossy().into_owned()
        }
        _ => value.to_string(),
    }
}

pub(crate) fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// What a parameter value must look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// An existing file.
    InputFile,
    /// A file to be written; its directory must exist.
    OutputFile,
    /// A positive integer.
    Count,
    /// A boolean such as `true` or `no`.
    Flag,
    /// Free text.
    Text,
}

/// When a parameter must be supplied.
#[derive(Clone, Copy)]
pub enum Requirement {
    Required,
    Optional,
    /// Required when the predicate holds for the other parameters.
    RequiredWhen(fn(&StageParams) -> bool),
}

impl std::fmt::Debug for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Requirement::Required => f.write_str("Required"),
            Requirement::Optional => f.write_str("Optional"),
            Requirement::RequiredWhen(_) => f.write_str("RequiredWhen(..)"),
        }
    }
}

/// Declaration of one stage parameter.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub requirement: Requirement,
}

impl ParamSpec {
    pub const fn required(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            requirement: Requirement::Required,
        }
    }

    pub const fn optional(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            requirement: Requirement::Optional,
        }
    }

    pub const fn required_when(
        name: &'static str,
        kind: ParamKind,
        condition: fn(&StageParams) -> bool,
    ) -> Self {
        Self {
            name,
            kind,
            requirement: Requirement::RequiredWhen(condition),
        }
    }

    fn is_required(&self, params: &StageParams) -> bool {
        match self.requirement {
            Requirement::Required => true,
            Requirement::Optional => false,
            Requirement::RequiredWhen(condition) => condition(params),
        }
    }

    /// Whether the supplied value satisfies this parameter's kind.
    fn accepts(&self, value: &str) -> bool {
        match self.kind {
            ParamKind::InputFile => Path::new(value).is_file(),
            ParamKind::OutputFile => match Path::new(value).parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.is_dir(),
                _ => true,
            },
            ParamKind::Count => value.parse::<u32>().is_ok_and(|n| n > 0),
            ParamKind::Flag => parse_flag(value).is_some(),
            ParamKind::Text => true,
        }
    }
}

/// Check `params` against `specs`.
///
/// Returns the names of every missing or invalid parameter, in declaration
/// order; an empty list means the parameters are valid.
pub fn invalid_params(specs: &[ParamSpec], params: &StageParams) -> Vec<String> {
    let mut invalid = Vec::new();
    for spec in specs {
        let ok = match params.value(spec.name) {
            Some(value) => spec.accepts(value),
            None => !spec.is_required(params),
        };
        if !ok && !invalid.iter().any(|name| name == spec.name) {
            invalid.push(spec.name.to_string());
        }
    }
    invalid
}
