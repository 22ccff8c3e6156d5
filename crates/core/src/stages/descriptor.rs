//! Declarative stage definitions and the plans built from them.
//!
//! A [`StageDescriptor`] lists the parameters a stage takes and its step
//! templates. Planning a stage resolves every included template into a
//! [`ProcessInvocation`] and assigns it a slice of the progress range
//! proportional to its weight.

use crate::stages::index_policy::GenomeIndexPolicy;
use crate::stages::params::{invalid_params, ParamSpec, Requirement, StageParams};
use crate::supervisor::ProcessInvocation;
use gxp_protocol::settings_models::Settings;
use gxp_protocol::stage_models::{StageCode, StageInfo};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A parameter a step builder needed but did not find.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Missing parameter '{0}'")]
pub struct MissingParam(pub String);

/// Everything a step builder may read.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub params: &'a StageParams,
    pub settings: &'a Settings,
    pub index_policy: &'a dyn GenomeIndexPolicy,
}

impl<'a> StepContext<'a> {
    pub fn require(&self, name: &str) -> Result<&'a str, MissingParam> {
        self.params
            .value(name)
            .ok_or_else(|| MissingParam(name.to_string()))
    }

    pub fn require_path(&self, name: &str) -> Result<PathBuf, MissingParam> {
        self.require(name).map(PathBuf::from)
    }
}

/// Resolves a step template into a concrete invocation.
pub type StepBuilder = fn(&StepContext<'_>) -> Result<ProcessInvocation, MissingParam>;

/// Decides whether a step template takes part in a run.
pub type StepCondition = fn(&StepContext<'_>) -> bool;

/// One step of a stage before its parameters are known.
#[derive(Clone, Copy)]
pub struct StepTemplate {
    pub title: &'static str,
    /// Relative share of the stage's progress.
    pub weight: f64,
    pub build: StepBuilder,
    pub condition: Option<StepCondition>,
}

impl StepTemplate {
    pub const fn new(title: &'static str, weight: f64, build: StepBuilder) -> Self {
        Self {
            title,
            weight,
            build,
            condition: None,
        }
    }

    /// Only include the step when `condition` holds.
    pub const fn when(mut self, condition: StepCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    fn is_included(&self, ctx: &StepContext<'_>) -> bool {
        self.condition.map_or(true, |condition| condition(ctx))
    }
}

impl fmt::Debug for StepTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepTemplate")
            .field("title", &self.title)
            .field("weight", &self.weight)
            .field("conditional", &self.condition.is_some())
            .finish()
    }
}

/// Static definition of a stage.
#[derive(Debug, Clone)]
pub struct StageDescriptor {
    pub code: &'static str,
    pub title: &'static str,
    pub params: Vec<ParamSpec>,
    pub steps: Vec<StepTemplate>,
}

impl StageDescriptor {
    pub fn code(&self) -> StageCode {
        StageCode::new(self.code)
    }

    /// Key of the completion marker, `<code>_date`.
    pub fn marker_key(&self) -> String {
        self.code().marker_key()
    }

    /// Summary for listing. Conditionally required parameters are listed
    /// as required.
    pub fn info(&self) -> StageInfo {
        let (required, optional): (Vec<&ParamSpec>, Vec<&ParamSpec>) = self
            .params
            .iter()
            .partition(|spec| !matches!(spec.requirement, Requirement::Optional));

        StageInfo {
            code: self.code(),
            title: self.title.to_string(),
            required: required.iter().map(|spec| spec.name.to_string()).collect(),
            optional: optional.iter().map(|spec| spec.name.to_string()).collect(),
        }
    }

    /// Validate `params`.
    ///
    /// # Errors
    ///
    /// Returns the name of every missing or invalid parameter.
    pub fn validate(&self, params: &StageParams) -> Result<(), Vec<String>> {
        let invalid = invalid_params(&self.params, params);
        if invalid.is_empty() {
            Ok(())
        } else {
            Err(invalid)
        }
    }

    /// Resolve the included steps into a plan.
    ///
    /// Weights are normalised over the included steps, so the planned
    /// progress slices always cover `0.0..=1.0`.
    ///
    /// # Errors
    ///
    /// Returns the names of parameters a step builder could not find.
    pub fn plan(&self, ctx: &StepContext<'_>) -> Result<StagePlan, Vec<String>> {
        let included: Vec<&StepTemplate> =
            self.steps.iter().filter(|step| step.is_included(ctx)).collect();

        let total: f64 = included.iter().map(|step| step.weight.max(0.0)).sum();
        let count = included.len() as f64;

        let mut steps = Vec::with_capacity(included.len());
        let mut missing = Vec::new();
        let mut start = 0.0;

        for template in included {
            let span = if total > 0.0 {
                template.weight.max(0.0) / total
            } else {
                1.0 / count
            };

            match (template.build)(ctx) {
                Ok(invocation) => steps.push(PlannedStep {
                    title: template.title.to_string(),
                    invocation,
                    start,
                    span,
                }),
                Err(MissingParam(name)) => {
                    if !missing.contains(&name) {
                        missing.push(name);
                    }
                }
            }
            start += span;
        }

        if missing.is_empty() {
            Ok(StagePlan { steps })
        } else {
            Err(missing)
        }
    }
}

/// A step ready to run.
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub title: String,
    pub invocation: ProcessInvocation,
    /// Stage progress when the step starts.
    pub start: f64,
    /// Share of the stage progress the step covers.
    pub span: f64,
}

impl PlannedStep {
    /// Stage progress once the step has finished.
    pub fn end(&self) -> f64 {
        (self.start + self.span).min(1.0)
    }
}

/// Ordered steps of one stage run.
#[derive(Debug, Clone, Default)]
pub struct StagePlan {
    steps: Vec<PlannedStep>,
}

impl StagePlan {
    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn into_steps(self) -> Vec<PlannedStep> {
        self.steps
    }
}
