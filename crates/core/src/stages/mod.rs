//! Stage definitions.
//!
//! This module provides:
//! - [`params`]: the parameter set of a stage run and its validation
//! - [`descriptor`]: declarative stage descriptions and the plans built
//!   from them
//! - [`catalog`]: the built-in index, align, call, mist and recal stages
//! - [`index_policy`]: the pluggable "is this genome indexed" decision

pub mod catalog;
pub mod descriptor;
pub mod index_policy;
pub mod params;

pub use catalog::StageCatalog;
pub use descriptor::{PlannedStep, StageDescriptor, StagePlan, StepContext, StepTemplate};
pub use index_policy::{default_policy, AllOf, BwaIndexFiles, GenomeIndexPolicy, SequenceDictionary};
pub use params::{ParamKind, ParamSpec, StageParams};
