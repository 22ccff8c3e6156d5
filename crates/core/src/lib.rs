//! # gxp-core
//!
//! Core stage engine for gxp.
//!
//! This crate provides:
//! - A cancellable task engine with observable progress
//! - Supervision of external bioinformatics tools as subprocesses
//! - The stage orchestrator: validation, planning, execution and
//!   completion markers of the index, align, call, mist and recal stages
//! - The per-project configuration store and settings loading
//!
//! ## Modules
//!
//! - [`config`]: Settings loading from `.gxp/settings.toml`
//! - [`project`]: Project configuration store and registry
//! - [`task`]: Task engine
//! - [`supervisor`]: Process supervisor and output sinks
//! - [`stages`]: Stage parameters, descriptors and the built-in catalog
//! - [`orchestrator`]: Stage manager and the Op/Event service
//! - [`init`]: Template generation for `gxp init`
//! - [`logging`]: Tracing setup

pub mod config;
pub mod init;
pub mod logging;
pub mod orchestrator;
pub mod project;
pub mod stages;
pub mod supervisor;
pub mod task;
