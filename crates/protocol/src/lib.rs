//! # gxp-protocol
//!
//! Core protocol definitions and data models for gxp.
//!
//! This crate defines all shared data structures used for:
//! - Settings file parsing (`.gxp/settings.toml`)
//! - Stage identification and completion status
//! - Runtime task state
//! - Inter-process communication between a UI and the core
//!
//! ## Modules
//!
//! - [`settings_models`]: Tool and reference locations
//! - [`stage_models`]: Stage codes, completion markers and stage summaries
//! - [`task_models`]: Task status and snapshots
//! - [`ipc`]: Operations and Events for UI-core communication
//!
//! ## Design Principles
//!
//! - Minimal dependencies: Only serde, ts-rs and uuid
//! - TypeScript generation: All types derive `TS` for client compatibility
//! - Independent compilation: No dependencies on other gxp crates

pub mod ipc;
pub mod settings_models;
pub mod stage_models;
pub mod task_models;

// Re-export all public types for convenience
pub use ipc::*;
pub use settings_models::*;
pub use stage_models::*;
pub use task_models::*;
