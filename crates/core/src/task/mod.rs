//! Task engine.
//!
//! This module provides:
//! - [`Task`]: cancellable background work with observable state, progress
//!   and message
//! - [`TaskContext`]: the work's side of a task
//! - [`state`]: the mapping from the work's result to a terminal state

pub mod engine;
pub mod error;
pub mod state;

pub use engine::{Task, TaskContext};
pub use error::{TaskError, TaskResult};
pub use state::TaskState;
