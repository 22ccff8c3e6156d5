//! Stage orchestration.
//!
//! This module provides:
//! - [`StageManager`]: validates, plans and starts stages, and settles
//!   completion markers
//! - [`StageHandle`] / [`StageOutcome`]: the caller's view of a run
//! - [`service`]: an Op/Event loop in front of the manager

pub mod error;
pub mod handle;
pub mod manager;
mod runner;
pub mod service;

pub use error::{StageError, StageResult};
pub use handle::{StageHandle, StageOutcome};
pub use manager::{PreparedStage, StageManager, TIMESTAMP_FORMAT};
pub use service::run_service;
