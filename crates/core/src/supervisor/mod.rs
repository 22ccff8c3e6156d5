//! Process supervision for external tools.
//!
//! This module provides:
//! - [`ProcessInvocation`]: one immutable subprocess launch description
//! - [`OutputSink`] implementations receiving live tool output
//! - [`ProcessSupervisor`]: runs an invocation to completion and kills it on
//!   request

pub mod error;
pub mod executor;
pub mod invocation;
pub mod sink;

pub use error::SupervisorError;
pub use executor::{ProcessExit, ProcessSupervisor};
pub use invocation::ProcessInvocation;
pub use sink::{EventSink, FileSink, MemorySink, OutputSink, TeeSink};
