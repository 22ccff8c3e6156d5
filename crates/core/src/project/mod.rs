//! Per-project configuration store.
//!
//! Each project directory holds a flat `key=value` file with the resolved
//! input paths of the project and the completion markers of its stages
//! (`<code>_date`). The UI derives stage status purely from this file.

pub mod error;
pub mod properties;
pub mod registry;
pub mod store;

pub use error::{ProjectConfigError, ProjectResult};
pub use registry::{discover_projects, ProjectHandle, ProjectRegistry};
pub use store::ProjectConfig;
