//! Common test utilities shared by the integration tests.
//!
//! - Fake tools and sample projects
//! - Event assertions
//! - Stage manager helpers

pub mod assertions;
pub mod fixtures;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use fixtures::*;
