//! `gxp init`: writes `.gxp/settings.toml` and, on request, a
//! `project.properties` listing the input keys to fill in.
//!
//! ```no_run
//! use gxp_core::init::{generate_structure, InitOptions};
//!
//! # async fn example() -> Result<(), gxp_core::init::InitError> {
//! let written = generate_structure(InitOptions::new("runs/sample1").with_project(true)).await?;
//! assert_eq!(written.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod generator;
pub mod templates;

pub use error::{InitError, InitResult};
pub use generator::{generate_structure, InitOptions};
pub use templates::get_template;
