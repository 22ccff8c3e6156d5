//! Settings loading for gxp.
//!
//! This module handles loading `.gxp/settings.toml`, which holds the tool
//! and reference locations shared by every project.

pub mod error;
pub mod loader;
