//! Embedded template files for `gxp init`.
//!
//! This module uses `rust-embed` to embed template files from the workspace
//! root `templates/` directory into the binary at compile time, so `gxp init`
//! works without any external files.

use rust_embed::RustEmbed;

/// Name of the settings template.
pub const SETTINGS_TEMPLATE: &str = "settings.toml";

/// Name of the project configuration template.
pub const PROJECT_TEMPLATE: &str = "project.properties";

/// Embedded template files from the `templates/` directory.
///
/// The path is relative to the crate root:
/// - `CARGO_MANIFEST_DIR` = `crates/core`
/// - `../../templates` = workspace root `templates/`
///
/// The `debug-embed` feature embeds the files in debug builds as well, so
/// tests see the same templates as release builds.
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/../../templates"]
pub struct TemplateAssets;

/// Get template file content by name.
///
/// # Example
/// ```
/// use gxp_core::init::templates::get_template;
///
/// let settings = get_template("settings.toml").expect("settings.toml should exist");
/// assert!(settings.contains("[tools]"));
/// ```
pub fn get_template(path: &str) -> Option<String> {
    TemplateAssets::get(path).map(|file| String::from_utf8_lossy(file.data.as_ref()).to_string())
}
