//! Settings file loader for the `.gxp/` directory.
//!
//! Settings are looked up in `<root>/.gxp/settings.toml`. A missing file is
//! not an error: every field has a default, and tools are then resolved by
//! name on `PATH`.

use crate::config::error::ConfigError;
use crate::config::error::ConfigResult;
use gxp_protocol::settings_models::Settings;
use std::path::{Path, PathBuf};

/// Name of the directory holding gxp settings.
pub const SETTINGS_DIR: &str = ".gxp";

/// Name of the settings file inside [`SETTINGS_DIR`].
pub const SETTINGS_FILE: &str = "settings.toml";

/// Path of the settings file for a given root directory.
pub fn settings_path(root: &Path) -> PathBuf {
    root.join(SETTINGS_DIR).join(SETTINGS_FILE)
}

/// Loads settings from `<root>/.gxp/settings.toml`.
///
/// Returns the default settings when the file does not exist.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or has
/// invalid TOML syntax.
///
/// # Example
///
/// ```rust,no_run
/// use gxp_core::config::loader::load_settings;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let settings = load_settings(Path::new("."))?;
/// println!("Using {} threads", settings.threads);
/// # Ok(())
/// # }
/// ```
pub fn load_settings(root: &Path) -> ConfigResult<Settings> {
    let path = settings_path(root);

    if !path.exists() {
        tracing::debug!(path = %path.display(), "no settings file, using defaults");
        return Ok(Settings::default());
    }

    load_settings_file(&path)
}

/// Loads settings from an explicit file path.
///
/// Unlike [`load_settings`], a missing file is an error.
pub fn load_settings_file(path: &Path) -> ConfigResult<Settings> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    let settings: Settings = toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!(path = %path.display(), "loaded settings");
    Ok(settings)
}
