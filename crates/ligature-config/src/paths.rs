//! Platform-specific configuration paths.
//!
//! - Linux: `~/.config/ligature/engine.toml`
//! - macOS: `~/Library/Application Support/ligature/engine.toml`
//! - Windows: `%APPDATA%\ligature\engine.toml`

use std::path::PathBuf;

/// Application name used for directory paths.
const APP_NAME: &str = "ligature";

/// File name of the engine configuration.
pub const CONFIG_FILE_NAME: &str = "engine.toml";

/// Returns the user-specific configuration directory.
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Path of the user's engine configuration file.
pub fn default_config_path() -> PathBuf {
    user_config_dir().join(CONFIG_FILE_NAME)
}

/// Ensure the user config directory exists.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_user_config_dir() -> Result<PathBuf, crate::ConfigError> {
    let dir = user_config_dir();

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| crate::ConfigError::create_dir(&dir, e))?;
    }

    Ok(dir)
}
