//! Engine configuration file format.

use serde::{Deserialize, Serialize};
use std::path::Path;

use ligature_core::SessionOptions;

use crate::error::ConfigError;
use crate::validation::{ValidationResult, check_power_of_two, check_range, collect};

/// Largest undo history accepted.
pub const MAX_UNDO_CAPACITY: u32 = 10_000;

/// Largest number of host automation slots accepted.
pub const MAX_HOST_SLOTS: u32 = 4096;

/// Undo history settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UndoConfig {
    /// Transactions kept by the undo log.
    pub capacity: u32,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

/// Host automation surface settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    /// Number of automation slots exposed to the host.
    pub slot_count: u32,
    /// Maximum characters of a slot name reported to the host.
    pub name_max_length: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            slot_count: 128,
            name_max_length: 32,
        }
    }
}

/// Audio processing settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz until the host reports one.
    pub sample_rate: u32,
    /// Samples per parameter update cycle.
    pub update_block_size: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            update_block_size: 256,
        }
    }
}

/// Engine configuration.
///
/// # TOML Format
///
/// ```toml
/// [undo]
/// capacity = 100
///
/// [host]
/// slot_count = 128
/// name_max_length = 32
///
/// [audio]
/// sample_rate = 48000
/// update_block_size = 256
/// ```
///
/// Missing sections and keys take their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Undo history.
    pub undo: UndoConfig,
    /// Host automation surface.
    pub host: HostConfig,
    /// Audio processing.
    pub audio: AudioConfig,
}

impl EngineConfig {
    /// Load and validate a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let config = Self::from_toml(&content)?;
        tracing::debug!(path = %path.display(), "engine config loaded");
        Ok(config)
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        tracing::debug!(path = %path.display(), "engine config saved");
        Ok(())
    }

    /// Convert the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> ValidationResult<()> {
        collect([
            check_range("undo.capacity", self.undo.capacity, 1, MAX_UNDO_CAPACITY),
            check_range("host.slot_count", self.host.slot_count, 1, MAX_HOST_SLOTS),
            check_range("host.name_max_length", self.host.name_max_length, 1, 1024),
            check_range("audio.sample_rate", self.audio.sample_rate, 8000, 384_000),
            check_range("audio.update_block_size", self.audio.update_block_size, 16, 8192),
            check_power_of_two("audio.update_block_size", self.audio.update_block_size),
        ])
    }

    /// Session sizing derived from this configuration.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            undo_capacity: self.undo.capacity as usize,
            host_slot_count: self.host.slot_count as usize,
            name_max_length: self.host.name_max_length as usize,
            sample_rate: self.audio.sample_rate as f32,
        }
    }

    /// Duration of one update cycle in seconds.
    pub fn update_period(&self) -> f64 {
        f64::from(self.audio.update_block_size) / f64::from(self.audio.sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationError;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session_options(), SessionOptions::default());
    }

    #[test]
    fn missing_keys_take_defaults() {
        let config = EngineConfig::from_toml("[host]\nslot_count = 16\n").unwrap();
        assert_eq!(config.host.slot_count, 16);
        assert_eq!(config.host.name_max_length, 32);
        assert_eq!(config.undo, UndoConfig::default());
        assert_eq!(config.audio, AudioConfig::default());
    }

    #[test]
    fn empty_document_is_default() {
        assert_eq!(EngineConfig::from_toml("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn round_trips_through_toml() {
        let mut config = EngineConfig::default();
        config.undo.capacity = 12;
        config.audio.sample_rate = 96000;
        let text = config.to_toml().unwrap();
        assert!(text.contains("[undo]"));
        assert_eq!(EngineConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = EngineConfig::from_toml("[undo]\ncapacity = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Validation(ValidationError::OutOfRange { field: "undo.capacity", .. })
        ));

        let mut config = EngineConfig::default();
        config.audio.update_block_size = 100;
        config.host.slot_count = 0;
        match config.validate() {
            Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected two errors, got {other:?}"),
        }
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        assert!(matches!(
            EngineConfig::from_toml("[undo\ncapacity = 1"),
            Err(ConfigError::TomlParse(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml("[undo]\ncapacity = \"many\"\n"),
            Err(ConfigError::TomlParse(_))
        ));
    }

    #[test]
    fn update_period() {
        let config = EngineConfig::default();
        assert!((config.update_period() - 256.0 / 48000.0).abs() < 1e-12);
    }
}
