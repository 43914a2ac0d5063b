//! Engine configuration for ligature sessions.
//!
//! A small TOML file sizes the undo history, the host automation surface, and
//! the audio update cycle. [`EngineConfig::session_options`] turns it into the
//! [`SessionOptions`](ligature_core::SessionOptions) a
//! [`Session`](ligature_core::Session) is built from.
//!
//! # Example
//!
//! ```rust
//! use ligature_config::EngineConfig;
//! use ligature_core::Session;
//!
//! let config = EngineConfig::from_toml("[undo]\ncapacity = 20\n").unwrap();
//! let session = Session::new(config.session_options());
//! assert_eq!(session.options().undo_capacity, 20);
//! assert_eq!(session.bridges().len(), 128);
//! ```

mod engine;
mod error;

/// Platform-specific configuration paths.
pub mod paths;

/// Field validation.
pub mod validation;

pub use engine::{AudioConfig, EngineConfig, HostConfig, MAX_HOST_SLOTS, MAX_UNDO_CAPACITY, UndoConfig};
pub use error::ConfigError;
pub use paths::{CONFIG_FILE_NAME, default_config_path, ensure_user_config_dir, user_config_dir};
pub use validation::{ValidationError, ValidationResult};
