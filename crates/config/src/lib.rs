// Configuration Management
//
// This crate handles configuration loading for the session core.
// It provides:
// - Configuration structs with sensible defaults
// - Environment variable loading
//
// This keeps configuration concerns separate from session logic.

use thiserror::Error;

pub mod types;

// Re-export all configuration types
pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Environment(String),
}

/// Main configuration loading interface
impl CoreConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_env().map_err(ConfigError::Environment)
    }
}
