// Error types for Settings module

use thiserror::Error;

/// Settings errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Unknown setting: {0}")]
    UnknownKey(String),

    #[error("Invalid value for '{0}': {1}")]
    InvalidValue(String, String),

    #[error("Failed to load settings: {0}")]
    LoadFailed(String),

    #[error("Failed to persist settings: {0}")]
    PersistFailed(String),
}

pub type Result<T> = std::result::Result<T, SettingsError>;
