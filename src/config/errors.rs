//! # Configuration Errors

use std::path::PathBuf;

use thiserror::Error;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors. All of them abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is not set
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// A variable is set but cannot be parsed
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    /// The permissions file exists but cannot be read
    #[error("Failed to read permissions file {path}: {source}")]
    PermissionsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The permissions file is not a JSON array
    #[error("Invalid permissions file {path}: {source}")]
    PermissionsParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
