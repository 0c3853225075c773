//! # Database Errors

use std::time::Duration;

use thiserror::Error;

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;

/// Database errors
#[derive(Debug, Error)]
pub enum DbError {
    /// Error reported by the driver or the server
    #[error("{0}")]
    Driver(#[from] sqlx::Error),

    /// Opening a dedicated connection took too long
    #[error("Timed out after {0:?} connecting to the database")]
    ConnectTimeout(Duration),

    /// A column value could not be mapped to JSON
    #[error("Failed to decode column '{column}': {source}")]
    Decode {
        column: String,
        #[source]
        source: sqlx::Error,
    },

    /// The session was already handed back
    #[error("Connection already released")]
    Released,

    /// Error raised by a non-driver backend
    #[error("{0}")]
    Backend(String),
}

impl DbError {
    /// Build a backend error from a message
    pub fn backend(message: impl Into<String>) -> Self {
        DbError::Backend(message.into())
    }
}
