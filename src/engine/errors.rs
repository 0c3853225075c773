//! # Engine Errors

use thiserror::Error;

use crate::compiler::CompilerError;
use crate::db::DbError;

/// Result type for engine initialization
pub type EngineResult<T> = Result<T, EngineError>;

/// Failure of a single introspection attempt
#[derive(Debug, Error)]
pub enum IntrospectionError {
    #[error("{0}")]
    Database(#[from] DbError),

    #[error("{0}")]
    Compiler(#[from] CompilerError),

    /// The introspection statement returned no `json_schema` value
    #[error("Introspection returned no json_schema value")]
    MissingSchema,

    /// `json_schema` was text but not valid JSON
    #[error("Introspection returned invalid JSON: {0}")]
    InvalidSchema(#[from] serde_json::Error),
}

/// Engine initialization errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Every allowed attempt failed
    #[error("Schema introspection failed after {attempts} attempt(s): {source}")]
    Introspection {
        attempts: u32,
        #[source]
        source: IntrospectionError,
    },

    /// Another request's initialization failed while this one waited
    #[error("Query engine unavailable: {0}")]
    Unavailable(String),
}
