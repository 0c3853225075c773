//! Observability subsystem for myrest
//!
//! Structured logging through `tracing`, with a fixed vocabulary of
//! lifecycle events attached as the `event` field.
//!
//! # Usage
//!
//! ```ignore
//! use myrest::observability::Event;
//!
//! tracing::info!(event = Event::EngineReady.as_str(), "Engine ready");
//! ```

mod events;
mod logging;

pub use events::Event;
pub use logging::{build_env_filter, init_logging, LogFormat};

use thiserror::Error;

/// Result type for observability setup
pub type ObservabilityResult<T> = Result<T, ObservabilityError>;

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum ObservabilityError {
    /// Filter directives could not be parsed
    #[error("Invalid log filter '{directives}': {source}")]
    InvalidFilter {
        directives: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    /// A global subscriber is already installed
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}
