//! Subscriber installation.

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use super::{ObservabilityError, ObservabilityResult};
use crate::config::LoggingConfig;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Single-line human readable output
    #[default]
    Compact,
    /// JSON Lines
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(LogFormat::Compact),
            "json" | "jsonl" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Compact => f.write_str("compact"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

/// Build the filter from the base level plus overrides for chatty crates.
pub fn build_env_filter(level: &str) -> ObservabilityResult<EnvFilter> {
    let mut directives = vec![level.to_string()];
    for (target, lvl) in [("sqlx", "warn"), ("hyper", "warn"), ("h2", "warn")] {
        directives.push(format!("{target}={lvl}"));
    }

    let directives = directives.join(",");
    EnvFilter::try_new(&directives)
        .map_err(|source| ObservabilityError::InvalidFilter { directives, source })
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(config: &LoggingConfig) -> ObservabilityResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_env_filter(&config.level)?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init()?,
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact().with_target(true))
            .try_init()?,
    }
    Ok(())
}
