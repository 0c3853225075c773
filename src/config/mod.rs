//! # Configuration
//!
//! Settings are read from the process environment. Every section is built
//! through [`AppConfig::from_lookup`] so tests can supply their own values
//! without touching the real environment.

mod database;
mod errors;
mod permissions;
mod server;

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

pub use database::{DatabaseConfig, SslMode};
pub use errors::{ConfigError, ConfigResult};
pub use permissions::load_permissions;
pub use server::{AuthConfig, ServerConfig};

use crate::observability::LogFormat;

/// Default location of the permissions file
pub const DEFAULT_PERMISSIONS_FILE: &str = "permissions.json";

/// Default number of introspection retries after the first attempt
pub const DEFAULT_INTROSPECTION_MAX_RETRIES: u32 = 3;

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Level used when `RUST_LOG` is not set
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,

    /// Path of the optional permissions file
    pub permissions_file: PathBuf,

    /// Retries allowed after the first failed introspection (None = unlimited)
    pub introspection_max_retries: Option<u32>,
}

impl AppConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key/value source
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = EnvVars::new(&lookup);

        let logging = LoggingConfig {
            level: vars.string("MYREST_LOG_LEVEL", "info"),
            format: vars.parse("MYREST_LOG_FORMAT", LogFormat::Compact)?,
        };

        let max_retries: u32 = vars.parse(
            "MYREST_INTROSPECTION_MAX_RETRIES",
            DEFAULT_INTROSPECTION_MAX_RETRIES,
        )?;

        Ok(Self {
            database: DatabaseConfig::from_vars(&vars)?,
            server: ServerConfig::from_vars(&vars)?,
            auth: AuthConfig::from_vars(&vars),
            logging,
            permissions_file: PathBuf::from(
                vars.string("MYREST_PERMISSIONS_FILE", DEFAULT_PERMISSIONS_FILE),
            ),
            introspection_max_retries: (max_retries > 0).then_some(max_retries),
        })
    }
}

/// Typed access to a key/value source. Empty values count as unset.
pub(crate) struct EnvVars<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl<'a> EnvVars<'a> {
    pub(crate) fn new(lookup: &'a dyn Fn(&str) -> Option<String>) -> Self {
        Self { lookup }
    }

    pub(crate) fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    pub(crate) fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    pub(crate) fn required(&self, key: &'static str) -> ConfigResult<String> {
        self.optional(key).ok_or(ConfigError::MissingVar(key))
    }

    pub(crate) fn parse<T>(&self, key: &'static str, default: T) -> ConfigResult<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.optional(key) {
            Some(raw) => raw.parse().map_err(|err: T::Err| ConfigError::InvalidValue {
                key,
                message: format!("{raw:?}: {err}"),
            }),
            None => Ok(default),
        }
    }
}
