//! MySQL connection settings.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::errors::ConfigResult;
use super::EnvVars;

/// TLS negotiation mode for MySQL connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    Disabled,
    #[default]
    Preferred,
    Required,
    VerifyCa,
    VerifyIdentity,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disabled => "disabled",
            SslMode::Preferred => "preferred",
            SslMode::Required => "required",
            SslMode::VerifyCa => "verify_ca",
            SslMode::VerifyIdentity => "verify_identity",
        }
    }
}

impl FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "disabled" => Ok(SslMode::Disabled),
            "preferred" => Ok(SslMode::Preferred),
            "required" => Ok(SslMode::Required),
            "verify_ca" => Ok(SslMode::VerifyCa),
            "verify_identity" => Ok(SslMode::VerifyIdentity),
            other => Err(format!("unknown ssl mode '{other}'")),
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database connection settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Server host (default: "localhost")
    pub host: String,

    /// Server port (default: 3306)
    pub port: u16,

    /// Login user (default: "root")
    pub user: String,

    /// Login password (default: empty)
    pub password: String,

    /// Database holding the exposed tables. Also the schema that is
    /// introspected and compiled against.
    pub database: String,

    pub ssl_mode: SslMode,

    /// CA certificate for `verify_ca` / `verify_identity`
    pub ssl_ca: Option<PathBuf>,

    /// Upper bound on pooled connections (default: 10)
    pub pool_size: u32,

    /// Connect/acquire timeout (default: 10s)
    pub connect_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            database: String::new(),
            ssl_mode: SslMode::default(),
            ssl_ca: None,
            pool_size: 10,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl DatabaseConfig {
    pub(crate) fn from_vars(vars: &EnvVars<'_>) -> ConfigResult<Self> {
        let defaults = Self::default();
        let timeout_secs: u64 = vars.parse(
            "DB_CONNECT_TIMEOUT_SECS",
            defaults.connect_timeout.as_secs(),
        )?;

        Ok(Self {
            host: vars.string("MYSQL_HOST", &defaults.host),
            port: vars.parse("MYSQL_PORT", defaults.port)?,
            user: vars.string("MYSQL_USER", &defaults.user),
            password: vars.optional("MYSQL_PASSWORD").unwrap_or_default(),
            database: vars.required("MYSQL_DATABASE")?,
            ssl_mode: vars.parse("MYSQL_SSL_MODE", defaults.ssl_mode)?,
            ssl_ca: vars.optional("MYSQL_SSL_CA").map(PathBuf::from),
            pool_size: vars.parse("DB_POOL_SIZE", defaults.pool_size)?,
            connect_timeout: Duration::from_secs(timeout_secs),
        })
    }
}
