//! HTTP listener and request identity settings.

use super::errors::ConfigResult;
use super::EnvVars;

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: "0.0.0.0")
    pub host: String,

    /// Port to bind to (default: 3000)
    pub port: u16,

    /// Path prefix of the data API (default: "/api")
    pub api_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            api_prefix: "/api".to_string(),
        }
    }
}

impl ServerConfig {
    pub(crate) fn from_vars(vars: &EnvVars<'_>) -> ConfigResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            host: vars.string("MYREST_HOST", &defaults.host),
            port: vars.parse("MYREST_PORT", defaults.port)?,
            api_prefix: normalize_prefix(&vars.string("MYREST_API_PREFIX", &defaults.api_prefix)),
        })
    }

    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Leading slash, no trailing slash. An empty prefix becomes "/api".
pub fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/api".to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Request identity settings
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Role used when the request carries no token (default: "webuser")
    pub anon_role: String,

    /// HS256 secret. Bearer tokens are rejected when unset.
    pub jwt_secret: Option<String>,

    /// Expected `aud` claim, if any
    pub jwt_audience: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            anon_role: "webuser".to_string(),
            jwt_secret: None,
            jwt_audience: None,
        }
    }
}

impl AuthConfig {
    pub(crate) fn from_vars(vars: &EnvVars<'_>) -> Self {
        Self {
            anon_role: vars.string("MYREST_ANON_ROLE", "webuser"),
            jwt_secret: vars.optional("MYREST_JWT_SECRET"),
            jwt_audience: vars.optional("MYREST_JWT_AUDIENCE"),
        }
    }
}
