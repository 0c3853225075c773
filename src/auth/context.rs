//! Request identity.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use serde_json::{Map, Value};

use super::errors::{AuthError, AuthResult};
use super::jwt::{JwtConfig, JwtManager};
use crate::config::AuthConfig;

/// Role and claims a request runs with
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    /// Database role exposed to SQL as `@role`
    pub role: String,

    /// Verified token claims; an empty object for anonymous requests
    pub claims: Value,
}

impl AuthContext {
    /// Create anonymous context
    pub fn anonymous(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            claims: Value::Object(Map::new()),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.claims.as_object().map_or(true, Map::is_empty)
    }
}

/// Turns request headers into an [`AuthContext`]
#[derive(Clone)]
pub struct Authenticator {
    anon_role: String,
    jwt: Option<JwtManager>,
}

impl Authenticator {
    pub fn new(anon_role: impl Into<String>, jwt: Option<JwtManager>) -> Self {
        Self {
            anon_role: anon_role.into(),
            jwt,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        let jwt = config.jwt_secret.as_ref().map(|secret| {
            JwtManager::new(JwtConfig {
                secret: secret.clone(),
                audience: config.jwt_audience.clone(),
            })
        });
        Self::new(config.anon_role.clone(), jwt)
    }

    pub fn anon_role(&self) -> &str {
        &self.anon_role
    }

    /// Resolve the request identity from its `Authorization` header.
    ///
    /// Without a configured secret the header is not inspected and every
    /// request runs as the anonymous role.
    pub fn authenticate(&self, headers: &HeaderMap) -> AuthResult<AuthContext> {
        let (Some(jwt), Some(value)) = (self.jwt.as_ref(), headers.get(AUTHORIZATION)) else {
            return Ok(AuthContext::anonymous(&self.anon_role));
        };

        let token = value
            .to_str()
            .ok()
            .and_then(bearer_token)
            .ok_or(AuthError::MalformedHeader)?;
        let claims = jwt.validate_token(token)?;

        let role = match claims.get("role") {
            None => self.anon_role.clone(),
            Some(Value::String(role)) if !role.is_empty() => role.clone(),
            Some(_) => return Err(AuthError::InvalidRoleClaim),
        };

        Ok(AuthContext {
            role,
            claims: Value::Object(claims),
        })
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
