//! # JWT Validation
//!
//! Stateless HS256 validation of bearer tokens. Claims are returned as a
//! free-form JSON object; `exp` and `nbf` are checked when present.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};

use super::errors::{AuthError, AuthResult};

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Shared HS256 secret
    pub secret: String,

    /// Required `aud` claim; audience is not checked when None
    pub audience: Option<String>,
}

/// Validates bearer tokens
#[derive(Clone)]
pub struct JwtManager {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtManager {
    pub fn new(config: JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_nbf = true;
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Self {
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
        }
    }

    /// Validate a token and return its claims
    pub fn validate_token(&self, token: &str) -> AuthResult<Map<String, Value>> {
        let token_data = decode::<Map<String, Value>>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                ErrorKind::InvalidAudience => AuthError::InvalidAudience,
                _ => AuthError::MalformedToken,
            })?;

        Ok(token_data.claims)
    }
}
