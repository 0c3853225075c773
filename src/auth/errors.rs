//! # Auth Errors
//!
//! Error types for the authentication module.

use thiserror::Error;

/// Result type for auth operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Authentication errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Authorization header is not a bearer token
    #[error("Malformed authorization header")]
    MalformedHeader,

    /// JWT token is malformed
    #[error("Malformed token")]
    MalformedToken,

    /// JWT token has expired
    #[error("Token expired")]
    TokenExpired,

    /// JWT signature is invalid
    #[error("Invalid token signature")]
    InvalidSignature,

    /// `aud` claim does not match
    #[error("Invalid token audience")]
    InvalidAudience,

    /// `role` claim present but not a non-empty string
    #[error("Invalid role claim")]
    InvalidRoleClaim,
}

impl AuthError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        401
    }

    /// Returns whether this error should be logged at warn level
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}
