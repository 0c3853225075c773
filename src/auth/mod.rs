//! # Auth Module
//!
//! Resolves the database role and claims of a request. Requests without a
//! bearer token run as the anonymous role; a valid HS256 token may name a
//! different role through its `role` claim.

pub mod context;
pub mod errors;
pub mod jwt;

pub use context::{AuthContext, Authenticator};
pub use errors::{AuthError, AuthResult};
pub use jwt::{JwtConfig, JwtManager};
