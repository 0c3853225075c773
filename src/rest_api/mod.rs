//! # REST API Module
//!
//! PostgREST-style data API: HTTP requests are compiled to SQL and executed
//! in a per-request transaction against MySQL.

pub mod errors;
pub mod executor;
pub mod request;
pub mod server;

pub use errors::{ApiError, ApiResult};
pub use executor::{RequestExecutor, MUTATED_IDS_QUERY};
pub use request::{ApiMethod, ApiRequest, PREFER};
pub use server::RestServer;
