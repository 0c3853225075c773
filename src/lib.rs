//! myrest - a PostgREST-style HTTP API over MySQL
//!
//! Requests under the API prefix are compiled to SQL by a pluggable query
//! compiler and executed one transaction per request, with the caller's
//! role, headers, query string and JWT claims exposed as session variables.

pub mod auth;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod db;
pub mod engine;
pub mod observability;
pub mod rest_api;
pub mod session;
