//! # Query Compiler Seam
//!
//! Turns an HTTP request into SQL. The request executor only depends on the
//! traits defined here; [`basic`] provides the MySQL compiler that ships with
//! the server.
//!
//! A mutation is compiled in two steps: the mutating statement first, then,
//! once the touched primary keys are known, the statement selecting them back.

pub mod basic;
mod errors;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use errors::{CompilerError, CompilerResult};

use crate::db::SqlStatement;
use crate::rest_api::ApiRequest;
use crate::session::SessionEnvironment;

/// Database schema as returned by introspection. Opaque to everything but
/// the compiler that produced the introspection query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaDescription(Value);

impl SchemaDescription {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }
}

/// Access rules loaded from the permissions file, passed through to
/// introspection untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionsConfig(Vec<Value>);

impl PermissionsConfig {
    pub fn new(rules: Vec<Value>) -> Self {
        Self(rules)
    }

    pub fn rules(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything a compiler may look at for one request
#[derive(Debug, Clone, Copy)]
pub struct StatementContext<'a> {
    /// Schema (database) the request targets
    pub schema: &'a str,

    /// Path prefix to strip, with trailing slash (e.g. "/api/")
    pub url_prefix: &'a str,

    /// Effective database role
    pub role: &'a str,

    pub request: &'a ApiRequest,

    /// Session variables already applied to the connection
    pub env: &'a SessionEnvironment,
}

/// Dialect-specific factory: produces the introspection statement and builds
/// compilers from its result.
pub trait CompilerBackend: Send + Sync {
    /// Dialect name, e.g. "mysql"
    fn dialect(&self) -> &'static str;

    /// Statement returning one row with a `json_schema` column
    fn introspection_query(
        &self,
        schemas: &[String],
        permissions: &PermissionsConfig,
    ) -> CompilerResult<SqlStatement>;

    /// Build a compiler for an introspected schema
    fn build(&self, schema: SchemaDescription) -> CompilerResult<Arc<dyn QueryCompiler>>;
}

/// Per-schema statement compiler
pub trait QueryCompiler: Send + Sync {
    /// Compile a read. The statement yields at most one row whose `body`
    /// column holds the JSON payload.
    fn fmt_statement(&self, ctx: &StatementContext<'_>) -> CompilerResult<SqlStatement>;

    /// Start compiling a mutation
    fn fmt_two_step_statement(
        &self,
        ctx: &StatementContext<'_>,
    ) -> CompilerResult<Box<dyn TwoStepStatement>>;
}

/// A mutation compiled in two steps
pub trait TwoStepStatement: Send {
    /// The mutating statement
    fn fmt_mutate(&self) -> CompilerResult<SqlStatement>;

    /// Record the primary keys the mutation touched
    fn set_mutated_rows(&mut self, ids: Vec<i64>);

    /// Select the mutated rows back; yields a `body` column like
    /// [`QueryCompiler::fmt_statement`]
    fn fmt_select(&self) -> CompilerResult<SqlStatement>;
}
