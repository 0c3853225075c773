//! # Database Access
//!
//! Connection and pool abstractions used by the request executor and by
//! schema introspection, plus the MySQL implementation backed by sqlx.
//!
//! ## Invariants
//! - A connection obtained from [`Database::acquire`] is handed back exactly
//!   once through [`Connection::release`], whatever the request outcome.
//! - Transaction control (`BEGIN`, `COMMIT`, `ROLLBACK`) is issued on the same
//!   connection as every statement of the request.

mod errors;
mod mysql;

use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::{Map, Value};

pub use errors::{DbError, DbResult};
pub use mysql::MySqlDatabase;

/// A row decoded into column name -> JSON value
pub type DbRow = Map<String, Value>;

/// A SQL statement with positional (`?`) parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlStatement {
    /// Statement text
    pub query: String,

    /// Values bound to the placeholders, in order
    pub parameters: Vec<Value>,
}

impl SqlStatement {
    /// Create a statement with bound parameters
    pub fn new(query: impl Into<String>, parameters: Vec<Value>) -> Self {
        Self {
            query: query.into(),
            parameters,
        }
    }

    /// Create a statement without parameters
    pub fn raw(query: impl Into<String>) -> Self {
        Self::new(query, Vec::new())
    }
}

/// Outcome of a statement that does not produce rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    /// First auto-generated key of the statement, 0 when none was generated
    pub last_insert_id: u64,

    /// Number of rows the statement touched
    pub rows_affected: u64,
}

/// A single database session
pub trait Connection: Send {
    /// Open a transaction
    fn begin(&mut self) -> BoxFuture<'_, DbResult<()>>;

    /// Commit the open transaction
    fn commit(&mut self) -> BoxFuture<'_, DbResult<()>>;

    /// Roll back the open transaction
    fn rollback(&mut self) -> BoxFuture<'_, DbResult<()>>;

    /// Execute a statement that does not return rows
    fn execute<'a>(&'a mut self, statement: &'a SqlStatement)
        -> BoxFuture<'a, DbResult<ExecOutcome>>;

    /// Execute a statement and collect every row
    fn fetch_all<'a>(&'a mut self, statement: &'a SqlStatement)
        -> BoxFuture<'a, DbResult<Vec<DbRow>>>;

    /// Hand the session back: pooled sessions return to the pool,
    /// dedicated sessions are closed.
    fn release(self: Box<Self>) -> BoxFuture<'static, ()>;
}

/// Source of database sessions
pub trait Database: Send + Sync {
    /// Borrow a session from the bounded pool
    fn acquire(&self) -> BoxFuture<'_, DbResult<Box<dyn Connection>>>;

    /// Open a session outside the pool (used for introspection)
    fn connect_dedicated(&self) -> BoxFuture<'_, DbResult<Box<dyn Connection>>>;
}
