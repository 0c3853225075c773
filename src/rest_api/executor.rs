//! # Transactional Request Executor
//!
//! Runs one API request inside one transaction on one pooled connection:
//!
//! 1. make sure the engine is ready
//! 2. acquire a connection
//! 3. `BEGIN`, then set the session variables
//! 4. run the compiled read, or the mutation followed by identifier
//!    recovery and the optional representation select
//! 5. `COMMIT`
//!
//! ## Invariants
//! - Any failure after the connection is acquired sends exactly one
//!   `ROLLBACK` and never a `COMMIT`.
//! - The connection is released exactly once, on every path.
//! - Session variables are set before any compiled statement runs.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, Instrument};
use uuid::Uuid;

use super::errors::{ApiError, ApiResult};
use super::request::{ApiMethod, ApiRequest};
use crate::auth::AuthContext;
use crate::compiler::StatementContext;
use crate::db::{Connection, Database, DbRow, ExecOutcome, SqlStatement};
use crate::engine::{Engine, SchemaCache};
use crate::observability::Event;
use crate::session;

/// Column holding the JSON payload of read and representation statements
pub const BODY_COLUMN: &str = "body";

/// Recovers the primary keys collected by a mutation in the
/// `@subzero_ids` / `@subzero_ignored_ids` session variables: every collected
/// id that was not also marked ignored.
pub const MUTATED_IDS_QUERY: &str = "select t.val \
    from json_table(@subzero_ids, '$[*]' columns (val integer path '$')) as t \
    left join json_table(@subzero_ignored_ids, '$[*]' columns (val integer path '$')) as t2 \
    on t.val = t2.val \
    where t2.val is null";

/// Executes data API requests
pub struct RequestExecutor {
    db: Arc<dyn Database>,
    cache: Arc<SchemaCache>,
    schema: String,
    url_prefix: String,
}

impl RequestExecutor {
    /// `api_prefix` is the mount point, e.g. "/api"
    pub fn new(
        db: Arc<dyn Database>,
        cache: Arc<SchemaCache>,
        schema: impl Into<String>,
        api_prefix: &str,
    ) -> Self {
        Self {
            db,
            cache,
            schema: schema.into(),
            url_prefix: format!("{}/", api_prefix.trim_end_matches('/')),
        }
    }

    pub fn cache(&self) -> &Arc<SchemaCache> {
        &self.cache
    }

    /// Execute a request and return its JSON payload (`Null` when there is none)
    pub async fn execute(&self, request: &ApiRequest, auth: &AuthContext) -> ApiResult<Value> {
        let span = tracing::info_span!(
            "api_request",
            request_id = %Uuid::new_v4(),
            method = %request.method,
            path = %request.path,
            role = %auth.role,
        );
        self.execute_inner(request, auth).instrument(span).await
    }

    async fn execute_inner(&self, request: &ApiRequest, auth: &AuthContext) -> ApiResult<Value> {
        let method = ApiMethod::parse(&request.method)?;
        let engine = self.cache.ensure_ready().await?;

        let env = session::build_environment(
            &auth.role,
            method.as_str(),
            &request.headers,
            &request.query,
            &auth.claims,
        );
        let env_statement = session::compile_session_statement(&env);
        let ctx = StatementContext {
            schema: &self.schema,
            url_prefix: &self.url_prefix,
            role: &auth.role,
            request,
            env: &env,
        };

        let mut conn = self.db.acquire().await?;
        let outcome = run_transaction(conn.as_mut(), &engine, method, &ctx, &env_statement).await;
        conn.release().await;
        outcome
    }
}

async fn run_transaction(
    conn: &mut dyn Connection,
    engine: &Engine,
    method: ApiMethod,
    ctx: &StatementContext<'_>,
    env_statement: &SqlStatement,
) -> ApiResult<Value> {
    let outcome = match run_steps(&mut *conn, engine, method, ctx, env_statement).await {
        Ok(payload) => conn.commit().await.map(|()| payload).map_err(ApiError::from),
        Err(err) => Err(err),
    };

    if let Err(err) = &outcome {
        match conn.rollback().await {
            Ok(()) => debug!(
                event = Event::TransactionRolledBack.as_str(),
                error = %err,
                "Transaction rolled back"
            ),
            Err(rollback_err) => error!(
                event = Event::RollbackFailed.as_str(),
                error = %rollback_err,
                cause = %err,
                "Rollback failed"
            ),
        }
    }
    outcome
}

async fn run_steps(
    conn: &mut dyn Connection,
    engine: &Engine,
    method: ApiMethod,
    ctx: &StatementContext<'_>,
    env_statement: &SqlStatement,
) -> ApiResult<Value> {
    conn.begin().await?;
    conn.execute(env_statement).await?;

    match method {
        ApiMethod::Get => read(conn, engine, ctx).await,
        _ => mutate(conn, engine, ctx).await,
    }
}

async fn read(
    conn: &mut dyn Connection,
    engine: &Engine,
    ctx: &StatementContext<'_>,
) -> ApiResult<Value> {
    let statement = engine.compiler().fmt_statement(ctx)?;
    let rows = conn.fetch_all(&statement).await?;
    parse_body(rows.first())
}

async fn mutate(
    conn: &mut dyn Connection,
    engine: &Engine,
    ctx: &StatementContext<'_>,
) -> ApiResult<Value> {
    let mut statement = engine.compiler().fmt_two_step_statement(ctx)?;
    let outcome = conn.execute(&statement.fmt_mutate()?).await?;

    let ids = match contiguous_ids(outcome) {
        Some(ids) => ids,
        None => recover_mutated_ids(&mut *conn).await?,
    };
    debug!(mutated = ids.len(), "Mutation applied");
    statement.set_mutated_rows(ids);

    if !ctx.request.prefers_representation() {
        return Ok(Value::Null);
    }

    let rows = conn.fetch_all(&statement.fmt_select()?).await?;
    parse_body(rows.first())
}

/// Keys of an auto-increment insert: `last_insert_id .. last_insert_id + rows`.
/// None when the statement generated no key.
pub fn contiguous_ids(outcome: ExecOutcome) -> Option<Vec<i64>> {
    if outcome.last_insert_id == 0 || outcome.rows_affected == 0 {
        return None;
    }
    (0..outcome.rows_affected)
        .map(|offset| {
            outcome
                .last_insert_id
                .checked_add(offset)
                .and_then(|id| i64::try_from(id).ok())
        })
        .collect()
}

async fn recover_mutated_ids(conn: &mut dyn Connection) -> ApiResult<Vec<i64>> {
    let rows = conn.fetch_all(&SqlStatement::raw(MUTATED_IDS_QUERY)).await?;
    Ok(rows
        .iter()
        .filter_map(|row| row.get("val").and_then(Value::as_i64))
        .collect())
}

/// Decode the `body` column of the first row. No row, SQL NULL or an empty
/// string all mean "no payload".
pub fn parse_body(row: Option<&DbRow>) -> ApiResult<Value> {
    match row.and_then(|row| row.get(BODY_COLUMN)) {
        None | Some(Value::Null) => Ok(Value::Null),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(Value::Null),
        Some(Value::String(text)) => Ok(serde_json::from_str(text)?),
        Some(other) => Ok(other.clone()),
    }
}
