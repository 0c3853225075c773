//! Shared test doubles: a scripted in-memory database that journals every
//! call, a scripted compiler that records the keys it is handed, and a
//! sleeper that records delays instead of waiting.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::{json, Value};

use myrest::compiler::{
    CompilerBackend, CompilerError, CompilerResult, PermissionsConfig, QueryCompiler,
    SchemaDescription, StatementContext, TwoStepStatement,
};
use myrest::db::{Connection, Database, DbError, DbResult, DbRow, ExecOutcome, SqlStatement};
use myrest::engine::{
    Backoff, Engine, EngineLoader, EngineResult, Introspector, SchemaCache, Sleeper,
};
use myrest::rest_api::RequestExecutor;

// =============================================================================
// Scripted database
// =============================================================================

/// What a matching call answers with
#[derive(Debug, Clone)]
pub enum Reply {
    Rows(Vec<DbRow>),
    Exec(ExecOutcome),
    Fail(String),
}

struct Rule {
    pattern: String,
    reply: Reply,
    remaining: Option<usize>,
}

#[derive(Default)]
struct Shared {
    journal: Mutex<Vec<String>>,
    statements: Mutex<Vec<SqlStatement>>,
    rules: Mutex<Vec<Rule>>,
}

impl Shared {
    fn record(&self, entry: impl Into<String>) {
        self.journal.lock().unwrap().push(entry.into());
    }

    /// First live rule whose pattern occurs in `key`
    fn reply_for(&self, key: &str) -> Option<Reply> {
        let mut rules = self.rules.lock().unwrap();
        let rule = rules
            .iter_mut()
            .find(|rule| rule.remaining != Some(0) && key.contains(&rule.pattern))?;
        if let Some(remaining) = rule.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(rule.reply.clone())
    }

    fn control(&self, step: &str) -> DbResult<()> {
        self.record(step);
        match self.reply_for(step) {
            Some(Reply::Fail(message)) => Err(DbError::backend(message)),
            _ => Ok(()),
        }
    }
}

/// In-memory [`Database`] answering from a script.
///
/// Journal entries: `ACQUIRE`, `CONNECT`, `BEGIN`, `COMMIT`, `ROLLBACK`,
/// `EXEC <sql>`, `FETCH <sql>`, `RELEASE pooled`, `RELEASE dedicated`.
/// Rules match by substring against the entry text, first match wins.
#[derive(Clone, Default)]
pub struct ScriptedDatabase {
    shared: Arc<Shared>,
}

impl ScriptedDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every matching call with `reply`
    pub fn on(&self, pattern: &str, reply: Reply) -> &Self {
        self.push_rule(pattern, reply, None)
    }

    /// Answer the next `times` matching calls with `reply`
    pub fn on_times(&self, pattern: &str, reply: Reply, times: usize) -> &Self {
        self.push_rule(pattern, reply, Some(times))
    }

    fn push_rule(&self, pattern: &str, reply: Reply, remaining: Option<usize>) -> &Self {
        self.shared.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            reply,
            remaining,
        });
        self
    }

    pub fn journal(&self) -> Vec<String> {
        self.shared.journal.lock().unwrap().clone()
    }

    /// Journal entries starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.journal()
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .count()
    }

    /// Every statement executed or fetched, in order
    pub fn statements(&self) -> Vec<SqlStatement> {
        self.shared.statements.lock().unwrap().clone()
    }

    fn open(&self, step: &str, kind: &'static str) -> DbResult<Box<dyn Connection>> {
        self.shared.control(step)?;
        Ok(Box::new(ScriptedConnection {
            shared: self.shared.clone(),
            kind,
        }))
    }
}

impl Database for ScriptedDatabase {
    fn acquire(&self) -> BoxFuture<'_, DbResult<Box<dyn Connection>>> {
        Box::pin(async move { self.open("ACQUIRE", "pooled") })
    }

    fn connect_dedicated(&self) -> BoxFuture<'_, DbResult<Box<dyn Connection>>> {
        Box::pin(async move { self.open("CONNECT", "dedicated") })
    }
}

struct ScriptedConnection {
    shared: Arc<Shared>,
    kind: &'static str,
}

impl ScriptedConnection {
    fn run(&self, verb: &str, statement: &SqlStatement) -> Option<Reply> {
        let entry = format!("{verb} {}", statement.query);
        self.shared.record(entry.clone());
        self.shared.statements.lock().unwrap().push(statement.clone());
        self.shared.reply_for(&entry)
    }
}

impl Connection for ScriptedConnection {
    fn begin(&mut self) -> BoxFuture<'_, DbResult<()>> {
        Box::pin(async move { self.shared.control("BEGIN") })
    }

    fn commit(&mut self) -> BoxFuture<'_, DbResult<()>> {
        Box::pin(async move { self.shared.control("COMMIT") })
    }

    fn rollback(&mut self) -> BoxFuture<'_, DbResult<()>> {
        Box::pin(async move { self.shared.control("ROLLBACK") })
    }

    fn execute<'a>(
        &'a mut self,
        statement: &'a SqlStatement,
    ) -> BoxFuture<'a, DbResult<ExecOutcome>> {
        Box::pin(async move {
            match self.run("EXEC", statement) {
                Some(Reply::Exec(outcome)) => Ok(outcome),
                Some(Reply::Fail(message)) => Err(DbError::backend(message)),
                _ => Ok(ExecOutcome::default()),
            }
        })
    }

    fn fetch_all<'a>(
        &'a mut self,
        statement: &'a SqlStatement,
    ) -> BoxFuture<'a, DbResult<Vec<DbRow>>> {
        Box::pin(async move {
            match self.run("FETCH", statement) {
                Some(Reply::Rows(rows)) => Ok(rows),
                Some(Reply::Fail(message)) => Err(DbError::backend(message)),
                _ => Ok(Vec::new()),
            }
        })
    }

    fn release(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move { self.shared.record(format!("RELEASE {}", self.kind)) })
    }
}

/// One row with a single column
pub fn row(column: &str, value: Value) -> DbRow {
    let mut row = DbRow::new();
    row.insert(column.to_string(), value);
    row
}

/// A `body` row holding `payload` as JSON text, the way MySQL returns it
pub fn body_row(payload: Value) -> DbRow {
    row("body", Value::String(payload.to_string()))
}

// =============================================================================
// Scripted compiler
// =============================================================================

/// Compiles `/api/<name>` to `SELECT body FROM <name>`; `/api/missing` is a 404.
/// Mutations compile to `MUTATE <METHOD> <name>` and `SELECT MUTATED <name>`.
#[derive(Clone, Default)]
pub struct ScriptedCompiler {
    mutated: Arc<Mutex<Vec<Vec<i64>>>>,
}

impl ScriptedCompiler {
    /// Keys handed to every mutation, in order
    pub fn mutated_rows(&self) -> Vec<Vec<i64>> {
        self.mutated.lock().unwrap().clone()
    }

    fn resource<'a>(&self, ctx: &'a StatementContext<'_>) -> CompilerResult<&'a str> {
        let name = ctx
            .request
            .path
            .strip_prefix(ctx.url_prefix)
            .unwrap_or_default();
        if name.is_empty() || name == "missing" {
            return Err(CompilerError::not_found(format!("Not found: {}", ctx.request.path))
                .with_code("MR404"));
        }
        Ok(name)
    }
}

impl QueryCompiler for ScriptedCompiler {
    fn fmt_statement(&self, ctx: &StatementContext<'_>) -> CompilerResult<SqlStatement> {
        let name = self.resource(ctx)?;
        Ok(SqlStatement::new(
            format!("SELECT body FROM {name}"),
            vec![json!(ctx.role)],
        ))
    }

    fn fmt_two_step_statement(
        &self,
        ctx: &StatementContext<'_>,
    ) -> CompilerResult<Box<dyn TwoStepStatement>> {
        let name = self.resource(ctx)?;
        Ok(Box::new(ScriptedMutation {
            mutate: format!("MUTATE {} {name}", ctx.request.method),
            select: format!("SELECT MUTATED {name}"),
            mutated: self.mutated.clone(),
        }))
    }
}

struct ScriptedMutation {
    mutate: String,
    select: String,
    mutated: Arc<Mutex<Vec<Vec<i64>>>>,
}

impl TwoStepStatement for ScriptedMutation {
    fn fmt_mutate(&self) -> CompilerResult<SqlStatement> {
        Ok(SqlStatement::raw(self.mutate.clone()))
    }

    fn set_mutated_rows(&mut self, ids: Vec<i64>) {
        self.mutated.lock().unwrap().push(ids);
    }

    fn fmt_select(&self) -> CompilerResult<SqlStatement> {
        Ok(SqlStatement::raw(self.select.clone()))
    }
}

/// Backend whose introspection statement is `INTROSPECT` and whose
/// compilers share one [`ScriptedCompiler`]
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    pub compiler: ScriptedCompiler,
    builds: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl CompilerBackend for ScriptedBackend {
    fn dialect(&self) -> &'static str {
        "mysql"
    }

    fn introspection_query(
        &self,
        schemas: &[String],
        permissions: &PermissionsConfig,
    ) -> CompilerResult<SqlStatement> {
        Ok(SqlStatement::new(
            "INTROSPECT",
            vec![json!(schemas), json!(permissions)],
        ))
    }

    fn build(&self, _schema: SchemaDescription) -> CompilerResult<Arc<dyn QueryCompiler>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.compiler.clone()))
    }
}

/// Loader that hands out an engine over the given compiler without touching
/// any database
pub struct StaticLoader {
    compiler: ScriptedCompiler,
    loads: AtomicUsize,
}

impl StaticLoader {
    pub fn new(compiler: ScriptedCompiler) -> Self {
        Self {
            compiler,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl EngineLoader for StaticLoader {
    fn load(&self) -> BoxFuture<'_, EngineResult<Engine>> {
        Box::pin(async move {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Engine::new(
                SchemaDescription::new(json!({ "schemas": [] })),
                Arc::new(self.compiler.clone()),
            ))
        })
    }
}

// =============================================================================
// Sleeper
// =============================================================================

/// Records requested delays and returns immediately
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        self.delays.lock().unwrap().push(duration);
        Box::pin(async {})
    }
}

// =============================================================================
// Builders
// =============================================================================

pub const SCHEMA: &str = "shop";

/// The valid introspection answer
pub fn schema_rows() -> Vec<DbRow> {
    vec![row(
        "json_schema",
        Value::String(json!({ "schemas": [{ "name": SCHEMA, "objects": [] }] }).to_string()),
    )]
}

/// Introspector over a scripted database and backend with the default
/// retry budget
pub fn introspector(
    db: &ScriptedDatabase,
    backend: &ScriptedBackend,
    sleeper: &RecordingSleeper,
    permissions: PermissionsConfig,
) -> Introspector {
    Introspector::new(
        Arc::new(db.clone()),
        Arc::new(backend.clone()),
        SCHEMA,
        permissions,
        Backoff::default(),
        Arc::new(sleeper.clone()),
    )
}

/// Executor mounted at `/api` whose engine loads without introspection
pub fn static_executor(db: &ScriptedDatabase, compiler: &ScriptedCompiler) -> RequestExecutor {
    let cache = Arc::new(SchemaCache::new(Arc::new(StaticLoader::new(
        compiler.clone(),
    ))));
    RequestExecutor::new(Arc::new(db.clone()), cache, SCHEMA, "/api")
}
