//! Builds the query engine by introspecting the database.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::{error, info};

use super::backoff::{retry_with_backoff, Backoff, Sleeper};
use super::errors::{EngineError, EngineResult, IntrospectionError};
use super::{Engine, EngineLoader};
use crate::compiler::{CompilerBackend, PermissionsConfig, SchemaDescription};
use crate::db::{Database, DbRow};
use crate::observability::Event;

/// Column carrying the schema document
pub const SCHEMA_COLUMN: &str = "json_schema";

/// Introspects one schema over a dedicated connection, retrying with
/// backoff until the budget runs out.
pub struct Introspector {
    db: Arc<dyn Database>,
    backend: Arc<dyn CompilerBackend>,
    schema: String,
    permissions: PermissionsConfig,
    backoff: Backoff,
    sleeper: Arc<dyn Sleeper>,
}

impl Introspector {
    pub fn new(
        db: Arc<dyn Database>,
        backend: Arc<dyn CompilerBackend>,
        schema: impl Into<String>,
        permissions: PermissionsConfig,
        backoff: Backoff,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            db,
            backend,
            schema: schema.into(),
            permissions,
            backoff,
            sleeper,
        }
    }

    /// Introspect and build the engine
    pub async fn load_engine(&self) -> EngineResult<Engine> {
        retry_with_backoff(&self.backoff, self.sleeper.as_ref(), |attempt| {
            self.attempt(attempt)
        })
        .await
        .map_err(|exhausted| {
            error!(
                event = Event::IntrospectionFailed.as_str(),
                attempts = exhausted.attempts,
                error = %exhausted.error,
                "Schema introspection failed, giving up"
            );
            EngineError::Introspection {
                attempts: exhausted.attempts,
                source: exhausted.error,
            }
        })
    }

    async fn attempt(&self, attempt: u32) -> Result<Engine, IntrospectionError> {
        info!(
            event = Event::IntrospectionStart.as_str(),
            attempt,
            schema = %self.schema,
            dialect = self.backend.dialect(),
            "Introspecting database schema"
        );

        let statement = self
            .backend
            .introspection_query(&[self.schema.clone()], &self.permissions)?;

        let mut conn = self.db.connect_dedicated().await?;
        let rows = conn.fetch_all(&statement).await;
        conn.release().await;

        let schema = extract_schema(&rows?)?;
        let compiler = self.backend.build(schema.clone())?;
        Ok(Engine::new(schema, compiler))
    }
}

impl EngineLoader for Introspector {
    fn load(&self) -> BoxFuture<'_, EngineResult<Engine>> {
        Box::pin(self.load_engine())
    }
}

/// Pull the schema document out of the first row. Drivers hand JSON columns
/// back either decoded or as text; both are accepted.
pub fn extract_schema(rows: &[DbRow]) -> Result<SchemaDescription, IntrospectionError> {
    match rows.first().and_then(|row| row.get(SCHEMA_COLUMN)) {
        Some(Value::String(text)) => Ok(SchemaDescription::new(serde_json::from_str(text)?)),
        Some(Value::Null) | None => Err(IntrospectionError::MissingSchema),
        Some(value) => Ok(SchemaDescription::new(value.clone())),
    }
}
