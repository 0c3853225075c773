//! # Query Engine
//!
//! The compiled view of the database schema: the introspected schema
//! description plus the compiler built from it. Built once per process by
//! [`SchemaCache`] and shared by every request.

mod backoff;
mod cache;
mod errors;
mod introspection;

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

pub use backoff::{retry_with_backoff, Backoff, Exhausted, Sleeper, TokioSleeper};
pub use cache::SchemaCache;
pub use errors::{EngineError, EngineResult, IntrospectionError};
pub use introspection::{extract_schema, Introspector, SCHEMA_COLUMN};

use crate::compiler::{QueryCompiler, SchemaDescription};

/// Schema description and its compiler
pub struct Engine {
    schema: Arc<SchemaDescription>,
    compiler: Arc<dyn QueryCompiler>,
}

impl Engine {
    pub fn new(schema: SchemaDescription, compiler: Arc<dyn QueryCompiler>) -> Self {
        Self {
            schema: Arc::new(schema),
            compiler,
        }
    }

    pub fn schema(&self) -> &SchemaDescription {
        &self.schema
    }

    pub fn compiler(&self) -> &dyn QueryCompiler {
        self.compiler.as_ref()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// Produces a fresh engine. Implemented by [`Introspector`].
pub trait EngineLoader: Send + Sync {
    fn load(&self) -> BoxFuture<'_, EngineResult<Engine>>;
}
