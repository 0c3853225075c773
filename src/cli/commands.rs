//! CLI command implementations
//!
//! Both commands follow the same boot sequence: environment configuration,
//! CLI overrides, logging, permissions file, lazy connection pool. The tokio
//! runtime is created here so `main` stays synchronous.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::auth::Authenticator;
use crate::compiler::basic::BasicBackend;
use crate::config::{load_permissions, AppConfig};
use crate::db::MySqlDatabase;
use crate::engine::{Backoff, EngineLoader, Introspector, SchemaCache, TokioSleeper};
use crate::observability::{init_logging, Event};
use crate::rest_api::{RequestExecutor, RestServer};

use super::args::Command;
use super::errors::{CliError, CliResult};

/// Dispatch a parsed command
pub fn run_command(command: Command) -> CliResult<()> {
    match command {
        Command::Serve {
            host,
            port,
            permissions,
        } => {
            let mut config = AppConfig::from_env()?;
            apply_overrides(&mut config, host, port, permissions);
            serve(config)
        }
        Command::Introspect { permissions } => {
            let mut config = AppConfig::from_env()?;
            apply_overrides(&mut config, None, None, permissions);
            introspect(config)
        }
    }
}

/// CLI flags win over the environment
pub fn apply_overrides(
    config: &mut AppConfig,
    host: Option<String>,
    port: Option<u16>,
    permissions: Option<PathBuf>,
) {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(path) = permissions {
        config.permissions_file = path;
    }
}

fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::io_error(format!("Failed to create tokio runtime: {}", e)))
}

/// Pool plus introspector for the configured database
fn boot(config: &AppConfig) -> CliResult<(Arc<MySqlDatabase>, Arc<Introspector>)> {
    init_logging(&config.logging)?;
    info!(event = Event::BootStart.as_str(), version = env!("CARGO_PKG_VERSION"), "Starting myrest");
    info!(
        event = Event::ConfigLoaded.as_str(),
        database = %config.database.database,
        db_host = %config.database.host,
        db_port = config.database.port,
        pool_size = config.database.pool_size,
        "Configuration loaded"
    );

    let permissions = load_permissions(&config.permissions_file)?;
    let db = Arc::new(MySqlDatabase::connect_lazy(&config.database));
    let introspector = Arc::new(Introspector::new(
        db.clone(),
        Arc::new(BasicBackend),
        config.database.database.clone(),
        permissions,
        Backoff::with_max_retries(config.introspection_max_retries),
        Arc::new(TokioSleeper),
    ));

    Ok((db, introspector))
}

/// Serve the data API until Ctrl-C. The schema is introspected by the
/// first request.
pub fn serve(config: AppConfig) -> CliResult<()> {
    runtime()?.block_on(async move {
        let (db, introspector) = boot(&config)?;

        let loader: Arc<dyn EngineLoader> = introspector;
        let cache = Arc::new(SchemaCache::new(loader));
        let executor = RequestExecutor::new(
            db.clone(),
            cache,
            config.database.database.clone(),
            &config.server.api_prefix,
        );
        let authenticator = Authenticator::from_config(&config.auth);

        let server = RestServer::new(config.server.clone(), executor, authenticator);
        let served = server.serve().await;
        db.close().await;
        served.map_err(CliError::from)
    })
}

/// Run the introspection retry loop once and print the schema description
pub fn introspect(config: AppConfig) -> CliResult<()> {
    runtime()?.block_on(async move {
        let (db, introspector) = boot(&config)?;

        let loaded = introspector.load_engine().await;
        db.close().await;
        let engine = loaded?;

        println!("{}", serde_json::to_string_pretty(engine.schema())?);
        Ok(())
    })
}
