//! MySQL sessions on top of sqlx.
//!
//! Transaction control goes over the text protocol on the raw connection
//! rather than through `sqlx::Transaction`, so the executor keeps explicit
//! control over when `COMMIT` and `ROLLBACK` are sent.

use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::{Number, Value};
use sqlx::mysql::{
    MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlPool, MySqlPoolOptions, MySqlRow,
    MySqlSslMode,
};
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::{Column, Connection as _, Executor, MySql, Row, TypeInfo, ValueRef};
use tracing::debug;

use super::errors::{DbError, DbResult};
use super::{Connection, Database, DbRow, ExecOutcome, SqlStatement};
use crate::config::{DatabaseConfig, SslMode};

/// Pooled MySQL access
#[derive(Debug, Clone)]
pub struct MySqlDatabase {
    pool: MySqlPool,
    options: MySqlConnectOptions,
    connect_timeout: Duration,
}

impl MySqlDatabase {
    /// Build the pool. No connection is opened until the first request.
    pub fn connect_lazy(config: &DatabaseConfig) -> Self {
        let options = connect_options(config);
        let pool = MySqlPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(config.connect_timeout)
            .connect_lazy_with(options.clone());

        Self {
            pool,
            options,
            connect_timeout: config.connect_timeout,
        }
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl Database for MySqlDatabase {
    fn acquire(&self) -> BoxFuture<'_, DbResult<Box<dyn Connection>>> {
        Box::pin(async move {
            let conn = self.pool.acquire().await?;
            Ok(Box::new(MySqlSession::new(Handle::Pooled(conn))) as Box<dyn Connection>)
        })
    }

    fn connect_dedicated(&self) -> BoxFuture<'_, DbResult<Box<dyn Connection>>> {
        Box::pin(async move {
            let conn = tokio::time::timeout(
                self.connect_timeout,
                MySqlConnection::connect_with(&self.options),
            )
            .await
            .map_err(|_| DbError::ConnectTimeout(self.connect_timeout))??;
            Ok(Box::new(MySqlSession::new(Handle::Dedicated(conn))) as Box<dyn Connection>)
        })
    }
}

fn connect_options(config: &DatabaseConfig) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .database(&config.database)
        .ssl_mode(config.ssl_mode.into());

    if !config.password.is_empty() {
        options = options.password(&config.password);
    }
    if let Some(ca) = &config.ssl_ca {
        options = options.ssl_ca(ca);
    }
    options
}

impl From<SslMode> for MySqlSslMode {
    fn from(mode: SslMode) -> Self {
        match mode {
            SslMode::Disabled => MySqlSslMode::Disabled,
            SslMode::Preferred => MySqlSslMode::Preferred,
            SslMode::Required => MySqlSslMode::Required,
            SslMode::VerifyCa => MySqlSslMode::VerifyCa,
            SslMode::VerifyIdentity => MySqlSslMode::VerifyIdentity,
        }
    }
}

enum Handle {
    Pooled(PoolConnection<MySql>),
    Dedicated(MySqlConnection),
}

struct MySqlSession {
    handle: Option<Handle>,
    in_transaction: bool,
}

impl MySqlSession {
    fn new(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
            in_transaction: false,
        }
    }

    fn raw(&mut self) -> DbResult<&mut MySqlConnection> {
        match self.handle.as_mut() {
            Some(Handle::Pooled(conn)) => Ok(&mut **conn),
            Some(Handle::Dedicated(conn)) => Ok(conn),
            None => Err(DbError::Released),
        }
    }

    async fn control(&mut self, command: &'static str) -> DbResult<()> {
        self.raw()?.execute(command).await?;
        Ok(())
    }
}

impl Connection for MySqlSession {
    fn begin(&mut self) -> BoxFuture<'_, DbResult<()>> {
        Box::pin(async move {
            self.control("BEGIN").await?;
            self.in_transaction = true;
            Ok(())
        })
    }

    fn commit(&mut self) -> BoxFuture<'_, DbResult<()>> {
        Box::pin(async move {
            self.control("COMMIT").await?;
            self.in_transaction = false;
            Ok(())
        })
    }

    fn rollback(&mut self) -> BoxFuture<'_, DbResult<()>> {
        Box::pin(async move {
            self.control("ROLLBACK").await?;
            self.in_transaction = false;
            Ok(())
        })
    }

    fn execute<'a>(
        &'a mut self,
        statement: &'a SqlStatement,
    ) -> BoxFuture<'a, DbResult<ExecOutcome>> {
        Box::pin(async move {
            let conn = self.raw()?;
            let result = bind_parameters(sqlx::query(&statement.query), &statement.parameters)
                .execute(conn)
                .await?;
            Ok(ExecOutcome {
                last_insert_id: result.last_insert_id(),
                rows_affected: result.rows_affected(),
            })
        })
    }

    fn fetch_all<'a>(
        &'a mut self,
        statement: &'a SqlStatement,
    ) -> BoxFuture<'a, DbResult<Vec<DbRow>>> {
        Box::pin(async move {
            let conn = self.raw()?;
            let rows = bind_parameters(sqlx::query(&statement.query), &statement.parameters)
                .fetch_all(conn)
                .await?;
            rows.iter().map(decode_row).collect()
        })
    }

    fn release(mut self: Box<Self>) -> BoxFuture<'static, ()> {
        let handle = self.handle.take();
        let in_transaction = self.in_transaction;
        Box::pin(async move {
            match handle {
                Some(Handle::Pooled(mut conn)) => {
                    // never hand an open transaction to the next request
                    if in_transaction {
                        conn.close_on_drop();
                    }
                }
                Some(Handle::Dedicated(conn)) => {
                    if let Err(err) = conn.close().await {
                        debug!(error = %err, "Failed to close dedicated connection");
                    }
                }
                None => {}
            }
        })
    }
}

impl Drop for MySqlSession {
    fn drop(&mut self) {
        if self.in_transaction {
            if let Some(Handle::Pooled(conn)) = self.handle.as_mut() {
                conn.close_on_drop();
            }
        }
    }
}

fn bind_parameters<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    parameters: &'q [Value],
) -> Query<'q, MySql, MySqlArguments> {
    for parameter in parameters {
        query = match parameter {
            Value::Null => query.bind(None::<String>),
            Value::Bool(flag) => query.bind(*flag),
            Value::Number(number) => {
                if let Some(signed) = number.as_i64() {
                    query.bind(signed)
                } else if let Some(unsigned) = number.as_u64() {
                    query.bind(unsigned)
                } else {
                    query.bind(number.as_f64())
                }
            }
            Value::String(text) => query.bind(text.as_str()),
            nested => query.bind(nested.to_string()),
        };
    }
    query
}

fn decode_row(row: &MySqlRow) -> DbResult<DbRow> {
    let mut decoded = DbRow::new();
    for column in row.columns() {
        let value = decode_column(row, column.ordinal(), column.type_info().name()).map_err(
            |source| DbError::Decode {
                column: column.name().to_string(),
                source,
            },
        )?;
        decoded.insert(column.name().to_string(), value);
    }
    Ok(decoded)
}

fn decode_column(row: &MySqlRow, index: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }

    let value = match type_name {
        "BOOLEAN" => Value::Bool(row.try_get(index)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            Value::from(row.try_get::<i64, _>(index)?)
        }
        name if name.ends_with(" UNSIGNED") => Value::from(row.try_get::<u64, _>(index)?),
        "FLOAT" | "DOUBLE" => Number::from_f64(row.try_get::<f64, _>(index)?)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "JSON" => row.try_get::<Value, _>(index)?,
        _ => Value::String(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_mode_mapping() {
        assert!(matches!(
            MySqlSslMode::from(SslMode::Disabled),
            MySqlSslMode::Disabled
        ));
        assert!(matches!(
            MySqlSslMode::from(SslMode::VerifyIdentity),
            MySqlSslMode::VerifyIdentity
        ));
    }

    #[tokio::test]
    async fn test_lazy_pool_does_not_connect() {
        let config = DatabaseConfig {
            database: "shop".to_string(),
            ..DatabaseConfig::default()
        };
        let db = MySqlDatabase::connect_lazy(&config);
        assert_eq!(db.pool.size(), 0);
        db.close().await;
    }
}
