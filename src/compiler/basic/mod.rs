//! # Basic MySQL Compiler
//!
//! Compiles single-table requests against `<prefix>/<table>`:
//!
//! - `GET` with `select`, `order`, `limit`, `offset` and horizontal filters
//!   (`eq`, `neq`, `gt`, `gte`, `lt`, `lte`, `like`, `in`, `is`)
//! - `POST` with an object or an array of objects
//! - `PATCH` / `PUT` with an object of new values, filtered
//! - `DELETE`, filtered
//!
//! Update and delete must carry at least one filter. Mutations need a
//! single integer primary key so their rows can be selected back; a deleted
//! row can't be, so a delete's representation is always `[]`. Inserted rows
//! are identified from the payload and the keys the database generated, never
//! from the tracking variables.

mod catalog;
mod filter;
mod parser;
mod permissions;
mod sql;

use std::sync::Arc;

use axum::http::Method;
use serde_json::{Map, Value};

pub use catalog::{Catalog, DbColumn, DbObject, ObjectKind};
pub use filter::{FilterExpr, FilterOperator};
pub use parser::{OrderBy, QueryParams, DEFAULT_LIMIT, MAX_LIMIT};
pub use permissions::{Action, PermissionRule, PermissionSet};

use super::{
    CompilerBackend, CompilerError, CompilerResult, PermissionsConfig, QueryCompiler,
    SchemaDescription, StatementContext, TwoStepStatement,
};
use crate::db::SqlStatement;

/// Backend for the basic compiler
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicBackend;

impl CompilerBackend for BasicBackend {
    fn dialect(&self) -> &'static str {
        "mysql"
    }

    fn introspection_query(
        &self,
        schemas: &[String],
        permissions: &PermissionsConfig,
    ) -> CompilerResult<SqlStatement> {
        catalog::introspection_statement(schemas, permissions)
    }

    fn build(&self, schema: SchemaDescription) -> CompilerResult<Arc<dyn QueryCompiler>> {
        Ok(Arc::new(BasicCompiler::new(Catalog::from_description(
            &schema,
        )?)))
    }
}

/// Single-table compiler over a [`Catalog`]
#[derive(Debug, Clone)]
pub struct BasicCompiler {
    catalog: Catalog,
}

struct Target<'c> {
    table: String,
    object: &'c DbObject,
}

impl BasicCompiler {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    fn resolve(&self, ctx: &StatementContext<'_>) -> CompilerResult<Target<'_>> {
        let path = ctx.request.path.trim_end_matches('/');
        let prefix = ctx.url_prefix.trim_end_matches('/');
        let name = path
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|name| !name.is_empty() && !name.contains('/'))
            .ok_or_else(|| CompilerError::not_found(format!("Not found: {}", ctx.request.path)))?;

        let object = self.catalog.object(ctx.schema, name).ok_or_else(|| {
            CompilerError::not_found(format!("Relation '{name}' does not exist"))
                .with_code("MR404")
        })?;

        Ok(Target {
            table: sql::table_ref(ctx.schema, name),
            object,
        })
    }

    fn authorize(
        &self,
        ctx: &StatementContext<'_>,
        target: &Target<'_>,
        action: Action,
    ) -> CompilerResult<()> {
        if self
            .catalog
            .permissions()
            .is_allowed(ctx.schema, &target.object.name, ctx.role, action)
        {
            return Ok(());
        }
        Err(CompilerError::forbidden(format!(
            "Permission denied: {} on '{}' for role '{}'",
            action.as_str(),
            target.object.name,
            ctx.role
        ))
        .with_code("MR403"))
    }
}

/// Columns named by `select`, in request order; all columns when absent
fn selected_columns<'o>(
    object: &'o DbObject,
    select: &Option<Vec<String>>,
) -> CompilerResult<Vec<&'o DbColumn>> {
    match select {
        None => Ok(object.columns.iter().collect()),
        Some(fields) => fields
            .iter()
            .map(|field| require_column(object, field))
            .collect(),
    }
}

fn require_column<'o>(object: &'o DbObject, name: &str) -> CompilerResult<&'o DbColumn> {
    object.column(name).ok_or_else(|| {
        CompilerError::bad_request(format!(
            "Column '{name}' does not exist on '{}'",
            object.name
        ))
        .with_code("MR400")
    })
}

fn validate_query(object: &DbObject, params: &QueryParams) -> CompilerResult<()> {
    for filter in &params.filters {
        require_column(object, &filter.field)?;
    }
    for order in &params.order {
        require_column(object, &order.field)?;
    }
    Ok(())
}

fn parse_body(ctx: &StatementContext<'_>) -> CompilerResult<Value> {
    serde_json::from_slice(&ctx.request.body)
        .map_err(|e| CompilerError::bad_request(format!("Invalid JSON body: {e}")))
}

impl QueryCompiler for BasicCompiler {
    fn fmt_statement(&self, ctx: &StatementContext<'_>) -> CompilerResult<SqlStatement> {
        let target = self.resolve(ctx)?;
        self.authorize(ctx, &target, Action::Select)?;

        let params = QueryParams::parse(&ctx.request.query)?;
        validate_query(target.object, &params)?;
        let columns = selected_columns(target.object, &params.select)?;
        sql::select(&target.table, &columns, &params)
    }

    fn fmt_two_step_statement(
        &self,
        ctx: &StatementContext<'_>,
    ) -> CompilerResult<Box<dyn TwoStepStatement>> {
        let target = self.resolve(ctx)?;
        let action = match ctx.request.method {
            Method::POST => Action::Insert,
            Method::PATCH | Method::PUT => Action::Update,
            Method::DELETE => Action::Delete,
            ref other => {
                return Err(CompilerError::bad_request(format!(
                    "Method {other} is not a mutation"
                )))
            }
        };
        self.authorize(ctx, &target, action)?;

        let object = target.object;
        let primary_key = mutation_key(object)?;

        let params = QueryParams::parse(&ctx.request.query)?;
        validate_query(object, &params)?;
        let returned = selected_columns(object, &params.select)?;

        let mut keys = MutatedKeys::Reported;
        let mutate = match action {
            Action::Insert => {
                let rows = insert_rows(parse_body(ctx)?)?;
                let columns = insert_columns(object, &rows)?;
                keys = insert_keys(
                    object,
                    primary_key,
                    &rows,
                    ctx.request.prefers_representation(),
                )?;
                sql::insert(&target.table, &columns, &rows)
            }
            Action::Update => {
                require_filters(&params, "update")?;
                let assignments = match parse_body(ctx)? {
                    Value::Object(map) if !map.is_empty() => map,
                    _ => {
                        return Err(CompilerError::bad_request(
                            "Update body must be a non-empty JSON object",
                        ))
                    }
                };
                for column in assignments.keys() {
                    require_column(object, column)?;
                }
                sql::update(&target.table, primary_key, &assignments, &params)?
            }
            Action::Delete => {
                require_filters(&params, "delete")?;
                sql::delete(&target.table, primary_key, &params)?
            }
            Action::Select => {
                return Err(CompilerError::internal("reads are not two-step statements"))
            }
        };

        Ok(Box::new(BasicMutation {
            action,
            table: target.table,
            columns: returned.into_iter().cloned().collect(),
            primary_key: primary_key.clone(),
            mutate,
            keys,
            mutated_ids: Vec::new(),
        }))
    }
}

/// The single integer primary key mutated rows are identified by
fn mutation_key(object: &DbObject) -> CompilerResult<&DbColumn> {
    let key = object.primary_key();
    match key.as_slice() {
        [] => {
            let err = CompilerError::bad_request(format!(
                "'{}' has no primary key and cannot be mutated",
                object.name
            ));
            Err(match object.kind {
                ObjectKind::View => err.with_hint("mutate the underlying table instead"),
                ObjectKind::Table => err,
            })
        }
        [column] if column.is_integer() => Ok(*column),
        [column] => Err(CompilerError::bad_request(format!(
            "'{}' has a non-integer primary key '{}' and cannot be mutated",
            object.name, column.name
        ))),
        _ => Err(CompilerError::bad_request(format!(
            "'{}' has a composite primary key and cannot be mutated",
            object.name
        ))),
    }
}

fn require_filters(params: &QueryParams, verb: &str) -> CompilerResult<()> {
    if params.filters.is_empty() {
        return Err(CompilerError::bad_request(format!(
            "Refusing to {verb} without a filter"
        ))
        .with_hint("add a filter such as ?id=eq.1"));
    }
    Ok(())
}

fn insert_rows(body: Value) -> CompilerResult<Vec<Map<String, Value>>> {
    let rows = match body {
        Value::Object(row) => vec![row],
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                _ => Err(CompilerError::bad_request(
                    "Insert body must contain only JSON objects",
                )),
            })
            .collect::<CompilerResult<Vec<_>>>()?,
        _ => {
            return Err(CompilerError::bad_request(
                "Insert body must be a JSON object or array of objects",
            ))
        }
    };

    if rows.is_empty() {
        return Err(CompilerError::bad_request("Insert body is empty"));
    }
    Ok(rows)
}

/// Union of the payload keys, in table order
fn insert_columns<'o>(
    object: &'o DbObject,
    rows: &[Map<String, Value>],
) -> CompilerResult<Vec<&'o DbColumn>> {
    for key in rows.iter().flat_map(|row| row.keys()) {
        require_column(object, key)?;
    }
    Ok(object
        .columns
        .iter()
        .filter(|c| rows.iter().any(|row| row.contains_key(&c.name)))
        .collect())
}

/// Keys an insert can vouch for. Anything else the executor reports after
/// an insert comes from tracking variables the insert never set.
fn insert_keys(
    object: &DbObject,
    primary_key: &DbColumn,
    rows: &[Map<String, Value>],
    representation: bool,
) -> CompilerResult<MutatedKeys> {
    let mut supplied = Vec::new();
    let mut generated = 0;
    for row in rows {
        match row.get(&primary_key.name) {
            None | Some(Value::Null) if primary_key.auto_increment => generated += 1,
            None if !representation => {}
            None => {
                return Err(CompilerError::bad_request(format!(
                    "Inserted rows of '{}' cannot be returned without their '{}' value",
                    object.name, primary_key.name
                ))
                .with_hint(format!("include '{}' in every row", primary_key.name)))
            }
            Some(value) => supplied.push(value.as_i64().ok_or_else(|| {
                CompilerError::bad_request(format!(
                    "'{}' must be an integer, got {value}",
                    primary_key.name
                ))
            })?),
        }
    }
    Ok(MutatedKeys::Inserted {
        supplied,
        generated,
    })
}

/// Where a mutation's keys come from
#[derive(Debug, Clone, PartialEq, Eq)]
enum MutatedKeys {
    /// As reported by the executor
    Reported,

    /// Named by the payload, plus `generated` keys from the range starting
    /// at the first generated id
    Inserted { supplied: Vec<i64>, generated: usize },
}

/// Compiled mutation awaiting its mutated keys
struct BasicMutation {
    action: Action,
    table: String,
    columns: Vec<DbColumn>,
    primary_key: DbColumn,
    mutate: SqlStatement,
    keys: MutatedKeys,
    mutated_ids: Vec<i64>,
}

impl TwoStepStatement for BasicMutation {
    fn fmt_mutate(&self) -> CompilerResult<SqlStatement> {
        Ok(self.mutate.clone())
    }

    fn set_mutated_rows(&mut self, ids: Vec<i64>) {
        self.mutated_ids = match &self.keys {
            MutatedKeys::Reported => ids,
            MutatedKeys::Inserted {
                supplied,
                generated,
            } => supplied
                .iter()
                .copied()
                .chain(ids.into_iter().take(*generated))
                .collect(),
        };
    }

    fn fmt_select(&self) -> CompilerResult<SqlStatement> {
        let columns: Vec<&DbColumn> = self.columns.iter().collect();
        let ids: &[i64] = match self.action {
            Action::Delete => &[],
            _ => &self.mutated_ids,
        };
        Ok(sql::select_by_keys(
            &self.table,
            &columns,
            &self.primary_key,
            ids,
        ))
    }
}
