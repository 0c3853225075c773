//! MySQL statement text.
//!
//! Reads and representation selects aggregate their rows into a single
//! `body` column holding a JSON array. Update and delete statements record
//! every touched primary key in `@subzero_ids`, re-initializing it (and
//! `@subzero_ignored_ids`) within the same statement so values left on a
//! pooled connection by an earlier request are never read back. Inserts
//! leave both untouched.

use serde_json::Value;

use super::catalog::DbColumn;
use super::filter::where_clause;
use super::parser::{OrderBy, QueryParams};
use crate::compiler::CompilerResult;
use crate::db::SqlStatement;

/// Alias of the target table in generated statements
pub const TARGET: &str = "_t";

const RESET_TRACKING: &str =
    "(SELECT @subzero_ids := JSON_ARRAY(), @subzero_ignored_ids := JSON_ARRAY()) AS _init";

pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

pub fn table_ref(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

fn column_list(columns: &[&DbColumn]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn aggregate_body(columns: &[&DbColumn], inner: &str) -> String {
    let pairs = columns
        .iter()
        .map(|c| format!("{}, {TARGET}.{}", quote_literal(&c.name), quote_ident(&c.name)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "SELECT CAST(COALESCE(JSON_ARRAYAGG(JSON_OBJECT({pairs})), JSON_ARRAY()) AS CHAR) AS body \
         FROM ({inner}) AS {TARGET}"
    )
}

fn order_clause(order: &[OrderBy]) -> String {
    if order.is_empty() {
        return String::new();
    }
    let items = order
        .iter()
        .map(|o| {
            format!(
                "{} {}",
                quote_ident(&o.field),
                if o.ascending { "ASC" } else { "DESC" }
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(" ORDER BY {items}")
}

/// Filtered, ordered, paginated read
pub fn select(
    table: &str,
    columns: &[&DbColumn],
    params: &QueryParams,
) -> CompilerResult<SqlStatement> {
    let mut bound = Vec::new();
    let conditions = where_clause(&params.filters, None, &mut bound)?;

    let mut inner = format!("SELECT {} FROM {table}", column_list(columns));
    if !conditions.is_empty() {
        inner.push_str(&format!(" WHERE {conditions}"));
    }
    inner.push_str(&order_clause(&params.order));
    inner.push_str(&format!(" LIMIT {} OFFSET {}", params.limit, params.offset));

    Ok(SqlStatement::new(aggregate_body(columns, &inner), bound))
}

/// Rows whose primary key is in `ids`
pub fn select_by_keys(
    table: &str,
    columns: &[&DbColumn],
    primary_key: &DbColumn,
    ids: &[i64],
) -> SqlStatement {
    let pk = quote_ident(&primary_key.name);
    let condition = if ids.is_empty() {
        "1 = 0".to_string()
    } else {
        format!("{pk} IN ({})", vec!["?"; ids.len()].join(", "))
    };
    let inner = format!(
        "SELECT {} FROM {table} WHERE {condition} ORDER BY {pk}",
        column_list(columns)
    );
    let bound = ids.iter().map(|id| Value::from(*id)).collect();
    SqlStatement::new(aggregate_body(columns, &inner), bound)
}

/// Multi-row insert; keys missing from a row take the column default
pub fn insert(
    table: &str,
    columns: &[&DbColumn],
    rows: &[serde_json::Map<String, Value>],
) -> SqlStatement {
    let mut bound = Vec::new();
    let tuples = rows
        .iter()
        .map(|row| {
            let values = columns
                .iter()
                .map(|c| match row.get(&c.name) {
                    Some(value) => {
                        bound.push(value.clone());
                        "?"
                    }
                    None => "DEFAULT",
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("({values})")
        })
        .collect::<Vec<_>>()
        .join(", ");

    SqlStatement::new(
        format!(
            "INSERT INTO {table} ({}) VALUES {tuples}",
            column_list(columns)
        ),
        bound,
    )
}

fn track_key(primary_key: &DbColumn) -> String {
    let pk = format!("{TARGET}.{}", quote_ident(&primary_key.name));
    format!("JSON_LENGTH(@subzero_ids := JSON_ARRAY_APPEND(@subzero_ids, '$', {pk})) > 0")
}

/// Update of every row matching the filters
pub fn update(
    table: &str,
    primary_key: &DbColumn,
    assignments: &serde_json::Map<String, Value>,
    params: &QueryParams,
) -> CompilerResult<SqlStatement> {
    let mut bound = Vec::new();
    let mut sets = Vec::new();
    for (column, value) in assignments {
        sets.push(format!("{TARGET}.{} = ?", quote_ident(column)));
        bound.push(value.clone());
    }
    let pk = format!("{TARGET}.{}", quote_ident(&primary_key.name));
    sets.push(format!(
        "{pk} = IF({}, {pk}, {pk})",
        track_key(primary_key)
    ));

    let conditions = where_clause(&params.filters, Some(TARGET), &mut bound)?;
    Ok(SqlStatement::new(
        format!(
            "UPDATE {table} AS {TARGET}, {RESET_TRACKING} SET {} WHERE {conditions}",
            sets.join(", ")
        ),
        bound,
    ))
}

/// Delete of every row matching the filters
pub fn delete(
    table: &str,
    primary_key: &DbColumn,
    params: &QueryParams,
) -> CompilerResult<SqlStatement> {
    let mut bound = Vec::new();
    let conditions = where_clause(&params.filters, Some(TARGET), &mut bound)?;
    Ok(SqlStatement::new(
        format!(
            "DELETE {TARGET} FROM {table} AS {TARGET}, {RESET_TRACKING} \
             WHERE ({conditions}) AND {}",
            track_key(primary_key)
        ),
        bound,
    ))
}
