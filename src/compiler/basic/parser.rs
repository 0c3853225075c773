//! # Query Parameter Parser
//!
//! Parses PostgREST-style query parameters into structured queries.

use serde_json::Value;

use super::filter::{FilterExpr, FilterOperator};
use crate::compiler::{CompilerError, CompilerResult};

/// Maximum number of records that can be returned
pub const MAX_LIMIT: usize = 1000;

/// Default limit if not specified
pub const DEFAULT_LIMIT: usize = 100;

/// Parsed query parameters
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParams {
    /// Fields to select (None = all)
    pub select: Option<Vec<String>>,

    /// Filter expressions
    pub filters: Vec<FilterExpr>,

    /// Order by clauses
    pub order: Vec<OrderBy>,

    /// Number of records to return
    pub limit: usize,

    /// Number of records to skip
    pub offset: usize,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            select: None,
            filters: Vec::new(),
            order: Vec::new(),
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

/// Order by clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub ascending: bool,
}

impl QueryParams {
    /// Parse query parameters in arrival order
    pub fn parse(params: &[(String, String)]) -> CompilerResult<Self> {
        let mut result = QueryParams::default();

        for (key, value) in params {
            match key.as_str() {
                "select" => result.select = parse_select(value)?,
                "order" => result.order = parse_order(value)?,
                "limit" => result.limit = parse_count("limit", value)?,
                "offset" => result.offset = parse_count("offset", value)?,
                _ => result.filters.push(parse_filter(key, value)?),
            }
        }

        // Enforce maximum limit
        if result.limit > MAX_LIMIT {
            return Err(CompilerError::bad_request(format!(
                "Limit {} exceeds maximum {}",
                result.limit, MAX_LIMIT
            )));
        }

        Ok(result)
    }
}

/// Parse select parameter (comma-separated field list)
fn parse_select(value: &str) -> CompilerResult<Option<Vec<String>>> {
    if value.trim() == "*" {
        return Ok(None);
    }

    let fields: Vec<String> = value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if fields.is_empty() {
        return Err(CompilerError::bad_request("select cannot be empty"));
    }
    if let Some(field) = fields.iter().find(|f| f.contains(['(', ')', ':'])) {
        return Err(CompilerError::bad_request(format!(
            "Unsupported select item '{field}'"
        ))
        .with_hint("resource embedding, aliases and casts are not supported"));
    }
    if fields.iter().any(|f| f == "*") {
        return Ok(None);
    }

    Ok(Some(fields))
}

/// Parse order parameter (comma-separated field.direction)
fn parse_order(value: &str) -> CompilerResult<Vec<OrderBy>> {
    let mut orders = Vec::new();

    for part in value.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let (field, ascending) = match part.rsplit_once('.') {
            Some((field, direction)) => {
                let ascending = match direction.to_lowercase().as_str() {
                    "asc" => true,
                    "desc" => false,
                    _ => {
                        return Err(CompilerError::bad_request(format!(
                            "Invalid order direction: {direction}"
                        )))
                    }
                };
                (field.to_string(), ascending)
            }
            // Default to ascending
            None => (part.to_string(), true),
        };

        orders.push(OrderBy { field, ascending });
    }

    Ok(orders)
}

fn parse_count(name: &str, value: &str) -> CompilerResult<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| CompilerError::bad_request(format!("Invalid {name}: {value}")))
}

/// Parse a filter expression from `field=op.value`
fn parse_filter(field: &str, value: &str) -> CompilerResult<FilterExpr> {
    let (op_str, operand) = value.split_once('.').ok_or_else(|| {
        CompilerError::bad_request(format!("Invalid filter on '{field}': expected operator.value"))
    })?;
    let operator = FilterOperator::parse(op_str).ok_or_else(|| {
        CompilerError::bad_request(format!("Unknown operator '{op_str}' on '{field}'"))
    })?;

    let value = match operator {
        FilterOperator::In => parse_in_list(field, operand)?,
        FilterOperator::Is => parse_is_value(field, operand)?,
        FilterOperator::Like => Value::String(operand.replace('*', "%")),
        _ => Value::String(operand.to_string()),
    };

    Ok(FilterExpr::new(field, operator, value))
}

/// `(a,b,"c,d")` -> ["a", "b", "c,d"]
fn parse_in_list(field: &str, operand: &str) -> CompilerResult<Value> {
    let inner = operand
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| {
            CompilerError::bad_request(format!("Invalid list for '{field}': expected (a,b,...)"))
        })?;

    let mut items = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for ch in inner.chars() {
        match ch {
            '"' => quoted = !quoted,
            ',' if !quoted => items.push(Value::String(std::mem::take(&mut current))),
            _ => current.push(ch),
        }
    }
    if !current.is_empty() || !items.is_empty() {
        items.push(Value::String(current));
    }

    Ok(Value::Array(items))
}

fn parse_is_value(field: &str, operand: &str) -> CompilerResult<Value> {
    match operand.to_lowercase().as_str() {
        "null" => Ok(Value::Null),
        "true" => Ok(Value::Bool(true)),
        "false" => Ok(Value::Bool(false)),
        _ => Err(CompilerError::bad_request(format!(
            "Invalid value for 'is' on '{field}': {operand}"
        ))),
    }
}
