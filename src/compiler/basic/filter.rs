//! # Filter Expression AST
//!
//! Represents horizontal filters (`column=op.value`) and renders them as
//! parameterized SQL conditions.

use serde_json::Value;

use super::sql::quote_ident;
use crate::compiler::{CompilerError, CompilerResult};

/// Filter operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    /// Equals
    Eq,

    /// Not equals
    Neq,

    /// Greater than
    Gt,

    /// Greater than or equal
    Gte,

    /// Less than
    Lt,

    /// Less than or equal
    Lte,

    /// Pattern match (LIKE), `*` as wildcard
    Like,

    /// Value in list
    In,

    /// IS NULL / TRUE / FALSE
    Is,
}

impl FilterOperator {
    pub fn parse(op: &str) -> Option<Self> {
        let op = match op {
            "eq" => FilterOperator::Eq,
            "neq" => FilterOperator::Neq,
            "gt" => FilterOperator::Gt,
            "gte" => FilterOperator::Gte,
            "lt" => FilterOperator::Lt,
            "lte" => FilterOperator::Lte,
            "like" => FilterOperator::Like,
            "in" => FilterOperator::In,
            "is" => FilterOperator::Is,
            _ => return None,
        };
        Some(op)
    }

    /// Get the operator string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Like => "like",
            FilterOperator::In => "in",
            FilterOperator::Is => "is",
        }
    }

    fn comparison(&self) -> Option<&'static str> {
        match self {
            FilterOperator::Eq => Some("="),
            FilterOperator::Neq => Some("<>"),
            FilterOperator::Gt => Some(">"),
            FilterOperator::Gte => Some(">="),
            FilterOperator::Lt => Some("<"),
            FilterOperator::Lte => Some("<="),
            FilterOperator::Like => Some("LIKE"),
            FilterOperator::In | FilterOperator::Is => None,
        }
    }
}

/// A filter expression
#[derive(Debug, Clone, PartialEq)]
pub struct FilterExpr {
    /// Field to filter on
    pub field: String,

    /// Comparison operator
    pub operator: FilterOperator,

    /// String for comparisons, array of strings for `in`,
    /// null or bool for `is`
    pub value: Value,
}

impl FilterExpr {
    /// Create a new filter expression
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Render as a SQL condition on `alias.column`, pushing bound values
    pub fn to_sql(&self, alias: Option<&str>, params: &mut Vec<Value>) -> CompilerResult<String> {
        let column = match alias {
            Some(alias) => format!("{alias}.{}", quote_ident(&self.field)),
            None => quote_ident(&self.field),
        };

        if let Some(op) = self.operator.comparison() {
            params.push(self.value.clone());
            return Ok(format!("{column} {op} ?"));
        }

        match (self.operator, &self.value) {
            (FilterOperator::In, Value::Array(items)) if items.is_empty() => Ok("1 = 0".to_string()),
            (FilterOperator::In, Value::Array(items)) => {
                params.extend(items.iter().cloned());
                let placeholders = vec!["?"; items.len()].join(", ");
                Ok(format!("{column} IN ({placeholders})"))
            }
            (FilterOperator::Is, Value::Null) => Ok(format!("{column} IS NULL")),
            (FilterOperator::Is, Value::Bool(true)) => Ok(format!("{column} IS TRUE")),
            (FilterOperator::Is, Value::Bool(false)) => Ok(format!("{column} IS FALSE")),
            _ => Err(CompilerError::bad_request(format!(
                "Invalid value for operator '{}' on '{}'",
                self.operator.as_str(),
                self.field
            ))),
        }
    }
}

/// AND all filters together. Returns an empty string when there are none.
pub fn where_clause(
    filters: &[FilterExpr],
    alias: Option<&str>,
    params: &mut Vec<Value>,
) -> CompilerResult<String> {
    let conditions = filters
        .iter()
        .map(|f| f.to_sql(alias, params))
        .collect::<CompilerResult<Vec<_>>>()?;
    Ok(conditions.join(" AND "))
}
