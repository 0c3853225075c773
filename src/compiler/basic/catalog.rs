//! Schema catalog read from `information_schema`.

use serde::Deserialize;
use serde_json::Value;

use super::permissions::PermissionSet;
use crate::compiler::{CompilerError, CompilerResult, PermissionsConfig, SchemaDescription};
use crate::db::SqlStatement;

/// Builds one `json_schema` document:
/// `{"schemas": [{"name", "objects": [{"name", "kind", "columns": [...]}]}], "permissions": [...]}`.
/// Parameters: JSON array of schema names, JSON array of permission rules.
const INTROSPECTION_QUERY: &str = r#"SELECT JSON_OBJECT(
    'schemas', (
        SELECT COALESCE(JSON_ARRAYAGG(JSON_OBJECT(
            'name', s.schema_name,
            'objects', (
                SELECT COALESCE(JSON_ARRAYAGG(JSON_OBJECT(
                    'name', t.table_name,
                    'kind', IF(t.table_type = 'VIEW', 'view', 'table'),
                    'columns', (
                        SELECT COALESCE(JSON_ARRAYAGG(JSON_OBJECT(
                            'name', c.column_name,
                            'position', c.ordinal_position,
                            'data_type', c.data_type,
                            'key', c.column_key,
                            'auto_increment', c.extra LIKE '%auto_increment%'
                        )), JSON_ARRAY())
                        FROM information_schema.columns c
                        WHERE c.table_schema = t.table_schema AND c.table_name = t.table_name
                    )
                )), JSON_ARRAY())
                FROM information_schema.tables t
                WHERE t.table_schema = s.schema_name
            )
        )), JSON_ARRAY())
        FROM information_schema.schemata s
        WHERE JSON_CONTAINS(CAST(? AS JSON), JSON_QUOTE(s.schema_name))
    ),
    'permissions', CAST(? AS JSON)
) AS json_schema"#;

/// Introspection statement for the given schemas
pub fn introspection_statement(
    schemas: &[String],
    permissions: &PermissionsConfig,
) -> CompilerResult<SqlStatement> {
    let schemas = serde_json::to_string(schemas)
        .map_err(|e| CompilerError::internal(format!("Cannot encode schema list: {e}")))?;
    let permissions = serde_json::to_string(permissions)
        .map_err(|e| CompilerError::internal(format!("Cannot encode permissions: {e}")))?;

    Ok(SqlStatement::new(
        INTROSPECTION_QUERY,
        vec![Value::String(schemas), Value::String(permissions)],
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    #[default]
    Table,
    View,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbColumn {
    pub name: String,
    #[serde(default)]
    pub position: u32,
    #[serde(default)]
    pub data_type: String,
    /// `PRI`, `UNI`, `MUL` or empty
    #[serde(default)]
    pub key: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub auto_increment: bool,
}

impl DbColumn {
    pub fn is_primary_key(&self) -> bool {
        self.key == "PRI"
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self.data_type.to_ascii_lowercase().as_str(),
            "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint"
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbObject {
    pub name: String,
    #[serde(default)]
    pub kind: ObjectKind,
    #[serde(default)]
    pub columns: Vec<DbColumn>,
}

impl DbObject {
    pub fn column(&self, name: &str) -> Option<&DbColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Primary key columns in table order
    pub fn primary_key(&self) -> Vec<&DbColumn> {
        self.columns.iter().filter(|c| c.is_primary_key()).collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSchema {
    pub name: String,
    #[serde(default)]
    pub objects: Vec<DbObject>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    schemas: Vec<CatalogSchema>,
    #[serde(default)]
    permissions: Vec<Value>,
}

/// Tables, columns and access rules of the introspected schemas
#[derive(Debug, Clone)]
pub struct Catalog {
    schemas: Vec<CatalogSchema>,
    permissions: PermissionSet,
}

impl Catalog {
    pub fn from_description(description: &SchemaDescription) -> CompilerResult<Self> {
        let raw: RawCatalog = serde_json::from_value(description.as_json().clone())
            .map_err(|e| CompilerError::internal(format!("Invalid schema description: {e}")))?;

        let mut schemas = raw.schemas;
        for schema in &mut schemas {
            for object in &mut schema.objects {
                object.columns.sort_by_key(|c| c.position);
            }
        }

        Ok(Self {
            schemas,
            permissions: PermissionSet::from_rules(&raw.permissions),
        })
    }

    pub fn object(&self, schema: &str, name: &str) -> Option<&DbObject> {
        self.schemas
            .iter()
            .find(|s| s.name == schema)?
            .objects
            .iter()
            .find(|o| o.name == name)
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }
}

// MySQL hands booleans computed in SQL back as 0/1
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(flag) => flag,
        Value::Number(n) => n.as_i64().unwrap_or(0) != 0,
        _ => false,
    })
}
