//! Table-level grants from the permissions file.
//!
//! A rule looks like
//! `{"table_schema": "shop", "table_name": "products", "role": "webuser", "grant": ["select"]}`.
//! `table_schema` is optional; `grant` entries are `select`, `insert`,
//! `update`, `delete` or `all`. With no rules at all every request is
//! allowed; once any rule exists, access requires a matching grant.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Select,
    Insert,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Select => "select",
            Action::Insert => "insert",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PermissionRule {
    #[serde(default)]
    pub table_schema: Option<String>,
    pub table_name: String,
    pub role: String,
    #[serde(default)]
    pub grant: Vec<String>,
}

impl PermissionRule {
    fn matches(&self, schema: &str, table: &str, role: &str, action: Action) -> bool {
        self.role == role
            && self.table_name == table
            && self.table_schema.as_deref().map_or(true, |s| s == schema)
            && self.grant.iter().any(|g| {
                g.eq_ignore_ascii_case("all") || g.eq_ignore_ascii_case(action.as_str())
            })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PermissionSet {
    restricted: bool,
    rules: Vec<PermissionRule>,
}

impl PermissionSet {
    /// Entries that are not table grants are skipped; they still switch the
    /// set into restricted mode.
    pub fn from_rules(raw: &[Value]) -> Self {
        let rules = raw
            .iter()
            .filter_map(|value| match serde_json::from_value(value.clone()) {
                Ok(rule) => Some(rule),
                Err(err) => {
                    debug!(error = %err, "Skipping unrecognized permission entry");
                    None
                }
            })
            .collect();

        Self {
            restricted: !raw.is_empty(),
            rules,
        }
    }

    pub fn is_allowed(&self, schema: &str, table: &str, role: &str, action: Action) -> bool {
        !self.restricted
            || self
                .rules
                .iter()
                .any(|rule| rule.matches(schema, table, role, action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_set_allows_everything() {
        let set = PermissionSet::from_rules(&[]);
        assert!(set.is_allowed("shop", "products", "webuser", Action::Delete));
    }

    #[test]
    fn test_grants_are_per_action_and_role() {
        let set = PermissionSet::from_rules(&[
            json!({ "table_name": "products", "role": "webuser", "grant": ["select"] }),
            json!({ "table_schema": "shop", "table_name": "products", "role": "admin", "grant": ["all"] }),
        ]);

        assert!(set.is_allowed("shop", "products", "webuser", Action::Select));
        assert!(!set.is_allowed("shop", "products", "webuser", Action::Insert));
        assert!(set.is_allowed("shop", "products", "admin", Action::Delete));
        assert!(!set.is_allowed("other", "products", "admin", Action::Delete));
        assert!(!set.is_allowed("shop", "orders", "webuser", Action::Select));
    }

    #[test]
    fn test_unrecognized_entries_still_restrict() {
        let set = PermissionSet::from_rules(&[json!({ "policy_for": ["webuser"] })]);
        assert!(!set.is_allowed("shop", "products", "webuser", Action::Select));
    }
}
