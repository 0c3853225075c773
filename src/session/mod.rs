//! # Session Context
//!
//! Request metadata exposed to SQL as MySQL user variables. Each request
//! sets them on its connection inside the transaction, before the compiled
//! statement runs:
//!
//! | variable               | value                                  |
//! |------------------------|----------------------------------------|
//! | `@role`                | effective role                         |
//! | `@request.method`      | HTTP method                            |
//! | `@request.headers`     | JSON object, lower-cased header names  |
//! | `@request.get`         | JSON object of query parameters        |
//! | `@request.jwt.claims`  | JSON object of verified token claims   |

use axum::http::HeaderMap;
use serde_json::{Map, Value};

use crate::db::SqlStatement;

pub const ROLE_KEY: &str = "role";
pub const METHOD_KEY: &str = "request.method";
pub const HEADERS_KEY: &str = "request.headers";
pub const QUERY_KEY: &str = "request.get";
pub const CLAIMS_KEY: &str = "request.jwt.claims";

/// Ordered session variables for one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionEnvironment(Vec<(String, String)>);

impl SessionEnvironment {
    pub fn entries(&self) -> &[(String, String)] {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Build the session variables for a request. Always yields the same five
/// keys in the same order.
pub fn build_environment(
    role: &str,
    method: &str,
    headers: &HeaderMap,
    query: &[(String, String)],
    claims: &Value,
) -> SessionEnvironment {
    SessionEnvironment(vec![
        (ROLE_KEY.to_string(), role.to_string()),
        (METHOD_KEY.to_string(), method.to_string()),
        (HEADERS_KEY.to_string(), headers_json(headers)),
        (QUERY_KEY.to_string(), query_json(query)),
        (CLAIMS_KEY.to_string(), claims_json(claims)),
    ])
}

/// Compile the environment into one `SET` statement with bound values
pub fn compile_session_statement(env: &SessionEnvironment) -> SqlStatement {
    let assignments: Vec<String> = env
        .entries()
        .iter()
        .map(|(name, _)| format!("@`{}` = ?", name.replace('`', "``")))
        .collect();
    let parameters = env
        .entries()
        .iter()
        .map(|(_, value)| Value::String(value.clone()))
        .collect();

    SqlStatement::new(format!("SET {}", assignments.join(", ")), parameters)
}

// repeated headers are joined with ", "
fn headers_json(headers: &HeaderMap) -> String {
    let mut object = Map::new();
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        object.insert(name.as_str().to_ascii_lowercase(), Value::String(joined));
    }
    Value::Object(object).to_string()
}

// last occurrence wins
fn query_json(query: &[(String, String)]) -> String {
    let mut object = Map::new();
    for (key, value) in query {
        object.insert(key.clone(), Value::String(value.clone()));
    }
    Value::Object(object).to_string()
}

fn claims_json(claims: &Value) -> String {
    match claims {
        Value::Object(_) => claims.to_string(),
        _ => "{}".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn sample_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.append("accept", HeaderValue::from_static("text/html"));
        headers.append("accept", HeaderValue::from_static("application/json"));
        headers
    }

    #[test]
    fn test_environment_has_fixed_keys_in_order() {
        let env = build_environment("webuser", "GET", &HeaderMap::new(), &[], &json!({}));
        let keys: Vec<&str> = env.entries().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![ROLE_KEY, METHOD_KEY, HEADERS_KEY, QUERY_KEY, CLAIMS_KEY]
        );
        assert_eq!(env.get(ROLE_KEY), Some("webuser"));
        assert_eq!(env.get(CLAIMS_KEY), Some("{}"));
    }

    #[test]
    fn test_headers_are_joined_and_lowercased() {
        let env = build_environment("webuser", "GET", &sample_headers(), &[], &json!({}));
        let headers: Value = serde_json::from_str(env.get(HEADERS_KEY).unwrap()).unwrap();
        assert_eq!(headers["accept"], "text/html, application/json");
        assert_eq!(headers["content-type"], "application/json");
    }

    #[test]
    fn test_query_last_value_wins() {
        let query = vec![
            ("id".to_string(), "eq.1".to_string()),
            ("select".to_string(), "id,name".to_string()),
            ("id".to_string(), "eq.2".to_string()),
        ];
        let env = build_environment("webuser", "GET", &HeaderMap::new(), &query, &json!({}));
        let get: Value = serde_json::from_str(env.get(QUERY_KEY).unwrap()).unwrap();
        assert_eq!(get, json!({ "id": "eq.2", "select": "id,name" }));
    }

    #[test]
    fn test_claims_are_passed_through() {
        let claims = json!({ "sub": "42", "role": "admin" });
        let env = build_environment("admin", "POST", &HeaderMap::new(), &[], &claims);
        let decoded: Value = serde_json::from_str(env.get(CLAIMS_KEY).unwrap()).unwrap();
        assert_eq!(decoded, claims);
        assert_eq!(env.get(METHOD_KEY), Some("POST"));
    }

    #[test]
    fn test_statement_binds_every_value() {
        let env = build_environment("webuser", "GET", &HeaderMap::new(), &[], &json!({}));
        let stmt = compile_session_statement(&env);

        assert_eq!(
            stmt.query,
            "SET @`role` = ?, @`request.method` = ?, @`request.headers` = ?, \
             @`request.get` = ?, @`request.jwt.claims` = ?"
        );
        assert_eq!(stmt.parameters.len(), 5);
        assert_eq!(stmt.parameters[0], json!("webuser"));
    }

    #[test]
    fn test_backticks_in_names_are_escaped() {
        let env = SessionEnvironment(vec![("we`ird".to_string(), "x".to_string())]);
        let stmt = compile_session_statement(&env);
        assert_eq!(stmt.query, "SET @`we``ird` = ?");
    }
}
