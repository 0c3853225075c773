//! Transactional Request Executor Tests
//!
//! Every request runs on one pooled connection inside one transaction:
//! - session variables are set before any compiled statement
//! - success commits, any failure rolls back exactly once and never commits
//! - the connection is released exactly once on every path
//! - mutated keys come from the insert id or from the session variables

mod support;

use axum::http::{HeaderValue, Method, StatusCode};
use futures_util::future::join_all;
use serde_json::{json, Value};

use myrest::auth::AuthContext;
use myrest::db::ExecOutcome;
use myrest::rest_api::{ApiError, ApiRequest, PREFER};

use support::{body_row, row, static_executor, Reply, ScriptedCompiler, ScriptedDatabase};

fn anonymous() -> AuthContext {
    AuthContext::anonymous("webuser")
}

fn representation(request: ApiRequest) -> ApiRequest {
    request.with_header(PREFER, HeaderValue::from_static("return=representation"))
}

// =============================================================================
// Reads
// =============================================================================

#[tokio::test]
async fn test_read_runs_in_one_committed_transaction() {
    let db = ScriptedDatabase::new();
    db.on(
        "FETCH SELECT body FROM items",
        Reply::Rows(vec![body_row(json!([{ "id": 1 }]))]),
    );
    let executor = static_executor(&db, &ScriptedCompiler::default());

    let payload = executor
        .execute(&ApiRequest::new(Method::GET, "/api/items"), &anonymous())
        .await
        .unwrap();

    assert_eq!(payload, json!([{ "id": 1 }]));
    let journal = db.journal();
    assert_eq!(journal.len(), 6, "{journal:?}");
    assert_eq!(journal[0], "ACQUIRE");
    assert_eq!(journal[1], "BEGIN");
    assert!(journal[2].starts_with("EXEC SET @`role` = ?, @`request.method` = ?"));
    assert_eq!(journal[3], "FETCH SELECT body FROM items");
    assert_eq!(journal[4], "COMMIT");
    assert_eq!(journal[5], "RELEASE pooled");
}

#[tokio::test]
async fn test_read_without_rows_is_null() {
    let db = ScriptedDatabase::new();
    let executor = static_executor(&db, &ScriptedCompiler::default());

    let payload = executor
        .execute(&ApiRequest::new(Method::GET, "/api/items"), &anonymous())
        .await
        .unwrap();

    assert_eq!(payload, Value::Null);
    assert_eq!(db.count("COMMIT"), 1);
}

#[tokio::test]
async fn test_session_variables_carry_request_context() {
    let db = ScriptedDatabase::new();
    let executor = static_executor(&db, &ScriptedCompiler::default());
    let request = ApiRequest::new(Method::GET, "/api/items")
        .with_query("id", "eq.1")
        .with_header(
            axum::http::header::ACCEPT,
            HeaderValue::from_static("application/json"),
        );

    executor.execute(&request, &anonymous()).await.unwrap();

    let set = &db.statements()[0];
    assert!(set.query.starts_with("SET "));
    assert_eq!(
        set.parameters,
        vec![
            json!("webuser"),
            json!("GET"),
            json!(r#"{"accept":"application/json"}"#),
            json!(r#"{"id":"eq.1"}"#),
            json!("{}"),
        ]
    );
    // the compiled statement sees the same role
    assert_eq!(db.statements()[1].parameters, vec![json!("webuser")]);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_compile_error_rolls_back_and_releases() {
    let db = ScriptedDatabase::new();
    let executor = static_executor(&db, &ScriptedCompiler::default());

    let err = executor
        .execute(&ApiRequest::new(Method::GET, "/api/missing"), &anonymous())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Compiler(_)));
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(db.count("ROLLBACK"), 1);
    assert_eq!(db.count("COMMIT"), 0);
    assert_eq!(db.count("RELEASE"), 1);
}

#[tokio::test]
async fn test_statement_failure_rolls_back_once() {
    let db = ScriptedDatabase::new();
    db.on("FETCH SELECT body", Reply::Fail("lost connection".to_string()));
    let executor = static_executor(&db, &ScriptedCompiler::default());

    let err = executor
        .execute(&ApiRequest::new(Method::GET, "/api/items"), &anonymous())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Database(_)));
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        db.journal()[3..],
        [
            "FETCH SELECT body FROM items".to_string(),
            "ROLLBACK".to_string(),
            "RELEASE pooled".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_rollback_failure_keeps_original_error() {
    let db = ScriptedDatabase::new();
    db.on("FETCH SELECT body", Reply::Fail("deadlock found".to_string()));
    db.on("ROLLBACK", Reply::Fail("connection gone".to_string()));
    let executor = static_executor(&db, &ScriptedCompiler::default());

    let err = executor
        .execute(&ApiRequest::new(Method::GET, "/api/items"), &anonymous())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("deadlock found"));
    assert_eq!(db.count("ROLLBACK"), 1);
    assert_eq!(db.count("RELEASE"), 1);
}

#[tokio::test]
async fn test_session_setup_failure_skips_compiled_statement() {
    let db = ScriptedDatabase::new();
    db.on("EXEC SET", Reply::Fail("variable too long".to_string()));
    let executor = static_executor(&db, &ScriptedCompiler::default());

    executor
        .execute(&ApiRequest::new(Method::GET, "/api/items"), &anonymous())
        .await
        .unwrap_err();

    assert_eq!(db.count("FETCH"), 0);
    assert_eq!(db.count("ROLLBACK"), 1);
    assert_eq!(db.count("RELEASE"), 1);
}

#[tokio::test]
async fn test_commit_failure_is_reported() {
    let db = ScriptedDatabase::new();
    db.on("COMMIT", Reply::Fail("commit failed".to_string()));
    let executor = static_executor(&db, &ScriptedCompiler::default());

    let err = executor
        .execute(&ApiRequest::new(Method::GET, "/api/items"), &anonymous())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Database(_)));
    assert_eq!(db.count("ROLLBACK"), 1);
    assert_eq!(db.count("RELEASE"), 1);
}

#[tokio::test]
async fn test_acquire_failure_touches_nothing() {
    let db = ScriptedDatabase::new();
    db.on("ACQUIRE", Reply::Fail("pool timed out".to_string()));
    let executor = static_executor(&db, &ScriptedCompiler::default());

    let err = executor
        .execute(&ApiRequest::new(Method::GET, "/api/items"), &anonymous())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Database(_)));
    assert_eq!(db.journal(), vec!["ACQUIRE".to_string()]);
}

#[tokio::test]
async fn test_unsupported_method_never_acquires() {
    let db = ScriptedDatabase::new();
    let executor = static_executor(&db, &ScriptedCompiler::default());

    let err = executor
        .execute(&ApiRequest::new(Method::HEAD, "/api/items"), &anonymous())
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    assert!(db.journal().is_empty());
}

// =============================================================================
// Mutations
// =============================================================================

#[tokio::test]
async fn test_insert_keys_come_from_last_insert_id() {
    let db = ScriptedDatabase::new();
    db.on(
        "EXEC MUTATE POST items",
        Reply::Exec(ExecOutcome {
            last_insert_id: 5,
            rows_affected: 2,
        }),
    );
    db.on(
        "FETCH SELECT MUTATED items",
        Reply::Rows(vec![body_row(json!([{ "id": 5 }, { "id": 6 }]))]),
    );
    let compiler = ScriptedCompiler::default();
    let executor = static_executor(&db, &compiler);

    let request = representation(ApiRequest::new(Method::POST, "/api/items").with_body("[{},{}]"));
    let payload = executor.execute(&request, &anonymous()).await.unwrap();

    assert_eq!(payload, json!([{ "id": 5 }, { "id": 6 }]));
    assert_eq!(compiler.mutated_rows(), vec![vec![5, 6]]);
    assert_eq!(db.count("FETCH select t.val"), 0);
    assert_eq!(db.count("COMMIT"), 1);
}

#[tokio::test]
async fn test_update_keys_are_recovered_from_session() {
    let db = ScriptedDatabase::new();
    db.on(
        "EXEC MUTATE PATCH items",
        Reply::Exec(ExecOutcome {
            last_insert_id: 0,
            rows_affected: 2,
        }),
    );
    db.on(
        "json_table(@subzero_ids",
        Reply::Rows(vec![row("val", json!(3)), row("val", json!(9))]),
    );
    let compiler = ScriptedCompiler::default();
    let executor = static_executor(&db, &compiler);

    let payload = executor
        .execute(&ApiRequest::new(Method::PATCH, "/api/items"), &anonymous())
        .await
        .unwrap();

    // no representation requested
    assert_eq!(payload, Value::Null);
    assert_eq!(compiler.mutated_rows(), vec![vec![3, 9]]);
    assert_eq!(db.count("FETCH SELECT MUTATED"), 0);

    let journal = db.journal();
    let mutate = journal.iter().position(|e| e.starts_with("EXEC MUTATE")).unwrap();
    let recover = journal.iter().position(|e| e.contains("json_table")).unwrap();
    let commit = journal.iter().position(|e| e == "COMMIT").unwrap();
    assert!(mutate < recover && recover < commit);
}

#[tokio::test]
async fn test_failed_mutation_never_selects() {
    let db = ScriptedDatabase::new();
    db.on("EXEC MUTATE", Reply::Fail("duplicate entry".to_string()));
    let compiler = ScriptedCompiler::default();
    let executor = static_executor(&db, &compiler);

    let request = representation(ApiRequest::new(Method::DELETE, "/api/items"));
    executor.execute(&request, &anonymous()).await.unwrap_err();

    assert!(compiler.mutated_rows().is_empty());
    assert_eq!(db.count("FETCH"), 0);
    assert_eq!(db.count("COMMIT"), 0);
    assert_eq!(db.count("ROLLBACK"), 1);
    assert_eq!(db.count("RELEASE"), 1);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_concurrent_requests_each_release_their_connection() {
    let db = ScriptedDatabase::new();
    db.on("FETCH SELECT body FROM broken", Reply::Fail("boom".to_string()));
    let executor = static_executor(&db, &ScriptedCompiler::default());

    let requests: Vec<ApiRequest> = (0..8)
        .map(|i| {
            let table = if i % 2 == 0 { "items" } else { "broken" };
            ApiRequest::new(Method::GET, format!("/api/{table}"))
        })
        .collect();
    let auth = anonymous();
    let results = join_all(requests.iter().map(|r| executor.execute(r, &auth))).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 4);
    assert_eq!(db.count("ACQUIRE"), 8);
    assert_eq!(db.count("RELEASE pooled"), 8);
    assert_eq!(db.count("COMMIT"), 4);
    assert_eq!(db.count("ROLLBACK"), 4);
}
