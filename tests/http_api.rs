mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use common::RecordingExecutor;
use schema_rest::schema::ColumnSchema;
use schema_rest::{app_router, ApiSettings, AppState, Dialect, RestEngine, SchemaCatalog, TableSchema};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt; // for `oneshot`

fn catalog() -> SchemaCatalog {
    let mut c = SchemaCatalog::new();
    c.insert_table(
        "public",
        TableSchema::new(
            "users",
            Some("id"),
            vec![
                ColumnSchema::new("id", "integer"),
                ColumnSchema::new("name", "text"),
                ColumnSchema::new("age", "integer"),
            ],
        ),
    );
    c.insert_table(
        "public",
        TableSchema::new("parents", Some("id"), vec![ColumnSchema::new("id", "integer")]),
    );
    c.insert_table(
        "public",
        TableSchema::new(
            "children",
            Some("id"),
            vec![ColumnSchema::new("id", "integer"), ColumnSchema::new("parent_id", "integer")],
        ),
    );
    c
}

fn router(recorder: &RecordingExecutor, methods: &[&str]) -> Router {
    let settings = ApiSettings::new(Dialect::Postgres, "public").with_methods(methods.iter().copied());
    let engine = RestEngine::new(Arc::new(recorder.clone()), settings, catalog());
    app_router(AppState::new(Arc::new(engine)))
}

fn app(methods: &[&str]) -> (Router, RecordingExecutor) {
    let recorder = RecordingExecutor::new(Dialect::Postgres);
    (router(&recorder, methods), recorder)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn get_by_id_runs_one_select() {
    let (app, recorder) = app(&["GET"]);
    recorder.push_result(json!([{"id": 3, "name": "Bob", "age": 40}]));
    let (status, body) = send(&app, "GET", "/users/3", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"users": [{"id": 3, "name": "Bob", "age": 40}]}));
    assert_eq!(recorder.statements(), vec!["SELECT * FROM \"public\".\"users\" WHERE (\"users\".\"id\" = 3)"]);
}

#[tokio::test]
async fn id_filter_is_qualified_next_to_joins() {
    let (app, recorder) = app(&["GET"]);
    let (status, _) = send(&app, "GET", "/users/1?join=left,parents,parents.id,eq,users.age", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        recorder.statements(),
        vec![
            "SELECT * FROM \"public\".\"users\" LEFT JOIN parents ON (parents.id = users.age) \
             WHERE (\"users\".\"id\" = 1)"
        ]
    );
}

#[tokio::test]
async fn double_hyphen_cannot_comment_out_the_where_clause() {
    let (app, recorder) = app(&["GET"]);
    let (status, _) = send(
        &app,
        "GET",
        "/users?filter=age,gt,2&join=inner,parents--,parents.id,eq,users.age--&having=count(id),gt,1--",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let sql = &recorder.statements()[0];
    assert!(!sql.contains("--"), "{}", sql);
    assert_eq!(
        sql,
        "SELECT * FROM \"public\".\"users\" INNER JOIN parents- ON (parents.id = users.age-) \
         WHERE (age > 2) HAVING (count(id) > '1-')"
    );
}

#[tokio::test]
async fn child_scope_uses_qualified_foreign_key() {
    let (app, recorder) = app(&["GET"]);
    let (status, _) = send(&app, "GET", "/parents/4/children?relation=parents.id,children.parent_id", None).await;
    assert_eq!(status, StatusCode::OK);
    let mut statements = recorder.statements();
    statements.sort();
    assert_eq!(
        statements,
        vec![
            "SELECT * FROM \"public\".\"children\" WHERE (\"children\".\"parent_id\" = 4)",
            "SELECT * FROM \"public\".\"parents\" WHERE (\"parents\".\"id\" = 4)",
        ]
    );
}

#[tokio::test]
async fn failing_sibling_aborts_the_fan_out() {
    let recorder = RecordingExecutor::new(Dialect::Postgres)
        .stalling_on("\"parents\"")
        .failing_on("\"children\"");
    let app = router(&recorder, &["GET"]);
    let (status, body) = tokio::time::timeout(
        Duration::from_secs(5),
        send(&app, "GET", "/parents/children?relation=parents.id,children.parent_id", None),
    )
    .await
    .expect("a failed sibling must not wait for the stalled query");
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "database_error");
    assert!(body.get("parents").is_none());
    assert_eq!(recorder.statements().len(), 2);
}

#[tokio::test]
async fn list_query_compiles_filter_order_and_page() {
    let (app, recorder) = app(&["GET"]);
    let (status, _) = send(&app, "GET", "/users?filter=age,gt,18&order=name&page=0,10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        recorder.statements(),
        vec!["SELECT * FROM \"public\".\"users\" WHERE (age > 18) ORDER BY name ASC OFFSET 0 LIMIT 10"]
    );
}

#[tokio::test]
async fn unknown_table_is_404_with_envelope() {
    let (app, recorder) = app(&["GET"]);
    let (status, body) = send(&app, "GET", "/ghosts", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
    assert!(recorder.statements().is_empty());
}

#[tokio::test]
async fn disallowed_write_is_404() {
    let (app, recorder) = app(&["GET"]);
    let (status, body) = send(&app, "POST", "/users", Some(r#"{"name":"Bob"}"#)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"]["message"].as_str().unwrap().contains("method"));
    assert!(recorder.statements().is_empty());
}

#[tokio::test]
async fn post_binds_values_and_returns_key() {
    let (app, recorder) = app(&["GET", "POST"]);
    recorder.push_result(json!([{"id": 7}]));
    let (status, body) = send(&app, "POST", "/users", Some(r#"{"name":"Bob"}"#)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({"users": 7}));
    let queries = recorder.queries();
    assert_eq!(
        queries[0].sql,
        "INSERT INTO \"public\".\"users\" (\"name\") VALUES ($1::text) RETURNING \"id\""
    );
    assert_eq!(queries[0].params, vec![json!("Bob")]);
    assert_eq!(queries[1].sql, "COMMIT");
}

#[tokio::test]
async fn invalid_json_body_is_400() {
    let (app, _) = app(&["GET", "POST"]);
    let (status, body) = send(&app, "POST", "/users", Some("{nope")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn bad_filter_arity_is_400() {
    let (app, _) = app(&["GET"]);
    let (status, body) = send(&app, "GET", "/users?filter=age,bt,1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_filter");
}

#[tokio::test]
async fn options_schema_and_health() {
    let (app, recorder) = app(&["GET"]);
    let (status, body) = send(&app, "OPTIONS", "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["types"]["users"]["properties"]["age"]["type"], "numeric");

    let (status, body) = send(&app, "GET", "/--schema", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["public"]["users"]["primary_key"], "id");

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(recorder.statements().is_empty());
}

#[tokio::test]
async fn ready_pings_the_database() {
    let (app, recorder) = app(&["GET"]);
    let (status, body) = send(&app, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tables"], 3);
    assert_eq!(recorder.statements(), vec!["SELECT 1"]);
}
