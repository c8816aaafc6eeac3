//! In-memory tests through `Server::handle`.

use bytes::Bytes;
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sluice::config::SluiceConfig;
use sluice::server::{HttpResponse, Server};

fn server() -> Server {
    sluice_users_service::server(&SluiceConfig::default()).unwrap()
}

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Bytes> {
    let body = body.map(|b| Bytes::from(b.to_string())).unwrap_or_default();
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap()
}

async fn call(server: &Server, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let response: HttpResponse = server.handle(request(method, uri, body)).await;
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::String(
        String::from_utf8_lossy(&bytes).into_owned(),
    ));
    (status, value)
}

#[tokio::test]
async fn test_short_name_query_is_valid() {
    let server = server();
    let (status, body) = call(&server, Method::GET, "/users?name=Al", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["users"][0]["name"], "Alice Smith");
}

#[tokio::test]
async fn test_non_numeric_age_is_type_error() {
    let server = server();
    let (status, body) = call(&server, Method::GET, "/users?age=abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({
            "success": false,
            "error": "Validation failed",
            "errors": [{ "field": "age", "constraint": "type", "value": "abc" }]
        })
    );
}

#[tokio::test]
async fn test_create_drops_undeclared_fields() {
    let server = server();
    let (status, body) = call(
        &server,
        Method::POST,
        "/users",
        Some(json!({ "name": "Carol", "email": "carol@example.com", "age": "41" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let keys: Vec<&str> = body.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys.len(), 4);
    for key in ["id", "name", "email", "createdAt"] {
        assert!(keys.contains(&key), "missing {key}");
    }
    assert!(body.get("age").is_none());

    let id = body["id"].as_str().unwrap();
    let (status, fetched) = call(&server, Method::GET, &format!("/users/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, body);
}

#[tokio::test]
async fn test_create_reports_every_error() {
    let server = server();
    let (status, body) = call(
        &server,
        Method::POST,
        "/users",
        Some(json!({ "name": "A", "email": "not-an-email", "age": 200 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let constraints: Vec<(&str, &str)> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| (e["field"].as_str().unwrap(), e["constraint"].as_str().unwrap()))
        .collect();
    assert_eq!(
        constraints,
        vec![("age", "max"), ("email", "format"), ("name", "min")]
    );
}

#[tokio::test]
async fn test_duplicate_email_is_conflict() {
    let server = server();
    let payload = json!({ "name": "Alice Again", "email": "alice@example.com" });
    let (status, body) = call(&server, Method::POST, "/users", Some(payload)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "email 'alice@example.com' is already registered");
}

#[tokio::test]
async fn test_undeclared_404_passes_through() {
    let server = server();
    let (status, body) = call(&server, Method::GET, "/users/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({ "success": false, "error": "User not found", "id": "missing" })
    );
}

#[tokio::test]
async fn test_delete_is_shaped() {
    let server = server();
    let (_, list) = call(&server, Method::GET, "/users?limit=1", None).await;
    let id = list["users"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = call(&server, Method::DELETE, &format!("/users/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "id": id, "deleted": true }));

    let (status, _) = call(&server, Method::GET, &format!("/users/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unsupported_verb_uses_not_found_handler() {
    let server = server();
    let (status, body) = call(&server, Method::PUT, "/users", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "PUT is not supported on /users");
}

#[tokio::test]
async fn test_unsafe_failure_is_bare_500() {
    let server = server();
    let (status, body) = call(
        &server,
        Method::POST,
        "/diagnostics",
        Some(json!({ "reason": "probe" })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, Value::String("Internal Server Error".to_string()));

    let (status, body) = call(&server, Method::POST, "/diagnostics", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "reason");
}

#[tokio::test]
async fn test_store_is_built_lazily() {
    let server = server();
    let (_, before) = call(&server, Method::GET, "/diagnostics", None).await;
    assert_eq!(before["modules"], json!(["service", "store"]));
    assert_eq!(before["resolved"], json!(["service"]));

    call(&server, Method::GET, "/users", None).await;
    let (_, after) = call(&server, Method::GET, "/diagnostics", None).await;
    assert_eq!(after["resolved"], json!(["service", "store"]));
}
