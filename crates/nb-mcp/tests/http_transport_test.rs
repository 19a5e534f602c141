//! HTTP routes driven in-process through `tower::ServiceExt::oneshot`

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use nb_core::{Cell, InMemorySessionStore, Language, NewSession, SessionStore};
use nb_mcp::transport::router;
use nb_mcp::{McpServer, McpServerConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn setup() -> (Arc<InMemorySessionStore>, Arc<McpServer>) {
    let store = Arc::new(InMemorySessionStore::new());
    let server = McpServer::create(McpServerConfig::default(), store.clone()).unwrap();
    (store, server)
}

async fn get(server: &Arc<McpServer>, uri: &str) -> Response {
    router(server.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post(server: &Arc<McpServer>, uri: &str, body: Value) -> Response {
    router(server.clone())
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (_, server) = setup();
    let response = get(&server, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");

    server.close().await;
    let response = get(&server, "/health").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_tools_and_resources_list() {
    let (store, server) = setup();

    let tools = body_json(get(&server, "/tools/list").await).await;
    assert_eq!(tools["tools"].as_array().unwrap().len(), 11);
    assert_eq!(tools["tools"][10]["name"], "export_session");
    assert!(tools["tools"][0]["inputSchema"].is_object());

    let empty = body_json(get(&server, "/resources/list").await).await;
    assert_eq!(empty["resources"], json!([]));

    let s = store
        .open_session(NewSession::new("/work/h", Language::Python))
        .await
        .unwrap();
    let listed = body_json(get(&server, "/resources/list").await).await;
    assert_eq!(listed["resources"][0]["uri"], format!("session://{}", s.id()));
    assert_eq!(listed["resources"][0]["mimeType"], "application/json");
}

#[tokio::test]
async fn test_jsonrpc_endpoint() {
    let (_, server) = setup();
    let response = post(
        &server,
        "/mcp",
        json!({ "jsonrpc": "2.0", "id": 7, "method": "tools/list" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], 7);
    assert_eq!(body["result"]["tools"][0]["name"], "list_sessions");

    let response = post(
        &server,
        "/message",
        json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_jsonrpc_malformed_body() {
    let (_, server) = setup();
    let response = router(server.clone())
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/mcp")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{ not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["jsonrpc"], "2.0");
    assert_eq!(body["error"]["code"], -32700);
    assert!(body["result"].is_null());
}

#[tokio::test]
async fn test_tools_call_value() {
    let (_, server) = setup();
    let response = post(
        &server,
        "/tools/call",
        json!({ "name": "open_session", "arguments": { "directory": "/work/v", "language": "sql" } }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["session"]["language"], "sql");
    assert_eq!(body["session"]["cell_count"], 0);
}

#[tokio::test]
async fn test_tools_call_error_statuses() {
    let (_, server) = setup();

    let response = post(&server, "/tools/call", json!({ "name": "nonexistent" })).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = post(
        &server,
        "/tools/call",
        json!({ "name": "get_cell", "arguments": { "session_id": "x" } }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    server.close().await;
    let response = post(&server, "/tools/call", json!({ "name": "list_sessions" })).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_tools_call_streams_export() {
    let (store, server) = setup();
    let cells = (0..40).map(|i| Cell::code(format!("x{} = {}", i, i))).collect();
    let s = store
        .open_session(NewSession::new("/work/s", Language::Python).with_cells(cells))
        .await
        .unwrap();

    let response = post(
        &server,
        "/tools/call",
        json!({ "name": "export_session", "arguments": { "session_id": s.id().as_str() } }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    assert_eq!(response.headers()[header::TRANSFER_ENCODING], "chunked");

    let text = body_text(response).await;
    assert!(text.starts_with("# python session "));
    assert!(text.contains("# %% cell 1\nx0 = 0\n"));
    assert!(text.contains("# %% cell 40\nx39 = 39\n"));
    let first = text.find("x0 = 0").unwrap();
    let last = text.find("x39 = 39").unwrap();
    assert!(first < last);
}
