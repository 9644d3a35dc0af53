use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use agentgraph_core::Credentials;
use agentgraph_engine::{ExecutionContext, Graph};
use agentgraph_workers::builtin_registry;

async fn spawn_server() -> String {
    let app = Router::new()
        .route("/json", get(|| async { Json(json!({ "ok": true })) }))
        .route(
            "/query",
            get(|Query(q): Query<HashMap<String, String>>| async move { Json(q) }),
        )
        .route(
            "/auth",
            get(|headers: HeaderMap| async move {
                headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string()
            }),
        )
        .route(
            "/echo",
            post(|headers: HeaderMap, body: String| async move {
                let ct = headers
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                format!("{ct}|{body}")
            }),
        )
        .route(
            "/missing",
            get(|| async { (StatusCode::NOT_FOUND, "nothing here") }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// A graph where a text node feeds the api-call's endpoint, which makes the
/// api-call a terminal. Returns the graph and the api-call's id.
fn api_graph(url: &str, params: Value) -> (Graph, String) {
    let mut graph = Graph::new(Arc::new(builtin_registry()));
    let endpoint = graph.add_node("text", json!({ "text": url })).unwrap();
    let api = graph.add_node("api-call", params).unwrap();
    graph
        .connect(&endpoint, "output", &api, "endpointUrlInput")
        .unwrap();
    (graph, api)
}

fn port(graph: &Graph, node: &str, name: &str) -> Value {
    graph.node(node).unwrap().value(name).clone()
}

#[tokio::test]
async fn test_json_response_published_as_json() {
    let base = spawn_server().await;
    let (mut graph, api) = api_graph(&format!("{base}/json"), json!({}));

    let mut ctx = ExecutionContext::new();
    graph.execute(&mut ctx).await;

    assert!(ctx.error.is_none(), "{:?}", ctx.error);
    assert_eq!(port(&graph, &api, "response"), json!({ "ok": true }));
    assert_eq!(port(&graph, &api, "error"), json!(""));
}

#[tokio::test]
async fn test_query_params_sent() {
    let base = spawn_server().await;
    let (mut graph, api) = api_graph(
        &format!("{base}/query"),
        json!({ "params": r#"{"q": "rust", "page": 2}"# }),
    );

    let mut ctx = ExecutionContext::new();
    graph.execute(&mut ctx).await;
    assert_eq!(
        port(&graph, &api, "response"),
        json!({ "q": "rust", "page": "2" })
    );
}

#[tokio::test]
async fn test_bearer_from_tenant_credentials() {
    let base = spawn_server().await;
    let (mut graph, api) = api_graph(
        &format!("{base}/auth"),
        json!({
            "authType": "bearer",
            "selectedKeyName": "AGENTGRAPH_TEST_API_TOKEN",
            "headers": r#"{"Authorization": "Bearer smuggled"}"#
        }),
    );

    let mut creds = Credentials::new();
    creds.insert("AGENTGRAPH_TEST_API_TOKEN".into(), "tenant-secret".into());
    let mut ctx = ExecutionContext::new().with_credentials(creds);
    graph.execute(&mut ctx).await;

    assert_eq!(port(&graph, &api, "response"), json!("Bearer tenant-secret"));
}

#[tokio::test]
async fn test_json_looking_body_gets_content_type() {
    let base = spawn_server().await;
    let (mut graph, api) = api_graph(&format!("{base}/echo"), json!({ "method": "POST" }));
    let body = graph
        .add_node("text", json!({ "text": r#"{"a": 1}"# }))
        .unwrap();
    graph.connect(&body, "output", &api, "body").unwrap();

    let mut ctx = ExecutionContext::new();
    graph.execute(&mut ctx).await;

    assert_eq!(
        port(&graph, &api, "response"),
        json!(r#"application/json|{"a": 1}"#)
    );
}

#[tokio::test]
async fn test_non_success_goes_to_error_port() {
    let base = spawn_server().await;
    let (mut graph, api) = api_graph(&format!("{base}/missing"), json!({}));

    let mut ctx = ExecutionContext::new();
    graph.execute(&mut ctx).await;

    assert!(ctx.error.is_none());
    assert_eq!(port(&graph, &api, "response"), json!(""));
    let error = port(&graph, &api, "error");
    let error = error.as_str().unwrap();
    assert!(error.contains("404"), "{error}");
    assert!(error.contains("nothing here"), "{error}");
}

#[tokio::test]
async fn test_connection_failure_goes_to_error_port() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (mut graph, api) = api_graph(&format!("http://{addr}/"), json!({ "timeout": 2000 }));
    let mut ctx = ExecutionContext::new();
    graph.execute(&mut ctx).await;

    assert!(ctx.error.is_none());
    let error = port(&graph, &api, "error");
    assert!(error
        .as_str()
        .unwrap()
        .starts_with("No response received or request setup failed"));
}

#[tokio::test]
async fn test_missing_credential_fails_run() {
    let base = spawn_server().await;
    let (mut graph, _) = api_graph(
        &format!("{base}/auth"),
        json!({ "authType": "bearer", "selectedKeyName": "AGENTGRAPH_TEST_NOT_SET_ANYWHERE" }),
    );

    let mut ctx = ExecutionContext::new();
    graph.execute(&mut ctx).await;

    let error = ctx.error.unwrap();
    assert!(error.contains("AGENTGRAPH_TEST_NOT_SET_ANYWHERE"), "{error}");
}
