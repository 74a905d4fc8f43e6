use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod registry;
pub mod schema;

use mcp::dispatcher::{Dispatcher, ServerIdentity};
use registry::ToolRegistry;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(registry: Arc<ToolRegistry>, identity: ServerIdentity) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(registry, identity)),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(http::health))
        .route("/.well-known/mcp", get(http::discovery))
        .route(http::MCP_ENDPOINT, post(http::mcp_endpoint))
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, Bytes},
        http::{header, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::domain::tools::default_registry;

    use super::*;

    fn app() -> Router {
        let registry = Arc::new(default_registry().expect("default registry"));
        build_app(AppState::new(registry, ServerIdentity::default()))
    }

    async fn post_mcp(app: Router, body: &'static str) -> (StatusCode, Bytes) {
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/mcp")
                    .method("POST")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        (status, body)
    }

    fn json_body(body: &[u8]) -> Value {
        serde_json::from_slice(body).expect("valid json response")
    }

    #[tokio::test]
    async fn health_is_public() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        assert_eq!(
            body,
            "{\"status\":\"healthy\",\"service\":\"viincci_rag_server\"}"
        );
    }

    #[tokio::test]
    async fn discovery_points_at_mcp_endpoint() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/.well-known/mcp")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        let body_json = json_body(&body);
        assert_eq!(body_json["mcp_endpoint"], "/mcp");
        assert_eq!(body_json["name"], "viincci_rag_server");
    }

    #[tokio::test]
    async fn root_get_is_not_found() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn mcp_initialize_returns_result() {
        let (status, body) = post_mcp(
            app(),
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","clientInfo":{"name":"test-client","version":"1.0.0"},"capabilities":{}}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let body_json = json_body(&body);
        assert_eq!(body_json["jsonrpc"], "2.0");
        assert_eq!(body_json["id"], 1);
        assert_eq!(body_json["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(body_json["result"]["serverInfo"]["name"], "viincci_rag_server");
        assert!(body_json["result"]["capabilities"]["tools"].is_object());
        assert!(body_json["result"]["capabilities"]["prompts"].is_null());
    }

    #[tokio::test]
    async fn mcp_tools_list_returns_query_tool() {
        let (status, body) = post_mcp(
            app(),
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list","params":{}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let body_json = json_body(&body);
        assert_eq!(body_json["id"], 2);
        let tools = body_json["result"]["tools"].as_array().expect("tools array");
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "query");
        assert_eq!(tools[0]["inputSchema"]["required"][0], "prompt");
    }

    #[tokio::test]
    async fn mcp_tools_call_query_returns_constant_text() {
        let (status, body) = post_mcp(
            app(),
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"query","arguments":{"prompt":"what is this?"}}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let body_json = json_body(&body);
        assert_eq!(body_json["id"], 3);
        assert_eq!(body_json["result"]["content"][0]["type"], "text");
        assert_eq!(body_json["result"]["content"][0]["text"], "viincci_rag");
    }

    #[tokio::test]
    async fn mcp_tools_call_unknown_tool_is_404() {
        let (status, body) = post_mcp(
            app(),
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"does_not_exist","arguments":{}}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        let body_json = json_body(&body);
        assert_eq!(body_json["error"]["code"], -32601);
        assert!(body_json["error"]["message"]
            .as_str()
            .expect("message")
            .contains("does_not_exist"));
        assert!(body_json.get("result").is_none());
    }

    #[tokio::test]
    async fn mcp_tools_call_missing_prompt_is_invalid_arguments() {
        let (status, body) = post_mcp(
            app(),
            r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"query"}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(&body)["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn mcp_unknown_method_returns_method_not_found() {
        let (status, body) = post_mcp(
            app(),
            r#"{"jsonrpc":"2.0","id":1,"method":"unknown"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        let body_json = json_body(&body);
        assert_eq!(body_json["error"]["code"], -32601);
        assert_eq!(body_json["error"]["message"], "Method not found: unknown");
    }

    #[tokio::test]
    async fn mcp_malformed_body_is_internal_error() {
        let (status, body) = post_mcp(app(), r#"{"jsonrpc":"2.0","id":1,"#).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let body_json = json_body(&body);
        assert_eq!(body_json["error"]["code"], -32603);
        assert!(body_json["id"].is_null());
    }

    #[tokio::test]
    async fn mcp_request_without_method_is_internal_error() {
        let (status, body) = post_mcp(app(), r#"{"jsonrpc":"2.0","id":21,"params":{}}"#).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let body_json = json_body(&body);
        assert_eq!(body_json["id"], 21);
        assert_eq!(body_json["error"]["code"], -32603);
    }

    #[tokio::test]
    async fn mcp_initialized_notification_sends_no_content() {
        let (status, body) = post_mcp(
            app(),
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());

        let (status, body) = post_mcp(
            app(),
            r#"{"jsonrpc":"2.0","id":9,"method":"notifications/initialized"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body.is_empty());
    }

    #[tokio::test]
    async fn mcp_batch_returns_array_of_responses() {
        let (status, body) = post_mcp(
            app(),
            r#"[{"jsonrpc":"2.0","id":1,"method":"initialize"},{"jsonrpc":"2.0","method":"notifications/initialized"},{"jsonrpc":"2.0","id":2,"method":"nope"}]"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let body_json = json_body(&body);
        let responses = body_json.as_array().expect("batch array");
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn tools_registered_after_start_are_served() {
        let registry = Arc::new(default_registry().expect("default registry"));
        let app = build_app(AppState::new(
            Arc::clone(&registry),
            ServerIdentity::default(),
        ));

        registry
            .register(registry::ToolDescriptor::from_fn(
                "echo",
                "Echoes the prompt",
                schema::single_string_argument("prompt", "text"),
                |arguments| {
                    Ok(arguments
                        .get("prompt")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string())
                },
            ))
            .expect("register echo");

        let (status, body) = post_mcp(
            app,
            r#"{"jsonrpc":"2.0","id":"late","method":"tools/call","params":{"name":"echo","arguments":{"prompt":"hi"}}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let body_json = json_body(&body);
        assert_eq!(body_json["id"], "late");
        assert_eq!(body_json["result"]["content"][0]["text"], "hi");
    }
}
